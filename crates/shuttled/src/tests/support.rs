//! Doubles shared by the host test suites.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};

use ortho_config::OrthoError;
use serde_json::Value;

use shuttle_config::Config;

use crate::bootstrap::{BootstrapError, ConfigLoader, Host, StaticConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::shutdown::{ShutdownError, ShutdownSignal};

pub const WAIT: Duration = Duration::from_secs(5);

/// Lifecycle events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    CoreStarted,
    CoreExited(Option<i32>),
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn core_started(&self, _pid: u32) {
        self.record(HealthEvent::CoreStarted);
    }

    fn core_exited(&self, code: Option<i32>) {
        self.record(HealthEvent::CoreExited(code));
    }
}

/// Loader that fails by passing an unparsable CLI flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("shuttled"),
            OsString::from("--queue-warn-threshold"),
            OsString::from("plenty"),
        ])
    }
}

/// Scenario world for the bootstrap behaviour suite.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    host: Option<Host>,
    bootstrap_error: Option<BootstrapError>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            loader: Box::new(StaticConfigLoader::new(Config::default())),
            reporter: Arc::new(RecordingHealthReporter::default()),
            host: None,
            bootstrap_error: None,
        }
    }

    pub fn use_loader(&mut self, loader: Box<dyn ConfigLoader>) {
        self.loader = loader;
        self.host = None;
        self.bootstrap_error = None;
    }

    pub fn bootstrap(&mut self) {
        match bootstrap_with(&*self.loader, self.reporter.clone()) {
            Ok(host) => self.host = Some(host),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    pub fn host(&self) -> Option<&Host> {
        self.host.as_ref()
    }

    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }
}

/// A shutdown signal fired by the test.
pub struct ManualSignal {
    fired: Mutex<mpsc::Receiver<()>>,
}

impl ManualSignal {
    pub fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (sender, receiver) = mpsc::channel();
        (
            Arc::new(Self {
                fired: Mutex::new(receiver),
            }),
            sender,
        )
    }
}

impl ShutdownSignal for ManualSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let receiver = self.fired.lock().expect("signal lock");
        if receiver.recv().is_err() {
            // Sender dropped without firing: never signal.
            loop {
                std::thread::park();
            }
        }
        Ok(())
    }
}

/// A readable stream fed by the test; EOF once every sender is dropped.
#[derive(Clone)]
pub struct ChannelReader {
    chunks: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    pending: Vec<u8>,
}

impl ChannelReader {
    pub fn new() -> (Self, mpsc::Sender<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                chunks: Arc::new(Mutex::new(receiver)),
                pending: Vec::new(),
            },
            sender,
        )
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.chunks.lock().expect("reader lock").recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let count = buf.len().min(self.pending.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        Ok(count)
    }
}

/// In-memory stand-in for the host's stdout.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn envelopes(&self) -> Vec<Value> {
        let bytes = self.0.lock().expect("capture lock").clone();
        String::from_utf8(bytes)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    /// Polls until at least `count` envelopes have been written.
    pub fn wait_for(&self, count: usize) -> Vec<Value> {
        let deadline = Instant::now() + WAIT;
        loop {
            let envelopes = self.envelopes();
            if envelopes.len() >= count {
                return envelopes;
            }
            assert!(Instant::now() < deadline, "only saw {envelopes:?}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("capture lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
