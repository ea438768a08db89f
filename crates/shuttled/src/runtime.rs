//! Runs the broker between the UI streams and the core until something
//! stops it.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;

use thiserror::Error;
use tracing::{error, info};

use shuttle_broker::{
    AffinityError, Broker, BrokerError, BrokerObserver, BrokerParts, CoreCommand, ProcessState,
    RoutingTable, Stream, TransportError,
};
use shuttle_config::Config;

use crate::bootstrap::{BootstrapError, ConfigLoader, bootstrap_with};
use crate::bridge::StdioUiBridge;
use crate::health::HealthReporter;
use crate::host::LocalIde;
use crate::shutdown::ShutdownSignal;

const RUNTIME_TARGET: &str = "shuttled::runtime";

/// Why the host stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A termination signal arrived.
    Signal,
    /// The UI closed its input stream.
    UiClosed,
    /// The core process went away.
    CoreExited {
        /// Exit status, when the process could be reaped.
        code: Option<i32>,
    },
}

/// Errors surfaced while launching the host.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration or telemetry could not be set up.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The capability host could not start its desktop thread.
    #[error("failed to start capability host: {source}")]
    Capabilities {
        /// Underlying executor error.
        #[source]
        source: AffinityError,
    },
    /// A UI transport thread could not be started.
    #[error("failed to start UI transport: {source}")]
    UiTransport {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The broker could not start the core.
    #[error("failed to start broker: {source}")]
    Broker {
        /// Underlying broker error.
        #[source]
        source: BrokerError,
    },
}

/// Builds the routing tables: the protocol defaults plus configured extras.
#[must_use]
pub fn routing_table(config: &Config) -> RoutingTable {
    RoutingTable::standard_builder()
        .forward_to_ui(config.extra_ui_pass_through())
        .forward_to_core(config.extra_core_pass_through())
        .build()
}

/// The core launch command described by `config`.
#[must_use]
pub fn core_command(config: &Config) -> CoreCommand {
    let command = CoreCommand::new(config.core_executable().as_std_path());
    match config.core_working_dir() {
        Some(dir) => command.with_working_dir(dir.as_std_path()),
        None => command,
    }
}

/// Bootstraps with `loader`, then serves the process's stdio until stopped.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap or any startup step fails.
pub fn launch(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    signal: Arc<dyn ShutdownSignal>,
) -> Result<StopReason, LaunchError> {
    let host = bootstrap_with(loader, reporter)?;
    serve(host.config(), host.reporter(), signal, io::stdin(), io::stdout())
}

/// Serves UI traffic from `input` to `output` through a freshly started
/// broker, returning once a signal arrives, `input` ends, or the core exits.
///
/// Shutdown abandons pending requests and flushes everything already queued
/// for the UI.
///
/// # Errors
///
/// Returns [`LaunchError`] when the capability host, the UI transport, or
/// the core cannot be started.
pub fn serve<R, W>(
    config: &Config,
    reporter: Arc<dyn HealthReporter>,
    signal: Arc<dyn ShutdownSignal>,
    input: R,
    output: W,
) -> Result<StopReason, LaunchError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let ide = Arc::new(
        LocalIde::from_config(config).map_err(|source| LaunchError::Capabilities { source })?,
    );
    let bridge = StdioUiBridge::new(output, config.queue_warn_threshold())
        .map_err(|source| LaunchError::UiTransport { source })?;

    let (stop, stopped) = mpsc::channel();
    let observer = Arc::new(HostObserver {
        reporter: Arc::clone(&reporter),
        stop: stop.clone(),
    });
    let parts = BrokerParts::new(Arc::clone(&ide) as _, bridge.sink())
        .with_routes(routing_table(config))
        .with_observer(observer)
        .with_queue_warn_threshold(config.queue_warn_threshold());
    let broker = match Broker::start(&core_command(config), parts) {
        Ok(broker) => Arc::new(broker),
        Err(source) => {
            bridge.finish();
            return Err(LaunchError::Broker { source });
        }
    };
    if let ProcessState::Running { pid } = broker.state() {
        reporter.core_started(pid);
    }

    let ui_stop = stop.clone();
    let pumped = bridge.pump(input, Arc::clone(&broker), move || {
        drop(ui_stop.send(StopReason::UiClosed));
    });
    if let Err(source) = pumped {
        broker.shutdown();
        bridge.finish();
        return Err(LaunchError::UiTransport { source });
    }
    listen_for_signal(signal, stop);

    let reason = stopped.recv().unwrap_or(StopReason::UiClosed);
    info!(target: RUNTIME_TARGET, reason = ?reason, "stopping host");
    broker.shutdown();
    bridge.finish();
    ide.shutdown();
    Ok(reason)
}

fn listen_for_signal(signal: Arc<dyn ShutdownSignal>, stop: Sender<StopReason>) {
    let spawned = thread::Builder::new()
        .name(String::from("shuttle-signals"))
        .spawn(move || match signal.wait() {
            Ok(()) => drop(stop.send(StopReason::Signal)),
            Err(error) => {
                error!(target: RUNTIME_TARGET, error = %error, "signal listener failed");
            }
        });
    if let Err(error) = spawned {
        error!(target: RUNTIME_TARGET, error = %error, "failed to start signal listener");
    }
}

/// Reports core lifecycle events and turns a core exit into a stop request.
struct HostObserver {
    reporter: Arc<dyn HealthReporter>,
    stop: Sender<StopReason>,
}

impl BrokerObserver for HostObserver {
    fn core_exited(&self, code: Option<i32>) {
        self.reporter.core_exited(code);
        drop(self.stop.send(StopReason::CoreExited { code }));
    }

    fn stream_failed(&self, stream: Stream, error: &TransportError) {
        error!(target: RUNTIME_TARGET, %stream, error = %error, "core stream failed");
    }
}
