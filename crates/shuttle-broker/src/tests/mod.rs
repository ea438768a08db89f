//! Crate-level behaviour and subprocess tests.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::capability::{CurrentFile, IdeCapabilities, IdeInfo, OnLoadPayload, ToastLevel};
use crate::envelope::Envelope;
use crate::error::CapabilityError;
use crate::registry::Continuation;
use crate::ui::UiSink;

mod behaviour;

const WAIT: Duration = Duration::from_secs(5);

/// Capability double backed by the real filesystem.
struct FakeIde;

impl IdeCapabilities for FakeIde {
    fn ide_info(&self) -> IdeInfo {
        IdeInfo {
            ide_type: "jetbrains".into(),
            name: "test".into(),
            version: "0.0.0".into(),
            remote_name: String::new(),
            extension_version: "0.0.0".into(),
            is_prerelease: false,
        }
    }

    fn workspace_dirs(&self) -> Vec<String> {
        vec!["/workspace".into()]
    }

    fn unique_id(&self) -> String {
        "machine-1".into()
    }

    fn on_load(&self) -> OnLoadPayload {
        OnLoadPayload {
            window_id: "window-1".into(),
            workspace_paths: self.workspace_dirs(),
            vsc_machine_id: self.unique_id(),
            vsc_media_url: String::new(),
            loaded_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn file_exists(&self, path: &str) -> bool {
        PathBuf::from(path).exists()
    }

    fn read_file(&self, path: &str) -> Result<String, CapabilityError> {
        fs::read_to_string(path).map_err(|error| CapabilityError::io(path, error))
    }

    fn write_file(&self, path: &str, contents: &str) -> Result<(), CapabilityError> {
        fs::write(path, contents).map_err(|error| CapabilityError::io(path, error))
    }

    fn open_file(&self, _path: &str) -> Result<(), CapabilityError> {
        Ok(())
    }

    fn open_files(&self) -> Result<Vec<String>, CapabilityError> {
        Ok(Vec::new())
    }

    fn current_file(&self) -> Result<Option<CurrentFile>, CapabilityError> {
        Ok(None)
    }

    fn run_command(
        &self,
        command: &str,
        _cwd: Option<PathBuf>,
    ) -> Result<Vec<String>, CapabilityError> {
        Err(CapabilityError::Command {
            command: command.to_owned(),
            message: "commands are disabled in tests".into(),
        })
    }

    fn diff(&self, _include_unstaged: bool) -> Result<Vec<String>, CapabilityError> {
        Ok(Vec::new())
    }

    fn branch(&self, _dir: &str) -> Result<String, CapabilityError> {
        Ok("main".into())
    }

    fn repo_name(&self, _dir: &str) -> Result<Option<String>, CapabilityError> {
        Ok(None)
    }

    fn show_toast(&self, _level: ToastLevel, _message: &str) -> Result<(), CapabilityError> {
        Ok(())
    }

    fn copy_text(&self, _text: &str) -> Result<(), CapabilityError> {
        Ok(())
    }
}

/// UI sink that records every envelope.
#[derive(Default)]
struct RecordingSink {
    posted: Mutex<Vec<Envelope>>,
}

impl RecordingSink {
    fn posted(&self) -> Vec<Envelope> {
        self.posted.lock().expect("sink lock").clone()
    }

    fn wait_for(&self, message_type: &str) -> Envelope {
        let deadline = Instant::now() + WAIT;
        loop {
            if let Some(found) = self
                .posted()
                .into_iter()
                .find(|envelope| envelope.message_type == message_type)
            {
                return found;
            }
            assert!(Instant::now() < deadline, "no {message_type} posted to UI");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl UiSink for RecordingSink {
    fn post(&self, envelope: Envelope) {
        self.posted.lock().expect("sink lock").push(envelope);
    }
}

/// In-memory stand-in for the core's stdin.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().expect("buffer lock").clone();
        String::from_utf8(bytes)
            .expect("utf8")
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A continuation that forwards each payload to a channel.
fn channel_continuation() -> (Continuation, mpsc::Receiver<Value>) {
    let (sender, receiver) = mpsc::channel();
    let continuation: Continuation = Box::new(move |data: &Value| {
        drop(sender.send(data.clone()));
    });
    (continuation, receiver)
}
