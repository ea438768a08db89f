//! Core subprocess transport.
//!
//! [`CoreProcess::spawn`] launches the core with piped stdio and hands the
//! three streams back as [`CoreStreams`]. Output pipes are consumed through
//! [`LineReader`], which yields lossy UTF-8 lines until EOF. The process
//! handle itself only supports reaping and termination.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use strum::Display;
use tracing::{debug, warn};

use crate::error::{SpawnError, TransportError};

/// Log target for transport operations.
pub(crate) const TRANSPORT_TARGET: &str = "shuttle_broker::transport";

/// Time the core is given to exit on its own before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_millis(200);

/// Polling interval while reaping a core whose stdout closed.
const REAP_POLL: Duration = Duration::from_millis(20);

/// Number of polls before a reap gives up.
const REAP_ATTEMPTS: u32 = 10;

/// One of the core's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stream {
    /// The core's input channel.
    Stdin,
    /// The core's envelope output channel.
    Stdout,
    /// The core's diagnostic output.
    Stderr,
}

/// Liveness of the core process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// The process is being launched.
    Starting,
    /// The process is running.
    Running {
        /// Operating system process id.
        pid: u32,
    },
    /// The process has exited or its output channel closed.
    Exited {
        /// Exit code, when the process exited normally and was reaped.
        code: Option<i32>,
    },
}

/// How to launch the core.
///
/// No arguments are passed; the core's argv is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreCommand {
    executable: PathBuf,
    working_dir: Option<PathBuf>,
}

impl CoreCommand {
    /// Launches `executable` from its own directory.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: None,
        }
    }

    /// Overrides the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// The effective working directory.
    ///
    /// Defaults to the executable's parent; `None` for a bare program name.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref().or_else(|| {
            self.executable
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
        })
    }
}

/// The piped standard streams of a freshly spawned core.
#[derive(Debug)]
pub struct CoreStreams {
    /// Write side of the envelope channel.
    pub stdin: ChildStdin,
    /// Read side of the envelope channel.
    pub stdout: ChildStdout,
    /// Diagnostic output.
    pub stderr: ChildStderr,
}

/// Handle to the running core.
///
/// Owned exclusively by the broker. [`CoreProcess::terminate`] is idempotent.
#[derive(Debug)]
pub struct CoreProcess {
    pid: u32,
    command: String,
    child: Mutex<Option<Child>>,
    exit_code: Mutex<Option<i32>>,
}

impl CoreProcess {
    /// Spawns the core with piped stdio.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::BinaryNotFound`] when the executable is missing
    /// and [`SpawnError::SpawnFailed`] for any other launch failure.
    pub fn spawn(command: &CoreCommand) -> Result<(Self, CoreStreams), SpawnError> {
        let label = command.executable().display().to_string();
        debug!(
            target: TRANSPORT_TARGET,
            command = %label,
            working_dir = ?command.working_dir(),
            "spawning core process"
        );

        let mut process = Command::new(command.executable());
        process
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = command.working_dir() {
            process.current_dir(dir);
        }

        let mut child = process.spawn().map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                SpawnError::BinaryNotFound {
                    command: label.clone(),
                    source: Arc::new(source),
                }
            } else {
                SpawnError::SpawnFailed {
                    command: label.clone(),
                    message: String::from("process could not be started"),
                    source: Arc::new(source),
                }
            }
        })?;

        let streams = match take_streams(&mut child, &label) {
            Ok(streams) => streams,
            Err(error) => {
                drop(child.kill());
                drop(child.wait());
                return Err(error);
            }
        };

        let pid = child.id();
        debug!(target: TRANSPORT_TARGET, command = %label, pid, "core process spawned");

        Ok((
            Self {
                pid,
                command: label,
                child: Mutex::new(Some(child)),
                exit_code: Mutex::new(None),
            },
            streams,
        ))
    }

    /// Operating system process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Waits briefly for the process to exit after its output closed.
    ///
    /// Returns the exit code if the process was reaped within the polling
    /// window. A process still running afterwards is left for
    /// [`CoreProcess::terminate`].
    pub fn reap(&self) -> Option<i32> {
        for _ in 0..REAP_ATTEMPTS {
            let mut slot = self.lock_child();
            let Some(child) = slot.as_mut() else {
                return self.recorded_exit();
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    *slot = None;
                    return self.record_exit(status);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        target: TRANSPORT_TARGET,
                        command = %self.command,
                        error = %error,
                        "failed to check core process status"
                    );
                    return None;
                }
            }
            drop(slot);
            thread::sleep(REAP_POLL);
        }
        None
    }

    /// Stops the process, killing it if it does not exit within a short grace
    /// period. Safe to call repeatedly.
    pub fn terminate(&self) -> Option<i32> {
        let Some(mut child) = self.lock_child().take() else {
            return self.recorded_exit();
        };

        let status = match child.try_wait() {
            Ok(Some(status)) => Some(status),
            Ok(None) | Err(_) => {
                thread::sleep(TERMINATE_GRACE);
                match child.try_wait() {
                    Ok(Some(status)) => Some(status),
                    Ok(None) | Err(_) => {
                        warn!(
                            target: TRANSPORT_TARGET,
                            command = %self.command,
                            pid = self.pid,
                            "core did not exit gracefully, killing"
                        );
                        if let Err(error) = child.kill() {
                            warn!(
                                target: TRANSPORT_TARGET,
                                command = %self.command,
                                error = %error,
                                "failed to kill core process"
                            );
                        }
                        child.wait().ok()
                    }
                }
            }
        };

        status.and_then(|exit| self.record_exit(exit))
    }

    fn lock_child(&self) -> std::sync::MutexGuard<'_, Option<Child>> {
        self.child
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn record_exit(&self, status: ExitStatus) -> Option<i32> {
        debug!(target: TRANSPORT_TARGET, command = %self.command, ?status, "core process exited");
        let code = status.code();
        *self
            .exit_code
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = code;
        code
    }

    fn recorded_exit(&self) -> Option<i32> {
        *self
            .exit_code
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Drop for CoreProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.lock_child().take() {
            if let Err(error) = child.kill() {
                debug!(
                    target: TRANSPORT_TARGET,
                    command = %self.command,
                    error = %error,
                    "failed to kill core process on drop"
                );
            } else {
                drop(child.wait());
            }
        }
    }
}

fn take_streams(child: &mut Child, command: &str) -> Result<CoreStreams, SpawnError> {
    let missing = |stream: Stream| SpawnError::SpawnFailed {
        command: command.to_owned(),
        message: format!("failed to capture {stream}"),
        source: Arc::new(std::io::Error::other(format!("no {stream}"))),
    };
    let stdin = child.stdin.take().ok_or_else(|| missing(Stream::Stdin))?;
    let stdout = child.stdout.take().ok_or_else(|| missing(Stream::Stdout))?;
    let stderr = child.stderr.take().ok_or_else(|| missing(Stream::Stderr))?;
    Ok(CoreStreams {
        stdin,
        stdout,
        stderr,
    })
}

/// Lazily yields newline-delimited lines from a byte stream.
///
/// Invalid UTF-8 is replaced rather than rejected. The sequence ends at EOF
/// or after the first read error and cannot be restarted.
pub struct LineReader<R> {
    reader: BufReader<R>,
    stream: Stream,
    buffer: Vec<u8>,
    finished: bool,
}

impl<R: Read> LineReader<R> {
    /// Wraps `reader`, labelling errors with `stream`.
    pub fn new(reader: R, stream: Stream) -> Self {
        Self {
            reader: BufReader::new(reader),
            stream,
            buffer: Vec::new(),
            finished: false,
        }
    }
}

impl<R: Read> Iterator for LineReader<R> {
    type Item = Result<String, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.buffer.clear();
        loop {
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {
                    while matches!(self.buffer.last(), Some(b'\n' | b'\r')) {
                        self.buffer.pop();
                    }
                    return Some(Ok(String::from_utf8_lossy(&self.buffer).into_owned()));
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) => {
                    self.finished = true;
                    return Some(Err(TransportError::Read {
                        stream: self.stream,
                        source: Arc::new(error),
                    }));
                }
            }
        }
    }
}
