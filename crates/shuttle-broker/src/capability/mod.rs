//! The host capability interface consumed by the dispatcher.
//!
//! [`IdeCapabilities`] is implemented by the host integration; the broker only
//! calls it. Methods returning static metadata have defaults. Everything that
//! touches the filesystem, editor, clipboard, or child processes is fallible.

mod text;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CapabilityError;

pub use text::{read_range, repo_name_from_remote};

/// Static description of the host IDE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeInfo {
    /// IDE family reported to the core.
    pub ide_type: String,
    /// Human-readable product name.
    pub name: String,
    /// Product version.
    pub version: String,
    /// Remote session name, empty when local.
    pub remote_name: String,
    /// Version of the integration itself.
    pub extension_version: String,
    /// Whether the integration is a pre-release build.
    pub is_prerelease: bool,
}

/// Settings reported to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeSettings {
    /// Remote configuration server, if any.
    pub remote_config_server_url: Option<String>,
    /// Remote configuration refresh period in milliseconds.
    pub remote_config_sync_period: u64,
    /// Token used by the core for authenticated calls.
    pub user_token: String,
    /// Test environment marker.
    pub continue_test_environment: String,
    /// Whether indexing waits for an explicit start.
    pub pause_codebase_index_on_start: bool,
}

impl Default for IdeSettings {
    fn default() -> Self {
        Self {
            remote_config_server_url: None,
            remote_config_sync_period: 60_000,
            user_token: String::new(),
            continue_test_environment: String::from("none"),
            pause_codebase_index_on_start: false,
        }
    }
}

/// The active editor's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentFile {
    /// Whether the document has never been saved.
    pub is_untitled: bool,
    /// Path or URI of the document.
    pub path: String,
    /// Current editor contents.
    pub contents: String,
}

/// Payload answering the UI's on-load handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnLoadPayload {
    /// Identifier of this host window.
    pub window_id: String,
    /// Workspace roots.
    pub workspace_paths: Vec<String>,
    /// Stable machine identifier.
    pub vsc_machine_id: String,
    /// Base URL for UI media.
    pub vsc_media_url: String,
    /// RFC 3339 timestamp of the handshake.
    pub loaded_at: String,
}

/// Severity of a transient notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ToastLevel {
    /// Informational.
    #[default]
    Info,
    /// Something needs attention.
    Warning,
    /// Something failed.
    Error,
}

impl ToastLevel {
    /// Parses a level, falling back to [`ToastLevel::Info`].
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

/// Environment capabilities answered on behalf of the core and the UI.
pub trait IdeCapabilities: Send + Sync {
    /// Static IDE metadata.
    fn ide_info(&self) -> IdeInfo;

    /// Settings reported to the core.
    fn ide_settings(&self) -> IdeSettings {
        IdeSettings::default()
    }

    /// Workspace root directories.
    fn workspace_dirs(&self) -> Vec<String>;

    /// Stable machine identifier.
    fn unique_id(&self) -> String;

    /// Whether telemetry is enabled.
    fn is_telemetry_enabled(&self) -> bool {
        false
    }

    /// Whether the workspace lives on a remote host.
    fn is_workspace_remote(&self) -> bool {
        false
    }

    /// Contents of the integrated terminal.
    fn terminal_contents(&self) -> String {
        String::new()
    }

    /// Payload for the UI's on-load handshake.
    fn on_load(&self) -> OnLoadPayload;

    /// Whether `path` exists.
    fn file_exists(&self, path: &str) -> bool;

    /// Reads a whole file.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Io`] when the file cannot be read.
    fn read_file(&self, path: &str) -> Result<String, CapabilityError>;

    /// Reads lines `start..end` of a file, clamped to its length.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Io`] when the file cannot be read.
    fn read_range_in_file(
        &self,
        path: &str,
        start_line: usize,
        end_line: usize,
    ) -> Result<String, CapabilityError> {
        let contents = self.read_file(path)?;
        Ok(read_range(&contents, start_line, end_line))
    }

    /// Replaces a file's contents.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Io`] when the file cannot be written.
    fn write_file(&self, path: &str, contents: &str) -> Result<(), CapabilityError>;

    /// Opens a file in the editor.
    ///
    /// # Errors
    ///
    /// Returns an error when the editor cannot be reached.
    fn open_file(&self, path: &str) -> Result<(), CapabilityError>;

    /// Paths of the files open in the editor.
    ///
    /// # Errors
    ///
    /// Returns an error when the editor cannot be reached.
    fn open_files(&self) -> Result<Vec<String>, CapabilityError>;

    /// The active document, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the editor cannot be reached.
    fn current_file(&self) -> Result<Option<CurrentFile>, CapabilityError>;

    /// Runs a shell command and captures its stdout lines.
    ///
    /// Without `cwd` the command runs in the primary workspace.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Command`] when the command cannot start.
    fn run_command(
        &self,
        command: &str,
        cwd: Option<PathBuf>,
    ) -> Result<Vec<String>, CapabilityError>;

    /// `git diff` of the primary workspace, one entry per line.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Command`] when git cannot be run.
    fn diff(&self, include_unstaged: bool) -> Result<Vec<String>, CapabilityError>;

    /// Current branch of the repository containing `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Command`] when git cannot be run.
    fn branch(&self, dir: &str) -> Result<String, CapabilityError>;

    /// `owner/name` of the repository's `origin` remote.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Command`] when git cannot be run.
    fn repo_name(&self, dir: &str) -> Result<Option<String>, CapabilityError>;

    /// Shows a transient notification.
    ///
    /// # Errors
    ///
    /// Returns an error when the notification surface is unavailable.
    fn show_toast(&self, level: ToastLevel, message: &str) -> Result<(), CapabilityError>;

    /// Places text on the system clipboard.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Unavailable`] when no clipboard exists.
    fn copy_text(&self, text: &str) -> Result<(), CapabilityError>;
}
