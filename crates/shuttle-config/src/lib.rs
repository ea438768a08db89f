//! Shared configuration for the shuttle broker host.
//!
//! Values are layered by `ortho_config`: built-in defaults first, then an
//! optional TOML file (`--config-path` or `SHUTTLE_CONFIG_PATH`), then
//! `SHUTTLE_*` environment variables, and finally command-line flags. The
//! resolved [`Config`] tells the host which core executable to launch, how
//! to log, and which protocol extensions to enable on the routing tables.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_AFFINITY_TIMEOUT_MS, DEFAULT_CORE_EXECUTABLE, DEFAULT_LOG_FILTER,
    DEFAULT_QUEUE_WARN_THRESHOLD, default_affinity_timeout_ms, default_core_executable,
    default_log_filter, default_log_filter_string, default_log_format,
    default_queue_warn_threshold,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for the broker host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SHUTTLE")]
pub struct Config {
    /// Path to the core worker executable launched as a subprocess.
    #[serde(default = "defaults::default_core_executable")]
    #[ortho_config(default = defaults::default_core_executable())]
    pub core_executable: Utf8PathBuf,
    /// Working directory for the core; defaults to the executable's parent.
    #[serde(default)]
    pub core_working_dir: Option<Utf8PathBuf>,
    /// Workspace roots reported to the core. Empty means "current directory".
    #[serde(default)]
    pub workspace_dirs: Vec<String>,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Outbound backlog size that triggers a stalled-core warning.
    #[serde(default = "defaults::default_queue_warn_threshold")]
    #[ortho_config(default = defaults::default_queue_warn_threshold())]
    pub queue_warn_threshold: usize,
    /// Upper bound, in milliseconds, for hops onto the UI-owning thread.
    #[serde(default = "defaults::default_affinity_timeout_ms")]
    #[ortho_config(default = defaults::default_affinity_timeout_ms())]
    pub affinity_timeout_ms: u64,
    /// Additional core-originated message types relayed to the UI.
    #[serde(default)]
    pub extra_ui_pass_through: Vec<String>,
    /// Additional UI-originated message types relayed to the core.
    #[serde(default)]
    pub extra_core_pass_through: Vec<String>,
    /// Base URL for UI media assets, reported in the on-load payload.
    #[serde(default)]
    pub media_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core_executable: default_core_executable(),
            core_working_dir: None,
            workspace_dirs: Vec::new(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            queue_warn_threshold: DEFAULT_QUEUE_WARN_THRESHOLD,
            affinity_timeout_ms: DEFAULT_AFFINITY_TIMEOUT_MS,
            extra_ui_pass_through: Vec::new(),
            extra_core_pass_through: Vec::new(),
            media_url: String::new(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument iterator.
    ///
    /// The first item is treated as the program name.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Path of the core executable.
    #[must_use]
    pub fn core_executable(&self) -> &Utf8Path {
        self.core_executable.as_path()
    }

    /// Working directory for the core process.
    ///
    /// Falls back to the directory containing the executable, or `None` when
    /// the executable path is bare (resolved through `PATH`).
    #[must_use]
    pub fn core_working_dir(&self) -> Option<&Utf8Path> {
        self.core_working_dir.as_deref().or_else(|| {
            self.core_executable
                .parent()
                .filter(|parent| !parent.as_str().is_empty())
        })
    }

    /// Configured workspace roots.
    #[must_use]
    pub fn workspace_dirs(&self) -> &[String] {
        &self.workspace_dirs
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Backlog warning threshold for the outbound write queue.
    #[must_use]
    pub const fn queue_warn_threshold(&self) -> usize {
        self.queue_warn_threshold
    }

    /// Timeout for UI-context hops.
    #[must_use]
    pub const fn affinity_timeout(&self) -> Duration {
        Duration::from_millis(self.affinity_timeout_ms)
    }

    /// Extra core-to-UI pass-through message types.
    #[must_use]
    pub fn extra_ui_pass_through(&self) -> &[String] {
        &self.extra_ui_pass_through
    }

    /// Extra UI-to-core pass-through message types.
    #[must_use]
    pub fn extra_core_pass_through(&self) -> &[String] {
        &self.extra_core_pass_through
    }

    /// Media base URL reported to the UI.
    #[must_use]
    pub fn media_url(&self) -> &str {
        &self.media_url
    }
}
