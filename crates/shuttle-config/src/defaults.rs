use camino::Utf8PathBuf;

/// Executable name launched when no core path is configured.
pub const DEFAULT_CORE_EXECUTABLE: &str = "continue-binary";

/// Default log filter expression used by the host.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Outbound backlog size that triggers a warning about a stalled core.
pub const DEFAULT_QUEUE_WARN_THRESHOLD: usize = 1024;

/// Default bound on a single hop onto the UI-owning thread.
pub const DEFAULT_AFFINITY_TIMEOUT_MS: u64 = 5_000;

/// Default core executable path.
#[must_use]
pub fn default_core_executable() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_CORE_EXECUTABLE)
}

/// Default log filter expression used by the host.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the host.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default write-queue backlog warning threshold.
#[must_use]
pub const fn default_queue_warn_threshold() -> usize {
    DEFAULT_QUEUE_WARN_THRESHOLD
}

/// Default UI-context hop timeout in milliseconds.
#[must_use]
pub const fn default_affinity_timeout_ms() -> u64 {
    DEFAULT_AFFINITY_TIMEOUT_MS
}
