//! Structured lifecycle reporting for the host.

use std::sync::Arc;

use shuttle_config::Config;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = "shuttled::health";

/// Observer for host lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Configuration loading is about to begin.
    fn bootstrap_starting(&self);

    /// Configuration and telemetry are ready.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Bootstrap stopped with `error`.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// The core process is running.
    fn core_started(&self, pid: u32);

    /// The core process went away.
    fn core_exited(&self, code: Option<i32>);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn core_started(&self, pid: u32) {
        (**self).core_started(pid);
    }

    fn core_exited(&self, code: Option<i32>) {
        (**self).core_exited(code);
    }
}

/// Reporter that emits one `tracing` event per lifecycle step.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting host bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            core_executable = %config.core_executable(),
            log_format = %config.log_format(),
            "host bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "host bootstrap failed"
        );
    }

    fn core_started(&self, pid: u32) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "core_started",
            pid,
            "core process running"
        );
    }

    fn core_exited(&self, code: Option<i32>) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "core_exited",
            code = ?code,
            "core process exited"
        );
    }
}
