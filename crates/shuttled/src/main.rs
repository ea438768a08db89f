use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use shuttled::{
    LaunchError, StopReason, StructuredHealthReporter, SystemConfigLoader, SystemShutdownSignal,
    launch,
};

fn main() -> ExitCode {
    match launch(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        Arc::new(SystemShutdownSignal),
    ) {
        Ok(StopReason::CoreExited { code: Some(code) }) if code != 0 => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        // Telemetry may not exist yet, so bootstrap failures go straight to stderr.
        Err(LaunchError::Bootstrap(error)) => {
            drop(writeln!(io::stderr(), "shuttled: {error}"));
            ExitCode::from(2)
        }
        Err(error) => {
            tracing::error!(target: "shuttled::main", error = %error, "host failed to start");
            ExitCode::FAILURE
        }
    }
}
