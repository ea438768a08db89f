//! Host daemon for the shuttle broker.
//!
//! `shuttled` loads layered configuration, installs structured telemetry,
//! and runs a [`shuttle_broker::Broker`] between its own stdio (the UI
//! channel) and a spawned core process. Capability queries are answered by
//! [`LocalIde`] from the local machine. The host stops on a termination
//! signal, when the UI closes stdin, or when the core exits.

pub mod bootstrap;
pub mod bridge;
pub mod health;
pub mod host;
pub mod runtime;
pub mod shutdown;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Host, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use bridge::StdioUiBridge;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use host::LocalIde;
pub use runtime::{LaunchError, StopReason, core_command, launch, routing_table, serve};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
