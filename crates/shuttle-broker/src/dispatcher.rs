//! Fixed dispatch table from message type to capability handler.
//!
//! Handlers read their arguments from the request payload, call the injected
//! [`IdeCapabilities`], and return plain JSON. A missing argument or a failed
//! capability call yields `null` rather than an error, so the requester's
//! pending correlation always resolves.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::capability::{IdeCapabilities, ToastLevel};
use crate::error::CapabilityError;

/// Log target for capability dispatch.
const DISPATCH_TARGET: &str = "shuttle_broker::dispatch";

type Handler = fn(&dyn IdeCapabilities, &Value) -> Result<Value, CapabilityError>;

const HANDLERS: &[(&str, Handler)] = &[
    ("jetbrains/onLoad", |ide, _| encode(ide.on_load())),
    ("jetbrains/isOSREnabled", |_, _| Ok(Value::Bool(true))),
    ("jetbrains/getColors", |_, _| Ok(Value::Object(Map::new()))),
    ("toggleDevTools", |_, _| Ok(Value::Null)),
    ("showTutorial", |_, _| Ok(Value::Null)),
    ("getIdeInfo", |ide, _| encode(ide.ide_info())),
    ("getIdeSettings", |ide, _| encode(ide.ide_settings())),
    ("getWorkspaceDirs", |ide, _| encode(ide.workspace_dirs())),
    ("getUniqueId", |ide, _| Ok(Value::String(ide.unique_id()))),
    ("isTelemetryEnabled", |ide, _| {
        Ok(Value::Bool(ide.is_telemetry_enabled()))
    }),
    ("isWorkspaceRemote", |ide, _| {
        Ok(Value::Bool(ide.is_workspace_remote()))
    }),
    ("getOpenFiles", |ide, _| encode(ide.open_files()?)),
    ("getCurrentFile", |ide, _| encode(ide.current_file()?)),
    ("getTerminalContents", |ide, _| {
        Ok(Value::String(ide.terminal_contents()))
    }),
    ("fileExists", file_exists),
    ("readFile", read_file),
    ("readRangeInFile", read_range_in_file),
    ("writeFile", write_file),
    ("openFile", open_file),
    ("runCommand", run_command),
    ("getDiff", diff),
    ("getBranch", branch),
    ("getRepoName", repo_name),
    ("showToast", show_toast),
    ("copyText", copy_text),
];

/// Routes capability requests to handlers.
pub struct CapabilityDispatcher {
    ide: Arc<dyn IdeCapabilities>,
    handlers: HashMap<&'static str, Handler>,
}

impl CapabilityDispatcher {
    /// Builds the dispatcher over `ide`.
    #[must_use]
    pub fn new(ide: Arc<dyn IdeCapabilities>) -> Self {
        Self {
            ide,
            handlers: HANDLERS.iter().copied().collect(),
        }
    }

    /// Whether a handler exists for `message_type`.
    #[must_use]
    pub fn handles(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// All message types with a handler.
    pub fn message_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Answers a capability request.
    ///
    /// Returns `None` for an unknown type. Handler failures are logged and
    /// answered with `null`.
    #[must_use]
    pub fn dispatch(&self, message_type: &str, data: &Value) -> Option<Value> {
        let handler = self.handlers.get(message_type)?;
        debug!(target: DISPATCH_TARGET, message_type, "dispatching capability request");
        match handler(self.ide.as_ref(), data) {
            Ok(result) => Some(result),
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    message_type,
                    error = %error,
                    "capability request failed, answering null"
                );
                Some(Value::Null)
            }
        }
    }
}

impl std::fmt::Debug for CapabilityDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityDispatcher")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, CapabilityError> {
    Ok(serde_json::to_value(value)?)
}

fn str_field<'a>(data: &'a Value, field: &'static str) -> Result<&'a str, CapabilityError> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or(CapabilityError::MissingField { field })
}

fn line_field(data: &Value, bound: &'static str) -> Result<usize, CapabilityError> {
    data.get("range")
        .and_then(|range| range.get(bound))
        .and_then(|position| position.get("line"))
        .and_then(Value::as_u64)
        .and_then(|line| usize::try_from(line).ok())
        .ok_or(CapabilityError::MissingField { field: "range" })
}

fn file_exists(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    Ok(Value::Bool(ide.file_exists(str_field(data, "filepath")?)))
}

fn read_file(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    Ok(Value::String(ide.read_file(str_field(data, "filepath")?)?))
}

fn read_range_in_file(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    let path = str_field(data, "filepath")?;
    let start = line_field(data, "start")?;
    let end = line_field(data, "end")?;
    Ok(Value::String(ide.read_range_in_file(path, start, end)?))
}

fn write_file(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    ide.write_file(str_field(data, "filepath")?, str_field(data, "contents")?)?;
    Ok(Value::Null)
}

fn open_file(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    ide.open_file(str_field(data, "filepath")?)?;
    Ok(Value::Null)
}

fn run_command(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    let command = str_field(data, "command")?;
    let cwd = data.get("cwd").and_then(Value::as_str).map(PathBuf::from);
    let output = ide.run_command(command, cwd)?;
    Ok(Value::String(output.join("\n")))
}

fn diff(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    let include_unstaged = data
        .get("includeUnstaged")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    encode(ide.diff(include_unstaged)?)
}

fn branch(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    Ok(Value::String(ide.branch(str_field(data, "dir")?)?))
}

fn repo_name(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    encode(ide.repo_name(str_field(data, "dir")?)?)
}

fn show_toast(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    let level = data
        .get("type")
        .and_then(Value::as_str)
        .map(ToastLevel::parse_lenient)
        .unwrap_or_default();
    ide.show_toast(level, str_field(data, "message")?)?;
    Ok(Value::Null)
}

fn copy_text(ide: &dyn IdeCapabilities, data: &Value) -> Result<Value, CapabilityError> {
    ide.copy_text(str_field(data, "text")?)?;
    Ok(Value::Null)
}

#[cfg(test)]
mod tests;
