//! Log shim that forwards plugin output to the host.
//!
//! The host re-emits each `log` message through its own tracing subscriber,
//! so plugins never write to the process's outputs directly.

use crate::rpc::Outbox;
use harbor_types::{LogLevel, WorkerMessage};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;
use tracing::debug;

/// Nesting depth past which values are replaced with [`CIRCULAR_MARKER`].
pub const MAX_LOG_DEPTH: usize = 16;

pub const CIRCULAR_MARKER: &str = "[Circular]";

#[derive(Clone)]
pub struct Console {
    outbox: Outbox,
}

impl Console {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log_values(LogLevel::Debug, vec![Value::String(message.into())]);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.log_values(LogLevel::Log, vec![Value::String(message.into())]);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log_values(LogLevel::Info, vec![Value::String(message.into())]);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log_values(LogLevel::Warn, vec![Value::String(message.into())]);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log_values(LogLevel::Error, vec![Value::String(message.into())]);
    }

    /// Sends structured arguments, sanitized, at the given level.
    pub fn log_values(&self, level: LogLevel, args: Vec<Value>) {
        let args = args.iter().map(|v| sanitize(v, 0)).collect();
        if self.outbox.send(&WorkerMessage::Log { level, args }).is_err() {
            debug!("Host channel closed; log message dropped");
        }
    }
}

/// Converts any loggable value to JSON, falling back to its `Debug` form when
/// it cannot be serialized.
pub fn loggable<T: Serialize + Debug + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(_) => Value::String(format!("{value:?}")),
    }
}

/// Replaces nesting beyond [`MAX_LOG_DEPTH`] with [`CIRCULAR_MARKER`].
pub fn sanitize(value: &Value, depth: usize) -> Value {
    if depth >= MAX_LOG_DEPTH && (value.is_object() || value.is_array()) {
        return Value::String(CIRCULAR_MARKER.to_string());
    }
    match value {
        Value::Array(items) => Value::Array(items.iter().map(|v| sanitize(v, depth + 1)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), sanitize(v, depth + 1)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}
