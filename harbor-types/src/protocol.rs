//! Host ↔ sandbox wire protocol.
//!
//! Every message is a JSON object with a `type` discriminator and camelCase
//! fields, carried across the unit boundary as an opaque [`Frame`]. Neither
//! side shares memory with the other; a frame is the only thing that crosses.
//!
//! Host → unit: `activate`, `deactivate`, `event`, `api-response`.
//! Unit → host: `activated`, `error`, `api-call`, `log`, `emit-event`.

use crate::{CallId, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Serialized message bytes crossing the unit boundary.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Serializes a message into a frame.
    pub fn encode<T: Serialize>(message: &T) -> Result<Self> {
        Ok(Self(serde_json::to_vec(message)?))
    }

    /// Deserializes a frame. Unknown message kinds and malformed payloads
    /// both yield [`Error::InvalidFrame`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.0).map_err(|e| Error::InvalidFrame(e.to_string()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", String::from_utf8_lossy(&self.0))
    }
}

/// Message sent by the host to a sandboxed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostMessage {
    Activate,
    Deactivate,
    Event {
        event: String,
        #[serde(default)]
        data: Value,
    },
    ApiResponse(ApiResponse),
}

/// Message sent by a sandboxed unit to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerMessage {
    Activated {
        #[serde(default)]
        exports: Value,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    ApiCall(ApiCall),
    Log {
        level: LogLevel,
        #[serde(default)]
        args: Vec<Value>,
    },
    EmitEvent {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

impl WorkerMessage {
    /// Wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "activated",
            Self::Error { .. } => "error",
            Self::ApiCall(_) => "api-call",
            Self::Log { .. } => "log",
            Self::EmitEvent { .. } => "emit-event",
        }
    }
}

/// A capability invocation issued by plugin code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCall {
    pub call_id: CallId,
    pub namespace: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// The host's answer to an [`ApiCall`], correlated by `call_id`.
/// Exactly one of `result` and `error` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub call_id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl ApiResponse {
    pub fn ok(call_id: CallId, result: Value) -> Self {
        Self {
            call_id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(call_id: CallId, error: RemoteError) -> Self {
        Self {
            call_id,
            result: None,
            error: Some(error),
        }
    }

    /// Collapses the response into a result. A missing `result` is `null`.
    pub fn into_result(self) -> std::result::Result<Value, RemoteError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Structured error carried across the unit boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Severity of a forwarded log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Log,
    Info,
    Warn,
    Error,
}
