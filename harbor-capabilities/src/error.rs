//! Error types for the capability surface.

use harbor_types::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("unknown capability: {namespace}.{method}")]
    UnknownCapability { namespace: String, method: String },

    #[error("invalid arguments for {method}: {message}")]
    InvalidArguments { method: String, message: String },

    #[error("{0} is not available")]
    Unavailable(String),

    #[error("local chat backend unavailable: {0}")]
    ChatUnavailable(String),

    #[error("permission denied: extension '{extension_id}' lacks '{permission}' permission")]
    PermissionDenied {
        extension_id: String,
        permission: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CapabilityError {
    /// Stable machine-readable code carried on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCapability { .. } => "UNKNOWN_CAPABILITY",
            Self::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::ChatUnavailable(_) => "CHAT_UNAVAILABLE",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Backend(_) => "BACKEND_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Converts the error into its serializable form for an `api-response`.
    pub fn to_remote(&self) -> RemoteError {
        RemoteError::new(self.code(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CapabilityError>;
