//! Error types for code running inside a sandbox.

use harbor_types::RemoteError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("api call {namespace}.{method} timed out after {}s", .timeout.as_secs())]
    ApiCallTimeout {
        namespace: String,
        method: String,
        timeout: Duration,
    },

    /// A capability failed on the host side.
    #[error("{0}")]
    Remote(RemoteError),

    #[error("host channel closed")]
    ChannelClosed,

    #[error("entry point not found: {}", .0.display())]
    EntryNotFound(PathBuf),

    #[error("module '{0}' is not allowed in the sandbox")]
    ModuleNotAllowed(String),

    #[error("module '{0}' resolves outside the extension directory")]
    ModuleAccessDenied(String),

    #[error("module not found: {}", .0.display())]
    ModuleNotFound(PathBuf),

    #[error("no plugin registered for extension '{0}'")]
    PluginNotRegistered(String),

    #[error("module '{module}' requires the '{permission}' permission")]
    PermissionDenied { module: String, permission: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("frame error: {0}")]
    Frame(#[from] harbor_types::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),
}

impl SdkError {
    /// The host-side error code, if this error came from the host.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Self::Remote(e) => Some(&e.code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
