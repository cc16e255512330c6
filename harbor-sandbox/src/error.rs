//! Error types for the sandbox host.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("extension already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("extension not loaded: {0}")]
    NotLoaded(String),

    #[error("timeout: extension '{extension_id}' did not activate within {timeout_ms}ms")]
    ActivationTimeout { extension_id: String, timeout_ms: u64 },

    #[error("activation failed: {extension_id}: {message}")]
    ActivationFailed { extension_id: String, message: String },

    #[error("worker crashed: {extension_id}: {message}")]
    WorkerCrashed { extension_id: String, message: String },

    #[error("could not start unit for '{extension_id}': {message}")]
    Spawn { extension_id: String, message: String },

    #[error("unit channel closed: {0}")]
    ChannelClosed(String),

    #[error("frame error: {0}")]
    Frame(#[from] harbor_types::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
