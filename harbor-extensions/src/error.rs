//! Error types for extension management.

use harbor_sandbox::SandboxError;
use harbor_types::ExtensionState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("extension not found: {0}")]
    NotFound(String),

    #[error("extension '{0}' is built in and cannot be uninstalled")]
    BuiltinProtected(String),

    #[error("invalid extension source {}: {reason}", path.display())]
    InvalidSource { path: PathBuf, reason: String },

    #[error("extension '{id}' is {state}; try again once it settles")]
    InTransition { id: String, state: ExtensionState },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Types(#[from] harbor_types::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExtensionError>;
