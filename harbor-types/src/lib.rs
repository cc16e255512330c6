//! Core type definitions for the Harbor extension host.
//!
//! This crate defines the types that cross component boundaries:
//! - Extension manifests and their validation
//! - The capability permission model declared by manifests
//! - Lifecycle states for extension records
//! - The host ↔ sandbox wire protocol and its frame codec
//! - Call and prompt identifiers used for correlation
//!
//! Runtime behavior (spawning units, dispatching capabilities, lifecycle
//! orchestration) lives in the crates that depend on this one.

mod ids;
mod manifest;
mod permissions;
pub mod protocol;
mod state;

use std::path::PathBuf;

pub use ids::{CallId, PromptId};
pub use manifest::{MANIFEST_FILE, Manifest};
pub use permissions::{Permission, PermissionSet};
pub use protocol::{ApiCall, ApiResponse, Frame, HostMessage, LogLevel, RemoteError, WorkerMessage};
pub use state::ExtensionState;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest not found in {0}")]
    ManifestNotFound(PathBuf),

    #[error("invalid manifest {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
