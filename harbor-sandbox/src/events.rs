use serde_json::Value;

/// Lifecycle and extension events published by the [`SandboxHost`](crate::SandboxHost).
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Activated { extension_id: String, exports: Value },
    /// The unit deactivated and exited within the grace period.
    Unloaded { extension_id: String },
    /// The unit ignored `deactivate` and was forced down.
    Terminated { extension_id: String },
    /// The unit ended without being asked to.
    Crashed { extension_id: String, reason: String },
    /// An `error` reported after activation completed.
    ExtensionError {
        extension_id: String,
        error: String,
        stack: Option<String>,
    },
    /// An `emit-event` from plugin code.
    ExtensionEvent {
        extension_id: String,
        event: String,
        data: Value,
    },
}

impl HostEvent {
    pub fn extension_id(&self) -> &str {
        match self {
            Self::Activated { extension_id, .. }
            | Self::Unloaded { extension_id }
            | Self::Terminated { extension_id }
            | Self::Crashed { extension_id, .. }
            | Self::ExtensionError { extension_id, .. }
            | Self::ExtensionEvent { extension_id, .. } => extension_id,
        }
    }
}
