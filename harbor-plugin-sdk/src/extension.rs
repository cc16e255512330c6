use crate::context::ExtensionContext;
use crate::exports::Exports;
use async_trait::async_trait;
use serde_json::Value;

/// Implemented by every plugin.
///
/// All methods have no-op defaults. Errors returned here (and panics raised
/// here) are caught by the worker: activation failures become `error`
/// messages, deactivation and event failures are logged.
#[async_trait]
pub trait Extension: Send {
    /// Called once after the unit starts. The context stays valid for the
    /// lifetime of the unit and may be cloned into background tasks.
    async fn activate(&mut self, _cx: ExtensionContext) -> anyhow::Result<Exports> {
        Ok(Exports::none())
    }

    /// Called when the host unloads the extension.
    async fn deactivate(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every host event addressed to this extension.
    async fn on_event(&mut self, _event: &str, _data: Value) -> anyhow::Result<()> {
        Ok(())
    }
}
