use crate::api::ExtensionApi;
use crate::console::Console;
use crate::modules::ModuleResolver;
use crate::rpc::Outbox;
use futures::FutureExt;
use harbor_types::WorkerMessage;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Everything a plugin receives at activation.
#[derive(Clone)]
pub struct ExtensionContext {
    id: String,
    path: PathBuf,
    pub api: ExtensionApi,
    pub console: Console,
    pub modules: ModuleResolver,
    outbox: Outbox,
}

impl ExtensionContext {
    pub(crate) fn new(
        id: String,
        path: PathBuf,
        api: ExtensionApi,
        console: Console,
        modules: ModuleResolver,
        outbox: Outbox,
    ) -> Self {
        Self {
            id,
            path,
            api,
            console,
            modules,
            outbox,
        }
    }

    pub fn extension_id(&self) -> &str {
        &self.id
    }

    pub fn extension_path(&self) -> &Path {
        &self.path
    }

    /// Publishes an event that the host re-broadcasts to its subscribers.
    pub fn emit(&self, event: &str, data: Value) {
        let message = WorkerMessage::EmitEvent {
            event: event.to_string(),
            data,
        };
        if self.outbox.send(&message).is_err() {
            debug!(extension_id = %self.id, event = %event, "Host channel closed; event dropped");
        }
    }

    /// Runs a background task on the unit's runtime. A failure or panic in
    /// the task is reported to the host as an `error` message.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let outbox = self.outbox.clone();
        let id = self.id.clone();
        tokio::spawn(async move {
            let (error, stack) = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => (e.to_string(), Some(format!("{e:?}"))),
                Err(panic) => (crate::panic_message(panic.as_ref()), None),
            };
            warn!(extension_id = %id, "Background task failed: {}", error);
            let _ = outbox.send(&WorkerMessage::Error { error, stack });
        })
    }
}
