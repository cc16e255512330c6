//! The bootstrap that runs inside every isolated unit.
//!
//! A reader task drains the host channel: `api-response`s are resolved
//! straight into the [`RpcClient`], everything else is queued for the control
//! loop. Splitting the two keeps a plugin that awaits a capability call
//! during `activate` from blocking delivery of that call's response.

use crate::api::ExtensionApi;
use crate::console::Console;
use crate::context::ExtensionContext;
use crate::error::SdkError;
use crate::extension::Extension;
use crate::loader::ModuleLoader;
use crate::modules::ModuleResolver;
use crate::rpc::{DEFAULT_CALL_TIMEOUT, Outbox, RpcClient};
use futures::FutureExt;
use harbor_types::{Frame, HostMessage, Manifest, PermissionSet, WorkerMessage};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Exit code after a requested deactivation.
pub const EXIT_OK: i32 = 0;

/// Exit code when the host channel closed without a `deactivate`.
pub const EXIT_DISCONNECTED: i32 = 1;

/// Identity and limits of the unit being started.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub extension_id: String,
    pub extension_path: PathBuf,
    pub manifest: Manifest,
    pub permissions: PermissionSet,
    pub call_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(extension_id: impl Into<String>, extension_path: impl Into<PathBuf>, manifest: Manifest) -> Self {
        let permissions = manifest.permission_set();
        Self {
            extension_id: extension_id.into(),
            extension_path: extension_path.into(),
            manifest,
            permissions,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

pub struct SandboxWorker {
    config: WorkerConfig,
    loader: Arc<dyn ModuleLoader>,
    inbox: Option<mpsc::UnboundedReceiver<Frame>>,
    outbox: Outbox,
    rpc: RpcClient,
    console: Console,
    plugin: Option<Box<dyn Extension>>,
}

impl SandboxWorker {
    pub fn new(
        config: WorkerConfig,
        loader: Arc<dyn ModuleLoader>,
        inbox: mpsc::UnboundedReceiver<Frame>,
        outbox: mpsc::UnboundedSender<Frame>,
    ) -> Self {
        let outbox = Outbox::new(outbox);
        let rpc = RpcClient::new(outbox.clone(), config.call_timeout);
        let console = Console::new(outbox.clone());
        Self {
            config,
            loader,
            inbox: Some(inbox),
            outbox,
            rpc,
            console,
            plugin: None,
        }
    }

    /// Serves host messages until deactivated or disconnected and returns
    /// the unit's exit code.
    pub async fn run(mut self) -> i32 {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<HostMessage>();
        let Some(mut inbox) = self.inbox.take() else {
            return EXIT_DISCONNECTED;
        };
        let rpc = self.rpc.clone();
        let extension_id = self.config.extension_id.clone();

        let reader = tokio::spawn(async move {
            while let Some(frame) = inbox.recv().await {
                match frame.decode::<HostMessage>() {
                    Ok(HostMessage::ApiResponse(response)) => {
                        rpc.resolve(response);
                    }
                    Ok(message) => {
                        if control_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(extension_id = %extension_id, "Ignoring undecodable host frame: {}", e),
                }
            }
        });

        while let Some(message) = control_rx.recv().await {
            match message {
                HostMessage::Activate => self.activate().await,
                HostMessage::Deactivate => {
                    self.deactivate().await;
                    reader.abort();
                    return EXIT_OK;
                }
                HostMessage::Event { event, data } => self.dispatch_event(&event, data).await,
                HostMessage::ApiResponse(_) => {}
            }
        }

        debug!(extension_id = %self.config.extension_id, "Host channel closed");
        EXIT_DISCONNECTED
    }

    fn context(&self) -> ExtensionContext {
        ExtensionContext::new(
            self.config.extension_id.clone(),
            self.config.extension_path.clone(),
            ExtensionApi::new(self.rpc.clone()),
            self.console.clone(),
            ModuleResolver::new(self.config.extension_path.clone(), self.config.permissions.clone()),
            self.outbox.clone(),
        )
    }

    async fn activate(&mut self) {
        if self.plugin.is_some() {
            debug!(extension_id = %self.config.extension_id, "Already active; ignoring activate");
            return;
        }

        let entry = self.config.extension_path.join(&self.config.manifest.main);
        if !entry.is_file() {
            self.report(&SdkError::EntryNotFound(entry));
            return;
        }

        let mut plugin = match self.loader.load(&self.config.manifest, &entry) {
            Ok(plugin) => plugin,
            Err(e) => {
                self.report(&e);
                return;
            }
        };

        let outcome = AssertUnwindSafe(plugin.activate(self.context())).catch_unwind().await;
        let message = match outcome {
            Ok(Ok(exports)) => {
                self.plugin = Some(plugin);
                info!(extension_id = %self.config.extension_id, "Plugin activated");
                WorkerMessage::Activated {
                    exports: exports.summarize(),
                }
            }
            Ok(Err(e)) => WorkerMessage::Error {
                error: e.to_string(),
                stack: Some(format!("{e:?}")),
            },
            Err(panic) => WorkerMessage::Error {
                error: crate::panic_message(panic.as_ref()),
                stack: None,
            },
        };
        self.send(&message);
    }

    async fn deactivate(&mut self) {
        let Some(mut plugin) = self.plugin.take() else {
            return;
        };
        match AssertUnwindSafe(plugin.deactivate()).catch_unwind().await {
            Ok(Ok(())) => info!(extension_id = %self.config.extension_id, "Plugin deactivated"),
            Ok(Err(e)) => {
                warn!(extension_id = %self.config.extension_id, "Deactivation failed: {}", e);
                self.console.warn(format!("deactivate failed: {e}"));
            }
            Err(panic) => {
                let message = crate::panic_message(panic.as_ref());
                warn!(extension_id = %self.config.extension_id, "Deactivation panicked: {}", message);
                self.console.warn(format!("deactivate panicked: {message}"));
            }
        }
    }

    async fn dispatch_event(&mut self, event: &str, data: Value) {
        let Some(plugin) = self.plugin.as_mut() else {
            debug!(extension_id = %self.config.extension_id, event = %event, "Event before activation dropped");
            return;
        };
        let failure = match AssertUnwindSafe(plugin.on_event(event, data)).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => crate::panic_message(panic.as_ref()),
        };
        warn!(extension_id = %self.config.extension_id, event = %event, "Event handler failed: {}", failure);
        self.console.error(format!("handler for '{event}' failed: {failure}"));
    }

    fn report(&self, error: &SdkError) {
        warn!(extension_id = %self.config.extension_id, "Activation failed: {}", error);
        self.send(&WorkerMessage::Error {
            error: error.to_string(),
            stack: None,
        });
    }

    fn send(&self, message: &WorkerMessage) {
        if let Err(e) = self.outbox.send(message) {
            debug!(extension_id = %self.config.extension_id, kind = message.kind(), "Could not reach host: {}", e);
        }
    }
}
