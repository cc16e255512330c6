//! The capability surface: the fixed set of host operations plugin code may call.
//!
//! Every `api-call` coming out of a sandbox is routed through
//! [`CapabilitySurface::dispatch`]. Registries are keyed by owning extension
//! so that [`CapabilitySurface::cleanup`] can drop everything an extension
//! left behind in one pass.

use crate::args::Args;
use crate::commands::{Command, CommandRegistry};
use crate::context::CallContext;
use crate::error::{CapabilityError, Result};
use crate::events::{Delivery, UiEvent};
use crate::files::{FileEventKind, Hook, HookRegistry, WatchedFolders};
use crate::llm::{ChatBackend, DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL, LocalChat};
use crate::meetings::{MeetingStore, PostProcessorRegistry};
use crate::storage::StorageCache;
use crate::ui::{PromptBroker, StatusBar, StatusBarItem, View, Views};
use harbor_types::{Permission, PromptId};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Capacity of the presentation-layer broadcast channel.
const UI_CHANNEL_CAPACITY: usize = 256;

/// Event delivered to a post-processor when a meeting is created.
pub const POST_PROCESS_EVENT: &str = "meetings.postProcess";

/// Tunables for the capability surface.
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// How long quick-pick and input-box prompts wait before resolving to `null`.
    pub prompt_timeout: Duration,
    /// Base URL of the local inference fallback.
    pub chat_endpoint: String,
    /// Model reported and used by the local fallback.
    pub default_model: String,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            prompt_timeout: Duration::from_secs(60),
            chat_endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            default_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

/// What a cleanup pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub hooks: usize,
    pub post_processors: usize,
    pub commands: usize,
    pub views: usize,
    pub status_bar_items: usize,
    pub prompts: usize,
    pub storage_evicted: bool,
}

impl CleanupSummary {
    pub fn total(&self) -> usize {
        self.hooks + self.post_processors + self.commands + self.views + self.status_bar_items + self.prompts
    }
}

pub struct CapabilitySurface {
    hooks: HookRegistry,
    post_processors: PostProcessorRegistry,
    commands: CommandRegistry,
    status_bar: StatusBar,
    views: Views,
    prompts: PromptBroker,
    storage: StorageCache,
    meeting_store: Option<Arc<dyn MeetingStore>>,
    watched_folders: Option<Arc<dyn WatchedFolders>>,
    chat: Arc<dyn ChatBackend>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    ui: broadcast::Sender<UiEvent>,
}

impl CapabilitySurface {
    /// Creates a surface and the receiving end of its extension deliveries.
    pub fn new(config: SurfaceConfig) -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (deliveries, delivery_rx) = mpsc::unbounded_channel();
        let (ui, _) = broadcast::channel(UI_CHANNEL_CAPACITY);
        let surface = Self {
            hooks: HookRegistry::default(),
            post_processors: PostProcessorRegistry::default(),
            commands: CommandRegistry::default(),
            status_bar: StatusBar::default(),
            views: Views::default(),
            prompts: PromptBroker::new(config.prompt_timeout),
            storage: StorageCache::default(),
            meeting_store: None,
            watched_folders: None,
            chat: Arc::new(LocalChat::new(&config.chat_endpoint, &config.default_model)),
            deliveries,
            ui,
        };
        (surface, delivery_rx)
    }

    pub fn with_meeting_store(mut self, store: Arc<dyn MeetingStore>) -> Self {
        self.meeting_store = Some(store);
        self
    }

    pub fn with_watched_folders(mut self, folders: Arc<dyn WatchedFolders>) -> Self {
        self.watched_folders = Some(folders);
        self
    }

    /// Replaces the local inference fallback with the application's backend.
    pub fn with_chat_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.chat = backend;
        self
    }

    /// Subscribes to presentation-layer events.
    pub fn subscribe_ui(&self) -> broadcast::Receiver<UiEvent> {
        self.ui.subscribe()
    }

    // ================================================================
    // Dispatch
    // ================================================================

    /// Routes one capability call. Unknown `(namespace, method)` pairs fail
    /// with `UnknownCapability`.
    pub async fn dispatch(&self, ctx: &CallContext, namespace: &str, method: &str, args: &[Value]) -> Result<Value> {
        let a = Args::new(method, args);
        match (namespace, method) {
            ("files", "onDidChange") => self.register_hook(ctx, &a, FileEventKind::Change),
            ("files", "onDidCreate") => self.register_hook(ctx, &a, FileEventKind::Create),
            ("files", "onDidDelete") => self.register_hook(ctx, &a, FileEventKind::Delete),
            ("files", "getWatchedFolders") => Ok(self.watched_folders()),
            ("files", "readFile") => self.read_file(ctx, a.str(0, "path")?).await,

            ("meetings", "getAll") => self.meetings_all().await,
            ("meetings", "getById") => self.meeting_by_id(a.str(0, "id")?).await,
            ("meetings", "updateContent") => self.update_meeting(a.str(0, "id")?, a.value(1)).await,
            ("meetings", "addPostProcessor") => {
                let processor_id = a.str(0, "processorId")?;
                self.post_processors.add(&ctx.extension_id, processor_id);
                debug!(extension_id = %ctx.extension_id, processor_id = %processor_id, "Registered meeting post-processor");
                Ok(Value::Null)
            }

            ("ui", "showNotification") => {
                let options = a.value(1);
                self.emit_ui(UiEvent::Notification {
                    extension_id: ctx.extension_id.clone(),
                    message: a.str(0, "message")?.to_string(),
                    kind: options.get("type").and_then(Value::as_str).unwrap_or("info").to_string(),
                    duration: options.get("duration").and_then(Value::as_u64),
                });
                Ok(Value::Null)
            }
            ("ui", "showQuickPick") => {
                let (request_id, rx) = self.prompts.open(&ctx.extension_id);
                self.emit_ui(UiEvent::QuickPick {
                    extension_id: ctx.extension_id.clone(),
                    request_id,
                    items: a.value(0),
                    options: a.value(1),
                });
                Ok(self.prompts.wait(request_id, rx).await)
            }
            ("ui", "showInputBox") => {
                let (request_id, rx) = self.prompts.open(&ctx.extension_id);
                self.emit_ui(UiEvent::InputBox {
                    extension_id: ctx.extension_id.clone(),
                    request_id,
                    options: a.value(0),
                });
                Ok(self.prompts.wait(request_id, rx).await)
            }
            ("ui", "registerStatusBarItem") => {
                let item = self.status_bar.create(&ctx.extension_id, &a.value(0));
                let id = item.id.clone();
                self.emit_ui(UiEvent::StatusBarItemAdded(item));
                Ok(Value::String(id))
            }
            ("ui", "updateStatusBarItem") => {
                if let Some(item) = self.status_bar.update(&ctx.extension_id, a.str(0, "id")?, &a.value(1)) {
                    self.emit_ui(UiEvent::StatusBarItemUpdated(item));
                }
                Ok(Value::Null)
            }
            ("ui", "removeStatusBarItem") => {
                if let Some(item) = self.status_bar.remove(&ctx.extension_id, a.str(0, "id")?) {
                    self.emit_ui(UiEvent::StatusBarItemRemoved { id: item.id });
                }
                Ok(Value::Null)
            }
            ("ui", "registerView") => {
                let view = self.views.register(&ctx.extension_id, a.str(0, "id")?, a.value(1));
                let id = view.id.clone();
                self.emit_ui(UiEvent::ViewRegistered(view));
                Ok(Value::String(id))
            }

            ("commands", "register") => {
                let options = a.value(1);
                let local_id = a.str(0, "id")?;
                let title = options.get("title").and_then(Value::as_str).unwrap_or(local_id);
                let category = options.get("category").and_then(Value::as_str);
                let command = self.commands.register(&ctx.extension_id, local_id, title, category);
                let id = command.id.clone();
                self.emit_ui(UiEvent::CommandRegistered(command));
                Ok(Value::String(id))
            }
            ("commands", "execute") => {
                self.emit_ui(UiEvent::ExecuteCommand {
                    id: a.str(0, "id")?.to_string(),
                    args: a.rest(1),
                });
                Ok(Value::Null)
            }
            ("commands", "getAll") => Ok(serde_json::to_value(self.commands.all())?),

            ("llm", "chat") => self.chat.chat(a.value(0), a.value(1)).await,
            ("llm", "getModels") => Ok(json!(self.chat.models().await?)),
            ("llm", "getCurrentModel") => Ok(Value::String(self.chat.current_model().await?)),

            ("storage", "get") => {
                let key = a.str(0, "key")?;
                let stored = self.storage.with(&ctx.extension_id, &ctx.extension_path, |s| s.get(key).cloned());
                Ok(stored.unwrap_or_else(|| a.value(1)))
            }
            ("storage", "set") => {
                let key = a.str(0, "key")?;
                let value = a.value(1);
                self.storage.with(&ctx.extension_id, &ctx.extension_path, |s| s.set(key, value))?;
                Ok(Value::Null)
            }
            ("storage", "delete") => {
                let key = a.str(0, "key")?;
                self.storage.with(&ctx.extension_id, &ctx.extension_path, |s| s.remove(key))?;
                Ok(Value::Null)
            }
            ("storage", "getAll") => Ok(Value::Object(
                self.storage.with(&ctx.extension_id, &ctx.extension_path, |s| s.all().clone()),
            )),

            _ => Err(CapabilityError::UnknownCapability {
                namespace: namespace.to_string(),
                method: method.to_string(),
            }),
        }
    }

    // ================================================================
    // Files
    // ================================================================

    fn register_hook(&self, ctx: &CallContext, a: &Args<'_>, kind: FileEventKind) -> Result<Value> {
        let pattern = a.opt_str(0).unwrap_or("*");
        Ok(Value::String(self.hooks.register(&ctx.extension_id, pattern, kind)))
    }

    fn watched_folders(&self) -> Value {
        match &self.watched_folders {
            Some(source) => json!(source.watched_folders()),
            None => json!([]),
        }
    }

    async fn read_file(&self, ctx: &CallContext, path: &str) -> Result<Value> {
        ctx.require(Permission::FilesystemRead)?;
        let requested = Path::new(path);
        let resolved = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            ctx.extension_path.join(requested)
        };
        let contents = tokio::fs::read_to_string(&resolved).await?;
        Ok(Value::String(contents))
    }

    /// Notifies every hook of `kind` whose pattern matches `path`.
    /// Returns the number of deliveries queued.
    pub fn trigger_file_event(&self, kind: FileEventKind, path: &str) -> usize {
        let matched = self.hooks.matching(kind, path);
        for hook in &matched {
            self.deliver(Delivery {
                extension_id: hook.extension_id.clone(),
                event: kind.event_name().to_string(),
                data: json!({"hookId": hook.id, "path": path, "type": kind.as_str()}),
            });
        }
        debug!(kind = kind.as_str(), path = %path, deliveries = matched.len(), "File event dispatched");
        matched.len()
    }

    pub fn hooks_for(&self, extension_id: &str) -> Vec<Hook> {
        self.hooks.for_extension(extension_id)
    }

    // ================================================================
    // Meetings
    // ================================================================

    async fn meetings_all(&self) -> Result<Value> {
        match &self.meeting_store {
            Some(store) => Ok(Value::Array(store.all().await?)),
            None => Ok(json!([])),
        }
    }

    async fn meeting_by_id(&self, id: &str) -> Result<Value> {
        match &self.meeting_store {
            Some(store) => Ok(store.by_id(id).await?.unwrap_or(Value::Null)),
            None => Ok(Value::Null),
        }
    }

    async fn update_meeting(&self, id: &str, content: Value) -> Result<Value> {
        let store = self
            .meeting_store
            .as_ref()
            .ok_or_else(|| CapabilityError::Unavailable("meeting store".to_string()))?;
        store.update_content(id, content).await?;
        Ok(Value::Null)
    }

    /// Notifies registered post-processors, in registration order, that a
    /// meeting was created. Returns the number of deliveries queued.
    pub fn notify_meeting_created(&self, meeting: &Value) -> usize {
        let processors = self.post_processors.snapshot();
        for processor in &processors {
            self.deliver(Delivery {
                extension_id: processor.extension_id.clone(),
                event: POST_PROCESS_EVENT.to_string(),
                data: json!({"processorId": processor.processor_id, "meeting": meeting}),
            });
        }
        processors.len()
    }

    // ================================================================
    // UI
    // ================================================================

    /// Answers a pending quick-pick or input-box prompt.
    /// Returns false if the prompt is unknown or already settled.
    pub fn resolve_prompt(&self, id: PromptId, value: Value) -> bool {
        self.prompts.resolve(id, value)
    }

    pub fn status_bar_items(&self) -> Vec<StatusBarItem> {
        self.status_bar.all()
    }

    pub fn views(&self) -> Vec<View> {
        self.views.all()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.all()
    }

    // ================================================================
    // Cleanup
    // ================================================================

    /// Removes everything the extension registered and evicts its storage
    /// from the cache, notifying the presentation layer of each removal.
    pub fn cleanup(&self, extension_id: &str) -> CleanupSummary {
        let hooks = self.hooks.remove_extension(extension_id);
        let post_processors = self.post_processors.remove_extension(extension_id);
        let prompts = self.prompts.remove_extension(extension_id);

        let command_ids = self.commands.remove_extension(extension_id);
        for id in &command_ids {
            self.emit_ui(UiEvent::CommandRemoved { id: id.clone() });
        }
        let view_ids = self.views.remove_extension(extension_id);
        for id in &view_ids {
            self.emit_ui(UiEvent::ViewRemoved { id: id.clone() });
        }
        let item_ids = self.status_bar.remove_extension(extension_id);
        for id in &item_ids {
            self.emit_ui(UiEvent::StatusBarItemRemoved { id: id.clone() });
        }
        let storage_evicted = self.storage.evict(extension_id);

        self.emit_ui(UiEvent::ExtensionCleanedUp {
            extension_id: extension_id.to_string(),
        });

        let summary = CleanupSummary {
            hooks,
            post_processors,
            commands: command_ids.len(),
            views: view_ids.len(),
            status_bar_items: item_ids.len(),
            prompts,
            storage_evicted,
        };
        info!(extension_id = %extension_id, removed = summary.total(), "Capability cleanup complete");
        summary
    }

    fn emit_ui(&self, event: UiEvent) {
        // No subscribers is not an error.
        let _ = self.ui.send(event);
    }

    fn deliver(&self, delivery: Delivery) {
        if self.deliveries.send(delivery).is_err() {
            debug!("Delivery receiver dropped; notification discarded");
        }
    }
}
