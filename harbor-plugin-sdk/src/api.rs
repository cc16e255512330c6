//! Typed stubs for the host capability surface.
//!
//! Each method turns into exactly one `api-call` on the wire. Method names
//! match the host's dispatch table (`files.onDidChange`, `storage.get`, ...).

use crate::error::Result;
use crate::rpc::RpcClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// All capability namespaces available to an extension.
#[derive(Clone)]
pub struct ExtensionApi {
    pub files: FilesApi,
    pub meetings: MeetingsApi,
    pub ui: UiApi,
    pub commands: CommandsApi,
    pub llm: LlmApi,
    pub storage: StorageApi,
}

impl ExtensionApi {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            files: FilesApi { rpc: rpc.clone() },
            meetings: MeetingsApi { rpc: rpc.clone() },
            ui: UiApi { rpc: rpc.clone() },
            commands: CommandsApi { rpc: rpc.clone() },
            llm: LlmApi { rpc: rpc.clone() },
            storage: StorageApi { rpc },
        }
    }
}

// ── files ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FilesApi {
    rpc: RpcClient,
}

impl FilesApi {
    /// Registers a change hook and returns its id. Matches arrive as
    /// `files.didChange` events.
    pub async fn on_did_change(&self, pattern: &str) -> Result<String> {
        decode(self.rpc.call("files", "onDidChange", vec![json!(pattern)]).await?)
    }

    pub async fn on_did_create(&self, pattern: &str) -> Result<String> {
        decode(self.rpc.call("files", "onDidCreate", vec![json!(pattern)]).await?)
    }

    pub async fn on_did_delete(&self, pattern: &str) -> Result<String> {
        decode(self.rpc.call("files", "onDidDelete", vec![json!(pattern)]).await?)
    }

    pub async fn get_watched_folders(&self) -> Result<Vec<String>> {
        decode(self.rpc.call("files", "getWatchedFolders", vec![]).await?)
    }

    /// Requires the `filesystem-read` permission.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        decode(self.rpc.call("files", "readFile", vec![json!(path)]).await?)
    }
}

// ── meetings ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MeetingsApi {
    rpc: RpcClient,
}

impl MeetingsApi {
    pub async fn get_all(&self) -> Result<Vec<Value>> {
        decode(self.rpc.call("meetings", "getAll", vec![]).await?)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Value>> {
        let value = self.rpc.call("meetings", "getById", vec![json!(id)]).await?;
        Ok((!value.is_null()).then_some(value))
    }

    pub async fn update_content(&self, id: &str, content: Value) -> Result<()> {
        self.rpc.call("meetings", "updateContent", vec![json!(id), content]).await?;
        Ok(())
    }

    /// Asks to receive `meetings.postProcess` events for new meetings.
    pub async fn add_post_processor(&self, processor_id: &str) -> Result<()> {
        self.rpc.call("meetings", "addPostProcessor", vec![json!(processor_id)]).await?;
        Ok(())
    }
}

// ── ui ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct UiApi {
    rpc: RpcClient,
}

impl UiApi {
    /// `kind` is `info`, `warning` or `error`; `duration_ms` of `None` keeps the default.
    pub async fn show_notification(&self, message: &str, kind: &str, duration_ms: Option<u64>) -> Result<()> {
        let mut options = json!({"type": kind});
        if let Some(duration) = duration_ms {
            options["duration"] = json!(duration);
        }
        self.rpc.call("ui", "showNotification", vec![json!(message), options]).await?;
        Ok(())
    }

    /// Returns the picked item, or `None` if the prompt was dismissed or expired.
    pub async fn show_quick_pick(&self, items: Vec<Value>, options: Value) -> Result<Option<Value>> {
        let picked = self.rpc.call("ui", "showQuickPick", vec![Value::Array(items), options]).await?;
        Ok((!picked.is_null()).then_some(picked))
    }

    pub async fn show_input_box(&self, options: Value) -> Result<Option<String>> {
        decode(self.rpc.call("ui", "showInputBox", vec![options]).await?)
    }

    pub async fn register_status_bar_item(&self, options: Value) -> Result<String> {
        decode(self.rpc.call("ui", "registerStatusBarItem", vec![options]).await?)
    }

    pub async fn update_status_bar_item(&self, id: &str, patch: Value) -> Result<()> {
        self.rpc.call("ui", "updateStatusBarItem", vec![json!(id), patch]).await?;
        Ok(())
    }

    pub async fn remove_status_bar_item(&self, id: &str) -> Result<()> {
        self.rpc.call("ui", "removeStatusBarItem", vec![json!(id)]).await?;
        Ok(())
    }

    pub async fn register_view(&self, id: &str, options: Value) -> Result<String> {
        decode(self.rpc.call("ui", "registerView", vec![json!(id), options]).await?)
    }
}

// ── commands ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CommandsApi {
    rpc: RpcClient,
}

impl CommandsApi {
    /// Registers a command and returns its composite id.
    pub async fn register(&self, id: &str, title: &str, category: Option<&str>) -> Result<String> {
        let mut options = Map::new();
        options.insert("title".into(), json!(title));
        if let Some(category) = category {
            options.insert("category".into(), json!(category));
        }
        decode(self.rpc.call("commands", "register", vec![json!(id), Value::Object(options)]).await?)
    }

    pub async fn execute(&self, id: &str, args: Vec<Value>) -> Result<()> {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(json!(id));
        call_args.extend(args);
        self.rpc.call("commands", "execute", call_args).await?;
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<Value>> {
        decode(self.rpc.call("commands", "getAll", vec![]).await?)
    }
}

// ── llm ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LlmApi {
    rpc: RpcClient,
}

impl LlmApi {
    pub async fn chat(&self, messages: Value, options: Value) -> Result<Value> {
        self.rpc.call("llm", "chat", vec![messages, options]).await
    }

    pub async fn get_models(&self) -> Result<Vec<String>> {
        decode(self.rpc.call("llm", "getModels", vec![]).await?)
    }

    pub async fn get_current_model(&self) -> Result<String> {
        decode(self.rpc.call("llm", "getCurrentModel", vec![]).await?)
    }
}

// ── storage ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct StorageApi {
    rpc: RpcClient,
}

impl StorageApi {
    /// Returns the stored value or `default` when the key is absent.
    pub async fn get(&self, key: &str, default: Value) -> Result<Value> {
        self.rpc.call("storage", "get", vec![json!(key), default]).await
    }

    /// Typed read; `None` when the key is absent.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        decode(self.get(key, Value::Null).await?)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.rpc.call("storage", "set", vec![json!(key), value]).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.rpc.call("storage", "delete", vec![json!(key)]).await?;
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Map<String, Value>> {
        decode(self.rpc.call("storage", "getAll", vec![]).await?)
    }
}
