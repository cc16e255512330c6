//! Integration tests for the capability surface.
//!
//! Drives the surface through `dispatch` exactly as the sandbox host does and
//! observes the delivery and presentation-layer channels.

use async_trait::async_trait;
use harbor_capabilities::{
    CallContext, CapabilityError, CapabilitySurface, ChatBackend, Delivery, FileEventKind, MeetingStore,
    POST_PROCESS_EVENT, SurfaceConfig, UiEvent, WatchedFolders,
};
use harbor_types::{PermissionSet, PromptId};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

// ── Helpers ───────────────────────────────────────────────────────

fn surface() -> (Arc<CapabilitySurface>, mpsc::UnboundedReceiver<Delivery>) {
    let (surface, rx) = CapabilitySurface::new(SurfaceConfig::default());
    (Arc::new(surface), rx)
}

fn ctx(id: &str, path: &Path) -> CallContext {
    CallContext::new(id, path, PermissionSet::none())
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Vec<Delivery> {
    let mut out = Vec::new();
    while let Ok(d) = rx.try_recv() {
        out.push(d);
    }
    out
}

struct FakeMeetings {
    meetings: Mutex<HashMap<String, Value>>,
}

impl FakeMeetings {
    fn with(entries: &[(&str, Value)]) -> Self {
        Self {
            meetings: Mutex::new(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()),
        }
    }
}

#[async_trait]
impl MeetingStore for FakeMeetings {
    async fn all(&self) -> harbor_capabilities::Result<Vec<Value>> {
        let mut all: Vec<Value> = self.meetings.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|m| m["id"].as_str().unwrap_or_default().to_string());
        Ok(all)
    }

    async fn by_id(&self, id: &str) -> harbor_capabilities::Result<Option<Value>> {
        Ok(self.meetings.lock().unwrap().get(id).cloned())
    }

    async fn update_content(&self, id: &str, content: Value) -> harbor_capabilities::Result<()> {
        let mut meetings = self.meetings.lock().unwrap();
        let meeting = meetings
            .get_mut(id)
            .ok_or_else(|| CapabilityError::Backend(format!("no meeting {id}")))?;
        meeting["content"] = content;
        Ok(())
    }
}

struct FixedFolders(Vec<String>);

impl WatchedFolders for FixedFolders {
    fn watched_folders(&self) -> Vec<String> {
        self.0.clone()
    }
}

struct EchoChat;

#[async_trait]
impl ChatBackend for EchoChat {
    async fn chat(&self, messages: Value, _options: Value) -> harbor_capabilities::Result<Value> {
        Ok(json!({"role": "assistant", "content": messages[0]["content"]}))
    }

    async fn models(&self) -> harbor_capabilities::Result<Vec<String>> {
        Ok(vec!["echo".to_string()])
    }

    async fn current_model(&self) -> harbor_capabilities::Result<String> {
        Ok("echo".to_string())
    }
}

// ── Files ─────────────────────────────────────────────────────────

#[tokio::test]
async fn hooks_filter_by_kind_then_pattern() {
    let (surface, mut rx) = surface();
    let dir = TempDir::new().unwrap();
    let a = ctx("ext-a", dir.path());
    let b = ctx("ext-b", dir.path());

    let change_id = surface.dispatch(&a, "files", "onDidChange", &[json!("*.docx")]).await.unwrap();
    surface.dispatch(&a, "files", "onDidDelete", &[json!("*")]).await.unwrap();
    surface.dispatch(&b, "files", "onDidChange", &[json!("/notes/*.md")]).await.unwrap();

    assert_eq!(surface.trigger_file_event(FileEventKind::Change, "/a/Report.DOCX"), 1);
    let delivered = drain(&mut rx);
    assert_eq!(
        delivered,
        vec![Delivery {
            extension_id: "ext-a".into(),
            event: "files.didChange".into(),
            data: json!({"hookId": change_id, "path": "/a/Report.DOCX", "type": "change"}),
        }]
    );

    assert_eq!(surface.trigger_file_event(FileEventKind::Create, "/a/Report.docx"), 0);
    assert_eq!(surface.trigger_file_event(FileEventKind::Change, "/notes/today.md"), 1);
    assert_eq!(drain(&mut rx)[0].extension_id, "ext-b");
    assert_eq!(surface.trigger_file_event(FileEventKind::Delete, "anything"), 1);
}

#[tokio::test]
async fn hook_pattern_defaults_to_star() {
    let (surface, mut rx) = surface();
    let dir = TempDir::new().unwrap();
    surface.dispatch(&ctx("ext", dir.path()), "files", "onDidCreate", &[]).await.unwrap();

    assert_eq!(surface.trigger_file_event(FileEventKind::Create, "C:\\x\\y.bin"), 1);
    assert_eq!(drain(&mut rx)[0].event, "files.didCreate");
}

#[tokio::test]
async fn watched_folders_passthrough() {
    let (surface, _rx) = CapabilitySurface::new(SurfaceConfig::default());
    let surface = surface.with_watched_folders(Arc::new(FixedFolders(vec!["/docs".into()])));
    let dir = TempDir::new().unwrap();

    let folders = surface
        .dispatch(&ctx("ext", dir.path()), "files", "getWatchedFolders", &[])
        .await
        .unwrap();
    assert_eq!(folders, json!(["/docs"]));
}

// ── Meetings ──────────────────────────────────────────────────────

#[tokio::test]
async fn meetings_passthrough_to_store() {
    let (surface, _rx) = CapabilitySurface::new(SurfaceConfig::default());
    let store = Arc::new(FakeMeetings::with(&[("m1", json!({"id": "m1", "content": "draft"}))]));
    let surface = surface.with_meeting_store(store.clone());
    let dir = TempDir::new().unwrap();
    let c = ctx("ext", dir.path());

    assert_eq!(
        surface.dispatch(&c, "meetings", "getAll", &[]).await.unwrap(),
        json!([{"id": "m1", "content": "draft"}])
    );
    surface
        .dispatch(&c, "meetings", "updateContent", &[json!("m1"), json!("final")])
        .await
        .unwrap();
    assert_eq!(
        surface.dispatch(&c, "meetings", "getById", &[json!("m1")]).await.unwrap()["content"],
        "final"
    );
    assert_eq!(
        surface.dispatch(&c, "meetings", "getById", &[json!("zz")]).await.unwrap(),
        Value::Null
    );

    let err = surface
        .dispatch(&c, "meetings", "updateContent", &[json!("zz"), json!("x")])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BACKEND_ERROR");
}

#[tokio::test]
async fn post_processors_notified_in_registration_order() {
    let (surface, mut rx) = surface();
    let dir = TempDir::new().unwrap();

    surface
        .dispatch(&ctx("second", dir.path()), "meetings", "addPostProcessor", &[json!("summarize")])
        .await
        .unwrap();
    surface
        .dispatch(&ctx("first", dir.path()), "meetings", "addPostProcessor", &[json!("tag")])
        .await
        .unwrap();

    let meeting = json!({"id": "m9"});
    assert_eq!(surface.notify_meeting_created(&meeting), 2);

    let delivered = drain(&mut rx);
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].extension_id, "second");
    assert_eq!(delivered[0].event, POST_PROCESS_EVENT);
    assert_eq!(delivered[0].data, json!({"processorId": "summarize", "meeting": {"id": "m9"}}));
    assert_eq!(delivered[1].extension_id, "first");
}

// ── UI ────────────────────────────────────────────────────────────

#[tokio::test]
async fn quick_pick_resolves_with_correlated_answer() {
    let (surface, _rx) = surface();
    let mut ui = surface.subscribe_ui();
    let dir = TempDir::new().unwrap();
    let c = ctx("ext", dir.path());

    let pending = {
        let surface = surface.clone();
        tokio::spawn(async move {
            surface
                .dispatch(&c, "ui", "showQuickPick", &[json!(["a", "b"]), json!({"placeholder": "pick"})])
                .await
        })
    };

    let request_id: PromptId = match ui.recv().await.unwrap() {
        UiEvent::QuickPick { request_id, items, .. } => {
            assert_eq!(items, json!(["a", "b"]));
            request_id
        }
        other => panic!("unexpected event: {other:?}"),
    };
    assert!(surface.resolve_prompt(request_id, json!("b")));
    assert_eq!(pending.await.unwrap().unwrap(), json!("b"));

    assert!(!surface.resolve_prompt(request_id, json!("again")));
}

#[tokio::test(start_paused = true)]
async fn input_box_times_out_to_null() {
    let (surface, _rx) = CapabilitySurface::new(SurfaceConfig {
        prompt_timeout: Duration::from_secs(60),
        ..SurfaceConfig::default()
    });
    let dir = TempDir::new().unwrap();

    let answer = surface
        .dispatch(&ctx("ext", dir.path()), "ui", "showInputBox", &[json!({"prompt": "Name?"})])
        .await
        .unwrap();
    assert_eq!(answer, Value::Null);
}

#[tokio::test]
async fn status_bar_lifecycle() {
    let (surface, _rx) = surface();
    let mut ui = surface.subscribe_ui();
    let dir = TempDir::new().unwrap();
    let c = ctx("ext", dir.path());

    let id = surface
        .dispatch(&c, "ui", "registerStatusBarItem", &[json!({"text": "Idle", "priority": 5})])
        .await
        .unwrap();
    let id = id.as_str().unwrap().to_string();
    assert!(id.starts_with("ext.statusbar."));
    assert!(matches!(ui.recv().await.unwrap(), UiEvent::StatusBarItemAdded(_)));

    surface
        .dispatch(&c, "ui", "updateStatusBarItem", &[json!(id), json!({"text": "Busy"})])
        .await
        .unwrap();
    match ui.recv().await.unwrap() {
        UiEvent::StatusBarItemUpdated(item) => {
            assert_eq!(item.properties["text"], "Busy");
            assert_eq!(item.properties["priority"], 5);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Unknown ids are a silent no-op.
    surface
        .dispatch(&c, "ui", "updateStatusBarItem", &[json!("ext.statusbar.missing"), json!({"text": "x"})])
        .await
        .unwrap();

    surface.dispatch(&c, "ui", "removeStatusBarItem", &[json!(id)]).await.unwrap();
    assert_eq!(ui.recv().await.unwrap(), UiEvent::StatusBarItemRemoved { id });
    assert!(surface.status_bar_items().is_empty());
}

#[tokio::test]
async fn status_bar_items_cannot_be_touched_by_other_extensions() {
    let (surface, _rx) = surface();
    let dir = TempDir::new().unwrap();
    let owner = ctx("owner", dir.path());
    let other = ctx("other", dir.path());

    let id = surface
        .dispatch(&owner, "ui", "registerStatusBarItem", &[json!({"text": "Mine"})])
        .await
        .unwrap();
    let mut ui = surface.subscribe_ui();

    surface
        .dispatch(&other, "ui", "updateStatusBarItem", &[id.clone(), json!({"text": "Hijacked"})])
        .await
        .unwrap();
    surface.dispatch(&other, "ui", "removeStatusBarItem", &[id]).await.unwrap();

    let items = surface.status_bar_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].properties["text"], "Mine");
    assert!(ui.try_recv().is_err());
}

#[tokio::test]
async fn notification_reads_type_and_duration_from_options() {
    let (surface, _rx) = surface();
    let mut ui = surface.subscribe_ui();
    let dir = TempDir::new().unwrap();
    let c = ctx("ext", dir.path());

    surface
        .dispatch(
            &c,
            "ui",
            "showNotification",
            &[json!("disk full"), json!({"type": "error", "duration": 3000})],
        )
        .await
        .unwrap();
    assert_eq!(
        ui.recv().await.unwrap(),
        UiEvent::Notification {
            extension_id: "ext".into(),
            message: "disk full".into(),
            kind: "error".into(),
            duration: Some(3000),
        }
    );

    surface.dispatch(&c, "ui", "showNotification", &[json!("hello")]).await.unwrap();
    assert_eq!(
        ui.recv().await.unwrap(),
        UiEvent::Notification {
            extension_id: "ext".into(),
            message: "hello".into(),
            kind: "info".into(),
            duration: None,
        }
    );
}

// ── Commands ──────────────────────────────────────────────────────

#[tokio::test]
async fn commands_register_and_list() {
    let (surface, _rx) = surface();
    let dir = TempDir::new().unwrap();
    let c = ctx("word-count", dir.path());

    let id = surface
        .dispatch(&c, "commands", "register", &[json!("run"), json!({"title": "Count", "category": "Text"})])
        .await
        .unwrap();
    assert_eq!(id, json!("word-count.run"));

    let all = surface.dispatch(&c, "commands", "getAll", &[]).await.unwrap();
    assert_eq!(
        all,
        json!([{"id": "word-count.run", "extensionId": "word-count", "title": "Count", "category": "Text"}])
    );
}

// ── LLM ───────────────────────────────────────────────────────────

#[tokio::test]
async fn llm_uses_injected_backend() {
    let (surface, _rx) = CapabilitySurface::new(SurfaceConfig::default());
    let surface = surface.with_chat_backend(Arc::new(EchoChat));
    let dir = TempDir::new().unwrap();
    let c = ctx("ext", dir.path());

    let reply = surface
        .dispatch(&c, "llm", "chat", &[json!([{"role": "user", "content": "ping"}])])
        .await
        .unwrap();
    assert_eq!(reply["content"], "ping");
    assert_eq!(surface.dispatch(&c, "llm", "getModels", &[]).await.unwrap(), json!(["echo"]));
    assert_eq!(surface.dispatch(&c, "llm", "getCurrentModel", &[]).await.unwrap(), json!("echo"));
}

#[tokio::test]
async fn llm_fallback_reports_chat_unavailable() {
    let (surface, _rx) = CapabilitySurface::new(SurfaceConfig {
        chat_endpoint: "http://127.0.0.1:9".to_string(),
        ..SurfaceConfig::default()
    });
    let dir = TempDir::new().unwrap();

    let err = surface
        .dispatch(&ctx("ext", dir.path()), "llm", "chat", &[json!([])])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CHAT_UNAVAILABLE");
}

// ── Storage ───────────────────────────────────────────────────────

#[tokio::test]
async fn storage_round_trip_survives_reload() {
    let dir = TempDir::new().unwrap();
    {
        let (surface, _rx) = surface();
        let c = ctx("ext", dir.path());
        surface.dispatch(&c, "storage", "set", &[json!("theme"), json!({"dark": true})]).await.unwrap();
        surface.dispatch(&c, "storage", "set", &[json!("tmp"), json!(1)]).await.unwrap();
        surface.dispatch(&c, "storage", "delete", &[json!("tmp")]).await.unwrap();
    }

    // A fresh surface has an empty cache and must read the document back.
    let (surface, _rx) = surface();
    let c = ctx("ext", dir.path());
    assert_eq!(
        surface.dispatch(&c, "storage", "get", &[json!("theme")]).await.unwrap(),
        json!({"dark": true})
    );
    assert_eq!(
        surface.dispatch(&c, "storage", "get", &[json!("tmp"), json!("fallback")]).await.unwrap(),
        json!("fallback")
    );
    assert_eq!(
        surface.dispatch(&c, "storage", "getAll", &[]).await.unwrap(),
        json!({"theme": {"dark": true}})
    );
}

#[tokio::test]
async fn storage_is_scoped_per_extension() {
    let (surface, _rx) = surface();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    surface
        .dispatch(&ctx("a", dir_a.path()), "storage", "set", &[json!("k"), json!("a")])
        .await
        .unwrap();
    assert_eq!(
        surface.dispatch(&ctx("b", dir_b.path()), "storage", "get", &[json!("k")]).await.unwrap(),
        Value::Null
    );
}

// ── Cleanup ───────────────────────────────────────────────────────

#[tokio::test]
async fn cleanup_is_exhaustive_and_scoped() {
    let (surface, mut rx) = surface();
    let mut ui = surface.subscribe_ui();
    let dir = TempDir::new().unwrap();
    let a = ctx("ext-a", dir.path());
    let b = ctx("ext-b", dir.path());

    for c in [&a, &b] {
        surface.dispatch(c, "files", "onDidChange", &[json!("*")]).await.unwrap();
        surface.dispatch(c, "meetings", "addPostProcessor", &[json!("p")]).await.unwrap();
        surface.dispatch(c, "commands", "register", &[json!("run"), json!({"title": "Run"})]).await.unwrap();
        surface.dispatch(c, "ui", "registerView", &[json!("panel"), json!({})]).await.unwrap();
        surface.dispatch(c, "ui", "registerStatusBarItem", &[json!({"text": "x"})]).await.unwrap();
        surface.dispatch(c, "storage", "set", &[json!("k"), json!(1)]).await.unwrap();
    }
    while ui.try_recv().is_ok() {}

    let summary = surface.cleanup("ext-a");
    assert_eq!(summary.hooks, 1);
    assert_eq!(summary.post_processors, 1);
    assert_eq!(summary.commands, 1);
    assert_eq!(summary.views, 1);
    assert_eq!(summary.status_bar_items, 1);
    assert!(summary.storage_evicted);

    assert!(surface.hooks_for("ext-a").is_empty());
    assert_eq!(surface.hooks_for("ext-b").len(), 1);
    assert!(surface.commands().iter().all(|c| c.extension_id == "ext-b"));
    assert!(surface.views().iter().all(|v| v.extension_id == "ext-b"));
    assert!(surface.status_bar_items().iter().all(|i| i.extension_id == "ext-b"));

    assert_eq!(surface.trigger_file_event(FileEventKind::Change, "/f"), 1);
    assert_eq!(surface.notify_meeting_created(&json!({})), 1);
    assert!(drain(&mut rx).iter().all(|d| d.extension_id == "ext-b"));

    let mut removals = Vec::new();
    while let Ok(event) = ui.try_recv() {
        removals.push(event);
    }
    assert!(removals.contains(&UiEvent::CommandRemoved { id: "ext-a.run".into() }));
    assert!(removals.contains(&UiEvent::ViewRemoved { id: "ext-a.panel".into() }));
    assert!(removals.iter().any(|e| matches!(e, UiEvent::StatusBarItemRemoved { id } if id.starts_with("ext-a."))));
    assert_eq!(
        removals.last(),
        Some(&UiEvent::ExtensionCleanedUp { extension_id: "ext-a".into() })
    );

    // Second cleanup finds nothing left.
    assert_eq!(surface.cleanup("ext-a").total(), 0);
}
