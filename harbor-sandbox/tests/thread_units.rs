//! End-to-end: real thread units running native plugins against a live
//! capability surface.

use anyhow::anyhow;
use harbor_capabilities::{CapabilitySurface, FileEventKind, SurfaceConfig};
use harbor_plugin_sdk::prelude::*;
use harbor_sandbox::{HostConfig, HostEvent, LoadRequest, SandboxError, SandboxHost, ThreadSpawner};
use harbor_types::Manifest;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

// ── Plugins ───────────────────────────────────────────────────────

struct Recorder {
    cx: Option<ExtensionContext>,
}

#[async_trait]
impl Extension for Recorder {
    async fn activate(&mut self, cx: ExtensionContext) -> anyhow::Result<Exports> {
        cx.api.storage.set("visits", &1).await?;
        let visits = cx.api.storage.get("visits", json!(0)).await?;
        cx.api.commands.register("hello", "Say Hello", None).await?;
        cx.api.files.on_did_change("*.md").await?;
        cx.console.info("recorder ready");
        self.cx = Some(cx);
        Ok(Exports::none().value("visits", visits).function("greet"))
    }

    async fn on_event(&mut self, event: &str, data: Value) -> anyhow::Result<()> {
        if let Some(cx) = &self.cx {
            cx.emit("seen", json!({"event": event, "path": data["path"]}));
        }
        Ok(())
    }
}

struct Panicker;

#[async_trait]
impl Extension for Panicker {
    async fn activate(&mut self, _cx: ExtensionContext) -> anyhow::Result<Exports> {
        panic!("kaboom");
    }
}

struct Failing;

#[async_trait]
impl Extension for Failing {
    async fn activate(&mut self, cx: ExtensionContext) -> anyhow::Result<Exports> {
        // Reads are gated on a permission this extension never declared.
        cx.api.files.read_file("notes.txt").await?;
        Err(anyhow!("unreachable"))
    }
}

struct Deaf;

#[async_trait]
impl Extension for Deaf {
    async fn deactivate(&mut self) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn modules() -> NativeModules {
    NativeModules::new()
        .with("recorder", || Box::new(Recorder { cx: None }))
        .with("panicker", || Box::new(Panicker))
        .with("failing", || Box::new(Failing))
        .with("deaf", || Box::new(Deaf))
}

// ── Fixture ───────────────────────────────────────────────────────

struct Fixture {
    dir: TempDir,
    host: SandboxHost,
    surface: Arc<CapabilitySurface>,
}

impl Fixture {
    fn new() -> Self {
        let config = HostConfig {
            unload_grace: Duration::from_millis(200),
            ..HostConfig::default()
        };
        let (surface, deliveries) = CapabilitySurface::new(SurfaceConfig::default());
        let surface = Arc::new(surface);
        let spawner = Arc::new(ThreadSpawner::new(Arc::new(modules())));
        let host = SandboxHost::new(config, spawner, Arc::clone(&surface));
        host.spawn_delivery_pump(deliveries);
        Self {
            dir: TempDir::new().unwrap(),
            host,
            surface,
        }
    }

    fn extension(&self, name: &str) -> LoadRequest {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("main.module"), "").unwrap();
        let manifest =
            Manifest::parse(&format!(r#"{{"name":"{name}","version":"1.0.0","main":"main.module"}}"#)).unwrap();
        LoadRequest::new(name, path, manifest)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

async fn next_event(events: &mut broadcast::Receiver<HostEvent>) -> HostEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no host event")
        .unwrap()
}

fn storage_file(dir: &Path) -> PathBuf {
    dir.join("storage").join("storage.json")
}

// ── Tests ─────────────────────────────────────────────────────────

#[tokio::test]
async fn capability_calls_round_trip_through_a_thread_unit() {
    let fx = Fixture::new();

    let exports = fx.host.load(fx.extension("recorder")).await.unwrap();
    assert_eq!(exports, json!({"visits": 1, "greet": "[Function]"}));

    let commands: Vec<String> = fx.surface.commands().into_iter().map(|c| c.id).collect();
    assert_eq!(commands, vec!["recorder.hello".to_string()]);
    assert_eq!(fx.surface.hooks_for("recorder").len(), 1);
    assert!(storage_file(&fx.path("recorder")).is_file());
}

#[tokio::test]
async fn unload_cleans_up_capability_state() {
    let fx = Fixture::new();
    fx.host.load(fx.extension("recorder")).await.unwrap();
    let mut events = fx.host.subscribe();

    fx.host.unload("recorder").await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        HostEvent::Unloaded {
            extension_id: "recorder".into()
        }
    );
    assert!(fx.surface.commands().is_empty());
    assert!(fx.surface.hooks_for("recorder").is_empty());
    // Storage persists across unloads.
    assert!(storage_file(&fx.path("recorder")).is_file());
}

#[tokio::test]
async fn file_hook_deliveries_reach_the_plugin() {
    let fx = Fixture::new();
    fx.host.load(fx.extension("recorder")).await.unwrap();
    let mut events = fx.host.subscribe();

    assert_eq!(fx.surface.trigger_file_event(FileEventKind::Change, "/notes/Plan.MD"), 1);
    assert_eq!(fx.surface.trigger_file_event(FileEventKind::Change, "/notes/plan.txt"), 0);

    assert_eq!(
        next_event(&mut events).await,
        HostEvent::ExtensionEvent {
            extension_id: "recorder".into(),
            event: "seen".into(),
            data: json!({"event": "files.didChange", "path": "/notes/Plan.MD"}),
        }
    );
}

#[tokio::test]
async fn plugin_panic_fails_activation_without_residue() {
    let fx = Fixture::new();
    let err = fx.host.load(fx.extension("panicker")).await.unwrap_err();
    assert!(matches!(err, SandboxError::ActivationFailed { ref message, .. } if message == "kaboom"), "{err:?}");
    assert!(!fx.host.is_loaded("panicker"));
}

#[tokio::test]
async fn capability_errors_surface_in_the_plugin() {
    let fx = Fixture::new();
    let err = fx.host.load(fx.extension("failing")).await.unwrap_err();
    match err {
        SandboxError::ActivationFailed { message, .. } => assert!(message.contains("filesystem-read"), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unregistered_plugin_fails_activation() {
    let fx = Fixture::new();
    let err = fx.host.load(fx.extension("stranger")).await.unwrap_err();
    assert!(matches!(err, SandboxError::ActivationFailed { .. }));
    assert!(fx.host.loaded().is_empty());
}

#[tokio::test]
async fn hung_deactivation_is_terminated() {
    let fx = Fixture::new();
    fx.host.load(fx.extension("deaf")).await.unwrap();
    let mut events = fx.host.subscribe();

    fx.host.unload("deaf").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        HostEvent::Terminated {
            extension_id: "deaf".into()
        }
    );
    assert!(!fx.host.is_loaded("deaf"));
}
