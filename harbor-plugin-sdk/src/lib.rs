//! Plugin SDK and in-sandbox worker for Harbor extensions.
//!
//! Plugin authors implement [`Extension`] and register a factory in
//! [`NativeModules`]. Inside each isolated unit a [`SandboxWorker`] loads the
//! plugin, hands it an [`ExtensionContext`] with typed capability stubs, a
//! log shim and a restricted module resolver, and speaks the host wire
//! protocol on its behalf.
//!
//! # Example
//!
//! ```no_run
//! use harbor_plugin_sdk::prelude::*;
//!
//! struct WordCount;
//!
//! #[async_trait]
//! impl Extension for WordCount {
//!     async fn activate(&mut self, cx: ExtensionContext) -> anyhow::Result<Exports> {
//!         cx.api.files.on_did_change("*.md").await?;
//!         cx.api.commands.register("run", "Count Words", Some("Text")).await?;
//!         Ok(Exports::none().function("count"))
//!     }
//!
//!     async fn on_event(&mut self, event: &str, data: serde_json::Value) -> anyhow::Result<()> {
//!         if event == "files.didChange" {
//!             let _path = data["path"].as_str().unwrap_or_default();
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let modules = NativeModules::new().with("word-count", || Box::new(WordCount));
//! # let _ = modules;
//! ```

pub mod api;
mod console;
mod context;
mod error;
mod exports;
mod extension;
mod loader;
pub mod modules;
pub mod prelude;
mod rpc;
mod worker;

use std::any::Any;

pub use console::{CIRCULAR_MARKER, Console, MAX_LOG_DEPTH, loggable, sanitize};
pub use context::ExtensionContext;
pub use error::{Result, SdkError};
pub use exports::{Export, Exports};
pub use extension::Extension;
pub use loader::{ExtensionFactory, ModuleLoader, NativeModules};
pub use modules::{Module, ModuleResolver};
pub use rpc::{DEFAULT_CALL_TIMEOUT, Outbox, RpcClient};
pub use worker::{EXIT_DISCONNECTED, EXIT_OK, SandboxWorker, WorkerConfig};

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plugin panicked".to_string()
    }
}
