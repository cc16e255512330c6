//! Host-side capability surface for Harbor extensions.
//!
//! Plugin code never touches the application directly. Its calls arrive
//! here as `(namespace, method, args)` triples and are routed to:
//! - `files`: file-event hooks, watched folders, permission-gated reads
//! - `meetings`: meeting store passthrough and post-processor registration
//! - `ui`: notifications, prompts, status-bar items and views
//! - `commands`: command registration and execution requests
//! - `llm`: chat backend or local inference fallback
//! - `storage`: per-extension JSON key-value documents
//!
//! External collaborators (meeting store, document watcher, chat backend)
//! are injected as traits; the presentation layer is reached only through
//! the [`UiEvent`] broadcast channel.

mod args;
mod commands;
mod context;
mod error;
mod events;
mod files;
mod llm;
mod meetings;
mod storage;
mod surface;
mod ui;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use commands::Command;
pub use context::CallContext;
pub use error::{CapabilityError, Result};
pub use events::{Delivery, UiEvent};
pub use files::{FileEventKind, Hook, WatchedFolders, pattern_matches};
pub use llm::{ChatBackend, DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL, LocalChat};
pub use meetings::{MeetingStore, PostProcessor};
pub use storage::ExtensionStorage;
pub use surface::{CapabilitySurface, CleanupSummary, POST_PROCESS_EVENT, SurfaceConfig};
pub use ui::{StatusBarItem, View};

/// Registry critical sections never panic, so a poisoned lock still holds
/// consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
