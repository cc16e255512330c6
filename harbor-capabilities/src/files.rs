//! File-event hooks and document-folder passthrough.
//!
//! Extensions register interest in change/create/delete events scoped by a
//! path pattern. The document-watch engine calls
//! [`CapabilitySurface::trigger_file_event`](crate::CapabilitySurface::trigger_file_event)
//! and every matching hook yields one delivery to its owner.

use crate::lock;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Kind of file-system event a hook listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    Change,
    Create,
    Delete,
}

impl FileEventKind {
    /// Event name delivered to the owning extension.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Change => "files.didChange",
            Self::Create => "files.didCreate",
            Self::Delete => "files.didDelete",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

/// Registered interest in file events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub id: String,
    pub extension_id: String,
    pub pattern: String,
    pub kind: FileEventKind,
}

/// Source of the folders the document-watch engine currently observes.
pub trait WatchedFolders: Send + Sync {
    fn watched_folders(&self) -> Vec<String>;
}

#[derive(Default)]
pub(crate) struct HookRegistry {
    hooks: Mutex<Vec<Hook>>,
}

impl HookRegistry {
    pub(crate) fn register(&self, extension_id: &str, pattern: &str, kind: FileEventKind) -> String {
        let id = Uuid::new_v4().to_string();
        debug!(extension_id = %extension_id, hook_id = %id, pattern = %pattern, kind = kind.as_str(), "Registered file hook");
        lock(&self.hooks).push(Hook {
            id: id.clone(),
            extension_id: extension_id.to_string(),
            pattern: pattern.to_string(),
            kind,
        });
        id
    }

    /// Hooks of the given kind whose pattern matches `path`, in registration order.
    pub(crate) fn matching(&self, kind: FileEventKind, path: &str) -> Vec<Hook> {
        lock(&self.hooks)
            .iter()
            .filter(|hook| hook.kind == kind && pattern_matches(&hook.pattern, path))
            .cloned()
            .collect()
    }

    pub(crate) fn remove_extension(&self, extension_id: &str) -> usize {
        let mut hooks = lock(&self.hooks);
        let before = hooks.len();
        hooks.retain(|hook| hook.extension_id != extension_id);
        before - hooks.len()
    }

    pub(crate) fn for_extension(&self, extension_id: &str) -> Vec<Hook> {
        lock(&self.hooks)
            .iter()
            .filter(|hook| hook.extension_id == extension_id)
            .cloned()
            .collect()
    }
}

/// Returns true if `path` matches a hook `pattern`.
///
/// - `*` matches every path.
/// - `*.ext` matches paths ending in `.ext`, ignoring case.
/// - Anything else is a glob anchored at both ends, ignoring case, where `*`
///   matches any run of characters and `?` exactly one.
///
/// Backslashes in both the pattern and the path are treated as `/`.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let pattern = pattern.replace('\\', "/");
    let path = path.replace('\\', "/");

    if let Some(ext) = pattern.strip_prefix("*.")
        && !ext.contains(['*', '?', '/'])
    {
        return path.to_lowercase().ends_with(&format!(".{}", ext.to_lowercase()));
    }

    let mut source = String::with_capacity(pattern.len() * 2 + 2);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    match RegexBuilder::new(&source).case_insensitive(true).build() {
        Ok(re) => re.is_match(&path),
        Err(e) => {
            warn!(pattern = %pattern, "Unusable hook pattern: {}", e);
            false
        }
    }
}
