//! Presentation-layer registries: status-bar items, views and pending prompts.

use crate::lock;
use harbor_types::PromptId;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A status-bar entry owned by an extension.
///
/// Display properties (`text`, `tooltip`, `command`, ...) are kept as given
/// so that updates can merge them field by field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBarItem {
    pub id: String,
    pub extension_id: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// A view contributed by an extension, keyed by `extensionId.localId`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: String,
    pub extension_id: String,
    pub options: Value,
}

#[derive(Default)]
pub(crate) struct StatusBar {
    items: Mutex<HashMap<String, StatusBarItem>>,
}

impl StatusBar {
    pub(crate) fn create(&self, extension_id: &str, options: &Value) -> StatusBarItem {
        let item = StatusBarItem {
            id: format!("{}.statusbar.{}", extension_id, uuid::Uuid::new_v4()),
            extension_id: extension_id.to_string(),
            properties: options.as_object().cloned().unwrap_or_default(),
        };
        lock(&self.items).insert(item.id.clone(), item.clone());
        item
    }

    /// Merges `patch` into an item owned by `extension_id`. Unknown or
    /// foreign ids yield `None`.
    pub(crate) fn update(&self, extension_id: &str, id: &str, patch: &Value) -> Option<StatusBarItem> {
        let mut items = lock(&self.items);
        let item = items.get_mut(id).filter(|item| item.extension_id == extension_id)?;
        if let Some(fields) = patch.as_object() {
            for (key, value) in fields {
                item.properties.insert(key.clone(), value.clone());
            }
        }
        Some(item.clone())
    }

    pub(crate) fn remove(&self, extension_id: &str, id: &str) -> Option<StatusBarItem> {
        let mut items = lock(&self.items);
        if items.get(id)?.extension_id != extension_id {
            return None;
        }
        items.remove(id)
    }

    /// Removes every item owned by the extension, returning the removed ids.
    pub(crate) fn remove_extension(&self, extension_id: &str) -> Vec<String> {
        let mut items = lock(&self.items);
        let ids: Vec<String> = items
            .values()
            .filter(|item| item.extension_id == extension_id)
            .map(|item| item.id.clone())
            .collect();
        for id in &ids {
            items.remove(id);
        }
        ids
    }

    pub(crate) fn all(&self) -> Vec<StatusBarItem> {
        let mut items: Vec<_> = lock(&self.items).values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }
}

#[derive(Default)]
pub(crate) struct Views {
    views: Mutex<HashMap<String, View>>,
}

impl Views {
    pub(crate) fn register(&self, extension_id: &str, local_id: &str, options: Value) -> View {
        let view = View {
            id: format!("{extension_id}.{local_id}"),
            extension_id: extension_id.to_string(),
            options,
        };
        lock(&self.views).insert(view.id.clone(), view.clone());
        view
    }

    pub(crate) fn remove_extension(&self, extension_id: &str) -> Vec<String> {
        let mut views = lock(&self.views);
        let ids: Vec<String> = views
            .values()
            .filter(|view| view.extension_id == extension_id)
            .map(|view| view.id.clone())
            .collect();
        for id in &ids {
            views.remove(id);
        }
        ids
    }

    pub(crate) fn all(&self) -> Vec<View> {
        let mut views: Vec<_> = lock(&self.views).values().cloned().collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }
}

struct PendingPrompt {
    extension_id: String,
    reply: oneshot::Sender<Value>,
}

/// Quick-pick and input-box requests awaiting an answer from the user.
pub(crate) struct PromptBroker {
    pending: Mutex<HashMap<PromptId, PendingPrompt>>,
    timeout: Duration,
}

impl PromptBroker {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub(crate) fn open(&self, extension_id: &str) -> (PromptId, oneshot::Receiver<Value>) {
        let id = PromptId::new();
        let (reply, rx) = oneshot::channel();
        lock(&self.pending).insert(
            id,
            PendingPrompt {
                extension_id: extension_id.to_string(),
                reply,
            },
        );
        (id, rx)
    }

    /// Waits for the answer. Expiry and abandonment both resolve to `null`.
    pub(crate) async fn wait(&self, id: PromptId, rx: oneshot::Receiver<Value>) -> Value {
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => {
                debug!(prompt_id = %id, "Prompt abandoned");
                Value::Null
            }
            Err(_) => {
                lock(&self.pending).remove(&id);
                warn!(prompt_id = %id, timeout_secs = self.timeout.as_secs(), "Prompt timed out");
                Value::Null
            }
        }
    }

    pub(crate) fn resolve(&self, id: PromptId, value: Value) -> bool {
        match lock(&self.pending).remove(&id) {
            Some(prompt) => prompt.reply.send(value).is_ok(),
            None => false,
        }
    }

    /// Abandons the extension's open prompts; their waiters see `null`.
    pub(crate) fn remove_extension(&self, extension_id: &str) -> usize {
        let mut pending = lock(&self.pending);
        let before = pending.len();
        pending.retain(|_, prompt| prompt.extension_id != extension_id);
        before - pending.len()
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_bar_update_merges_fields() {
        let bar = StatusBar::default();
        let item = bar.create("ext", &json!({"text": "Idle", "tooltip": "state"}));
        assert!(item.id.starts_with("ext.statusbar."));

        let updated = bar.update("ext", &item.id, &json!({"text": "Busy"})).unwrap();
        assert_eq!(updated.properties["text"], "Busy");
        assert_eq!(updated.properties["tooltip"], "state");
    }

    #[test]
    fn status_bar_update_unknown_is_none() {
        let bar = StatusBar::default();
        assert!(bar.update("ext", "nope", &json!({"text": "x"})).is_none());
        assert!(bar.all().is_empty());
    }

    #[test]
    fn status_bar_items_are_owner_scoped() {
        let bar = StatusBar::default();
        let item = bar.create("owner", &json!({"text": "Mine"}));

        assert!(bar.update("intruder", &item.id, &json!({"text": "Hijacked"})).is_none());
        assert!(bar.remove("intruder", &item.id).is_none());
        assert_eq!(bar.all()[0].properties["text"], "Mine");

        assert!(bar.remove("owner", &item.id).is_some());
        assert!(bar.all().is_empty());
    }

    #[test]
    fn status_bar_item_serializes_flat() {
        let bar = StatusBar::default();
        let item = bar.create("ext", &json!({"text": "Idle"}));
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["text"], "Idle");
        assert_eq!(value["extensionId"], "ext");
    }

    #[test]
    fn views_use_composite_ids() {
        let views = Views::default();
        let view = views.register("ext", "sidebar", json!({"title": "Side"}));
        assert_eq!(view.id, "ext.sidebar");
        assert_eq!(views.remove_extension("ext"), vec!["ext.sidebar".to_string()]);
        assert!(views.all().is_empty());
    }

    #[test]
    fn prompt_resolves_with_answer() {
        let broker = PromptBroker::new(Duration::from_secs(5));
        let (id, rx) = broker.open("ext");
        assert!(broker.resolve(id, json!("picked")));
        assert_eq!(tokio_test::block_on(broker.wait(id, rx)), json!("picked"));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_times_out_to_null() {
        let broker = PromptBroker::new(Duration::from_secs(60));
        let (id, rx) = broker.open("ext");
        assert_eq!(broker.wait(id, rx).await, Value::Null);
        assert_eq!(broker.pending_count(), 0);
        assert!(!broker.resolve(id, json!("late")));
    }

    #[tokio::test]
    async fn abandoned_prompt_is_null() {
        let broker = PromptBroker::new(Duration::from_secs(5));
        let (id, rx) = broker.open("ext");
        assert_eq!(broker.remove_extension("ext"), 1);
        assert_eq!(broker.wait(id, rx).await, Value::Null);
    }
}
