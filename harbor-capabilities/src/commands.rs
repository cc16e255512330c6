use crate::lock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// A command registered by an extension, keyed by `extensionId.localId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    pub extension_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Default)]
pub(crate) struct CommandRegistry {
    commands: Mutex<HashMap<String, Command>>,
}

impl CommandRegistry {
    /// Registers (or replaces) a command under its composite id.
    pub(crate) fn register(&self, extension_id: &str, local_id: &str, title: &str, category: Option<&str>) -> Command {
        let command = Command {
            id: format!("{extension_id}.{local_id}"),
            extension_id: extension_id.to_string(),
            title: title.to_string(),
            category: category.map(str::to_string),
        };
        lock(&self.commands).insert(command.id.clone(), command.clone());
        command
    }

    pub(crate) fn all(&self) -> Vec<Command> {
        let mut commands: Vec<_> = lock(&self.commands).values().cloned().collect();
        commands.sort_by(|a, b| a.id.cmp(&b.id));
        commands
    }

    pub(crate) fn remove_extension(&self, extension_id: &str) -> Vec<String> {
        let mut commands = lock(&self.commands);
        let ids: Vec<String> = commands
            .values()
            .filter(|c| c.extension_id == extension_id)
            .map(|c| c.id.clone())
            .collect();
        for id in &ids {
            commands.remove(id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_uses_composite_id() {
        let registry = CommandRegistry::default();
        let cmd = registry.register("word-count", "run", "Count Words", Some("Text"));
        assert_eq!(cmd.id, "word-count.run");
        assert_eq!(cmd.category.as_deref(), Some("Text"));
    }

    #[test]
    fn re_registering_replaces() {
        let registry = CommandRegistry::default();
        registry.register("ext", "run", "Old", None);
        registry.register("ext", "run", "New", None);
        let all = registry.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "New");
    }

    #[test]
    fn remove_extension_is_scoped() {
        let registry = CommandRegistry::default();
        registry.register("a", "one", "One", None);
        registry.register("a", "two", "Two", None);
        registry.register("b", "one", "One", None);

        let mut removed = registry.remove_extension("a");
        removed.sort();
        assert_eq!(removed, vec!["a.one".to_string(), "a.two".to_string()]);
        assert_eq!(registry.all().len(), 1);
    }
}
