use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One entry in a plugin's activation result.
#[derive(Debug, Clone, PartialEq)]
pub enum Export {
    Value(Value),
    /// A callable entry. Only its presence crosses the boundary.
    Function,
}

/// What a plugin returns from activation.
///
/// The host only ever sees a shallow summary: functions become
/// `"[Function]"`, nested objects and arrays become `"[Object]"` and
/// primitives pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exports {
    entries: BTreeMap<String, Export>,
}

impl Exports {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(name.into(), Export::Value(value.into()));
        self
    }

    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.entries.insert(name.into(), Export::Function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Export> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shallow, serializable summary sent in the `activated` message.
    /// An empty export set summarizes to `null`.
    pub fn summarize(&self) -> Value {
        if self.entries.is_empty() {
            return Value::Null;
        }
        let summary: Map<String, Value> = self
            .entries
            .iter()
            .map(|(name, export)| {
                let shown = match export {
                    Export::Function => Value::String("[Function]".into()),
                    Export::Value(Value::Object(_) | Value::Array(_)) => Value::String("[Object]".into()),
                    Export::Value(primitive) => primitive.clone(),
                };
                (name.clone(), shown)
            })
            .collect();
        Value::Object(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn empty_summarizes_to_null() {
        assert_eq!(Exports::none().summarize(), Value::Null);
    }

    #[test]
    fn summary_is_shallow() {
        let exports = Exports::none()
            .function("countWords")
            .value("version", "1.0.0")
            .value("limit", 10)
            .value("enabled", true)
            .value("config", json!({"deep": {"deeper": 1}}))
            .value("list", json!([1, 2, 3]));

        assert_eq!(
            exports.summarize(),
            json!({
                "countWords": "[Function]",
                "version": "1.0.0",
                "limit": 10,
                "enabled": true,
                "config": "[Object]",
                "list": "[Object]",
            })
        );
    }
}
