use harbor_types::{ExtensionState, Manifest};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// A registered extension as the manager tracks it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRecord {
    pub id: String,
    pub path: PathBuf,
    pub manifest: Manifest,
    pub is_builtin: bool,
    pub state: ExtensionState,
    /// Shallow export summary from the last successful activation.
    pub exports: Option<Value>,
    /// Message of the last failure, if any.
    pub error: Option<String>,
}

impl ExtensionRecord {
    pub fn new(path: PathBuf, manifest: Manifest, is_builtin: bool) -> Self {
        Self {
            id: manifest.name.clone(),
            path,
            manifest,
            is_builtin,
            state: ExtensionState::Inactive,
            exports: None,
            error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ExtensionState::Active
    }

    /// Carries lifecycle state over from the record this one replaces.
    pub(crate) fn inherit(&mut self, previous: &ExtensionRecord) {
        self.state = previous.state;
        self.exports = previous.exports.clone();
        self.error = previous.error.clone();
    }
}
