//! Per-user extension state: the disabled list and per-extension settings.
//!
//! Stored as a single JSON document, rewritten in full on every mutation.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub disabled: BTreeSet<String>,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

impl UserConfig {
    /// Reads the state file. A missing file yields the default; an
    /// unreadable or malformed one is logged and also yields the default.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("No extension state at {:?}, starting fresh", path);
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse extension state {:?}: {}. Starting fresh.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read extension state {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }

    /// Drops everything recorded for `id`. Returns whether anything changed.
    pub fn forget(&mut self, id: &str) -> bool {
        let disabled = self.disabled.remove(id);
        let settings = self.settings.remove(id).is_some();
        disabled || settings
    }
}
