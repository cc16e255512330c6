//! Per-extension key-value storage.
//!
//! Each extension gets one flat JSON document at
//! `<extension dir>/storage/storage.json`. Documents are loaded on first
//! access, cached by extension id and rewritten in full on every mutation.

use crate::error::{CapabilityError, Result};
use crate::lock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const STORAGE_DIR: &str = "storage";
const STORAGE_FILE: &str = "storage.json";

/// One extension's storage document.
pub struct ExtensionStorage {
    extension_id: String,
    storage_path: PathBuf,
    values: Map<String, Value>,
}

impl ExtensionStorage {
    /// Loads the document under `extension_path`, starting empty if it does
    /// not exist or cannot be parsed.
    pub fn load(extension_id: &str, extension_path: &Path) -> Self {
        let storage_path = extension_path.join(STORAGE_DIR).join(STORAGE_FILE);

        let values = match fs::read_to_string(&storage_path) {
            Ok(contents) => match serde_json::from_str::<Map<String, Value>>(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!(extension_id = %extension_id, "Discarding unreadable storage document: {}", e);
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };

        debug!(extension_id = %extension_id, keys = values.len(), "Loaded extension storage");
        Self {
            extension_id: extension_id.to_string(),
            storage_path,
            values,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Sets a value and writes the document to disk. The cached document
    /// only changes once the write succeeds.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut next = self.values.clone();
        next.insert(key.to_string(), value);
        self.commit(next)
    }

    /// Removes a key, writing the document only if something changed.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if !self.values.contains_key(key) {
            return Ok(());
        }
        let mut next = self.values.clone();
        next.remove(key);
        self.commit(next)
    }

    pub fn all(&self) -> &Map<String, Value> {
        &self.values
    }

    fn commit(&mut self, next: Map<String, Value>) -> Result<()> {
        self.write(&next)?;
        self.values = next;
        Ok(())
    }

    fn write(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CapabilityError::Storage(format!(
                    "failed to create storage directory for extension '{}': {}",
                    self.extension_id, e
                ))
            })?;
        }

        let contents = serde_json::to_string_pretty(values)?;
        fs::write(&self.storage_path, contents).map_err(|e| {
            CapabilityError::Storage(format!(
                "failed to write storage for extension '{}': {}",
                self.extension_id, e
            ))
        })
    }
}

/// Lazily populated cache of storage documents keyed by extension id.
#[derive(Default)]
pub(crate) struct StorageCache {
    documents: Mutex<HashMap<String, ExtensionStorage>>,
}

impl StorageCache {
    /// Runs `f` against the extension's document, loading it on first use.
    /// The cache lock is held for the duration, serializing writers.
    pub(crate) fn with<R>(&self, extension_id: &str, extension_path: &Path, f: impl FnOnce(&mut ExtensionStorage) -> R) -> R {
        let mut documents = lock(&self.documents);
        let storage = documents
            .entry(extension_id.to_string())
            .or_insert_with(|| ExtensionStorage::load(extension_id, extension_path));
        f(storage)
    }

    pub(crate) fn evict(&self, extension_id: &str) -> bool {
        lock(&self.documents).remove(extension_id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self, extension_id: &str) -> bool {
        lock(&self.documents).contains_key(extension_id)
    }
}
