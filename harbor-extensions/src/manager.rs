//! Central extension lifecycle manager.
//!
//! Owns the registry of discovered extensions and the user's extension
//! state, and drives the [`SandboxHost`] through each record's lifecycle.
//! Locks are never held across an await; a record's `activating` and
//! `deactivating` states keep concurrent transitions of the same extension
//! from interleaving.

use crate::activation::matches_activation_event;
use crate::config::HarborConfig;
use crate::error::{ExtensionError, Result};
use crate::install::{copy_tree, remove_tree};
use crate::lock;
use crate::record::ExtensionRecord;
use crate::user_config::UserConfig;
use harbor_sandbox::{HostEvent, LoadRequest, SandboxHost};
use harbor_types::{ExtensionState, MANIFEST_FILE, Manifest};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of [`ExtensionManager::activate_by_event`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActivationReport {
    pub activated: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct ExtensionManager {
    host: SandboxHost,
    builtin_dir: PathBuf,
    user_dir: PathBuf,
    state_path: PathBuf,
    records: Mutex<HashMap<String, ExtensionRecord>>,
    user_config: Mutex<UserConfig>,
}

impl ExtensionManager {
    pub fn new(host: SandboxHost, builtin_dir: PathBuf, user_dir: PathBuf, state_path: PathBuf) -> Self {
        let user_config = UserConfig::load(&state_path);
        Self {
            host,
            builtin_dir,
            user_dir,
            state_path,
            records: Mutex::new(HashMap::new()),
            user_config: Mutex::new(user_config),
        }
    }

    pub fn from_config(host: SandboxHost, config: &HarborConfig) -> Self {
        Self::new(
            host,
            config.directories.builtin.clone(),
            config.directories.user.clone(),
            config.directories.state_file.clone(),
        )
    }

    pub fn host(&self) -> &SandboxHost {
        &self.host
    }

    // ================================================================
    // Discovery
    // ================================================================

    /// Scans the builtin directory, then the user directory, and rebuilds
    /// the registry. A later manifest with the same name replaces an earlier
    /// one. Records that are not inactive keep their lifecycle state, and
    /// running extensions whose directory disappeared stay registered.
    pub fn discover(&self) -> usize {
        let mut found: HashMap<String, ExtensionRecord> = HashMap::new();
        for (dir, is_builtin) in [(&self.builtin_dir, true), (&self.user_dir, false)] {
            for record in scan_directory(dir, is_builtin) {
                if let Some(previous) = found.get(&record.id) {
                    debug!(
                        extension_id = %record.id,
                        "Replacing {:?} with {:?}", previous.path, record.path
                    );
                }
                found.insert(record.id.clone(), record);
            }
        }

        let mut records = lock(&self.records);
        for (id, record) in found.iter_mut() {
            if let Some(previous) = records.get(id) {
                record.inherit(previous);
            }
        }
        for (id, previous) in records.drain() {
            if !found.contains_key(&id) && previous.state != ExtensionState::Inactive {
                warn!(extension_id = %id, "Extension directory vanished while {}", previous.state);
                found.insert(id, previous);
            }
        }
        *records = found;
        info!(count = records.len(), "Extension discovery complete");
        records.len()
    }

    // ================================================================
    // Lifecycle
    // ================================================================

    /// Activates an extension and returns its export summary. Returns the
    /// cached summary if it is already active and `None` if it is disabled.
    pub async fn activate(&self, id: &str) -> Result<Option<Value>> {
        let disabled = self.is_disabled(id);
        let request = {
            let mut records = lock(&self.records);
            let record = records.get_mut(id).ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;
            match record.state {
                ExtensionState::Active => return Ok(record.exports.clone()),
                state if state.is_transitioning() => {
                    return Err(ExtensionError::InTransition {
                        id: id.to_string(),
                        state,
                    });
                }
                _ => {}
            }
            if disabled {
                debug!(extension_id = %id, "Extension is disabled; not activating");
                return Ok(None);
            }
            record.state = ExtensionState::Activating;
            record.error = None;
            LoadRequest::new(id, record.path.clone(), record.manifest.clone())
        };

        info!(extension_id = %id, "Activating extension");
        let outcome = self.host.load(request).await;

        let mut records = lock(&self.records);
        match outcome {
            Ok(exports) => {
                if let Some(record) = records.get_mut(id) {
                    record.state = ExtensionState::Active;
                    record.exports = Some(exports.clone());
                }
                Ok(Some(exports))
            }
            Err(e) => {
                error!(extension_id = %id, "Activation failed: {}", e);
                if let Some(record) = records.get_mut(id) {
                    record.state = ExtensionState::Error;
                    record.exports = None;
                    record.error = Some(e.to_string());
                }
                Err(e.into())
            }
        }
    }

    /// Deactivates an active extension. Anything else is a no-op.
    pub async fn deactivate(&self, id: &str) -> Result<()> {
        {
            let mut records = lock(&self.records);
            let record = records.get_mut(id).ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;
            if !record.is_active() {
                debug!(extension_id = %id, state = %record.state, "Not active; nothing to deactivate");
                return Ok(());
            }
            record.state = ExtensionState::Deactivating;
        }

        info!(extension_id = %id, "Deactivating extension");
        let outcome = self.host.unload(id).await;

        let mut records = lock(&self.records);
        match outcome {
            Ok(()) => {
                if let Some(record) = records.get_mut(id) {
                    record.state = ExtensionState::Inactive;
                    record.exports = None;
                }
                Ok(())
            }
            Err(e) => {
                error!(extension_id = %id, "Deactivation failed: {}", e);
                if let Some(record) = records.get_mut(id) {
                    record.state = ExtensionState::Error;
                    record.error = Some(e.to_string());
                }
                Err(e.into())
            }
        }
    }

    /// Persists the enabled flag, then deactivates (disable) or activates
    /// (enable) the extension.
    pub async fn toggle_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.require(id)?;
        {
            let mut config = lock(&self.user_config);
            let mut next = config.clone();
            let changed = if enabled {
                next.disabled.remove(id)
            } else {
                next.disabled.insert(id.to_string())
            };
            if changed {
                next.save(&self.state_path)?;
                *config = next;
            }
        }
        info!(extension_id = %id, enabled, "Extension enabled flag updated");

        if enabled {
            self.activate(id).await.map(|_| ())
        } else {
            self.deactivate(id).await
        }
    }

    /// Activates every inactive, enabled extension with an activation event
    /// matching `event`. One failure does not stop the others.
    pub async fn activate_by_event(&self, event: &str) -> ActivationReport {
        let disabled = lock(&self.user_config).disabled.clone();
        let mut candidates: Vec<String> = lock(&self.records)
            .values()
            .filter(|r| r.state == ExtensionState::Inactive && !disabled.contains(&r.id))
            .filter(|r| {
                r.manifest
                    .activation_events()
                    .iter()
                    .any(|pattern| matches_activation_event(pattern, event))
            })
            .map(|r| r.id.clone())
            .collect();
        candidates.sort();

        debug!(event = %event, count = candidates.len(), "Activation event matched");
        let mut report = ActivationReport::default();
        for id in candidates {
            match self.activate(&id).await {
                Ok(Some(_)) => report.activated.push(id),
                Ok(None) => {}
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }
        report
    }

    // ================================================================
    // Install / Uninstall
    // ================================================================

    /// Copies an extension directory into the user directory under its
    /// manifest name and registers it. An existing installation with the
    /// same name is replaced.
    pub async fn install(&self, source: &Path) -> Result<String> {
        if !source.join(MANIFEST_FILE).is_file() {
            return Err(ExtensionError::InvalidSource {
                path: source.to_path_buf(),
                reason: format!("no {MANIFEST_FILE}"),
            });
        }
        let manifest = Manifest::load(source).map_err(|e| ExtensionError::InvalidSource {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        let id = manifest.name.clone();
        let dest = self.user_dir.join(&id);

        if self.get(&id).is_some_and(|r| r.is_active()) {
            self.deactivate(&id).await?;
        }
        if dest.exists() {
            info!(extension_id = %id, "Replacing existing installation");
            std::fs::remove_dir_all(&dest)?;
        }
        let files = copy_tree(source, &dest)?;
        let manifest = Manifest::load(&dest)?;
        lock(&self.records).insert(id.clone(), ExtensionRecord::new(dest, manifest, false));
        info!(extension_id = %id, files, "Extension installed");
        Ok(id)
    }

    /// Deactivates, unregisters and deletes a user extension.
    pub async fn uninstall(&self, id: &str) -> Result<()> {
        let record = self.require(id)?;
        if record.is_builtin {
            return Err(ExtensionError::BuiltinProtected(id.to_string()));
        }
        if record.is_active() {
            self.deactivate(id).await?;
        }

        {
            let mut config = lock(&self.user_config);
            let mut next = config.clone();
            if next.forget(id) {
                next.save(&self.state_path)?;
                *config = next;
            }
        }
        lock(&self.records).remove(id);
        remove_tree(&record.path);
        info!(extension_id = %id, "Extension uninstalled");
        Ok(())
    }

    // ================================================================
    // Settings
    // ================================================================

    pub fn settings(&self, id: &str) -> Option<Value> {
        lock(&self.user_config).settings.get(id).cloned()
    }

    pub fn update_settings(&self, id: &str, settings: Value) -> Result<()> {
        self.require(id)?;
        let mut config = lock(&self.user_config);
        let mut next = config.clone();
        next.settings.insert(id.to_string(), settings);
        next.save(&self.state_path)?;
        *config = next;
        Ok(())
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        lock(&self.user_config).is_disabled(id)
    }

    // ================================================================
    // Host events
    // ================================================================

    /// Folds an out-of-band host event into the registry.
    pub fn apply_host_event(&self, event: &HostEvent) {
        let mut records = lock(&self.records);
        let Some(record) = records.get_mut(event.extension_id()) else {
            return;
        };
        match event {
            HostEvent::Crashed { reason, .. } => {
                warn!(extension_id = %record.id, "Extension crashed: {}", reason);
                record.state = ExtensionState::Error;
                record.exports = None;
                record.error = Some(reason.clone());
            }
            HostEvent::Unloaded { .. } | HostEvent::Terminated { .. } if record.is_active() => {
                info!(extension_id = %record.id, "Extension stopped outside the manager");
                record.state = ExtensionState::Inactive;
                record.exports = None;
            }
            HostEvent::ExtensionError { error, .. } => {
                record.error = Some(error.clone());
            }
            _ => {}
        }
    }

    /// Applies host events until the host is dropped.
    pub fn watch_host_events(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut events = self.host.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => manager.apply_host_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Host event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Stops every unit and resets all records to inactive.
    pub async fn shutdown(&self) {
        let failures = self.host.shutdown().await;
        let mut records = lock(&self.records);
        for record in records.values_mut() {
            if record.state != ExtensionState::Error {
                record.state = ExtensionState::Inactive;
            }
            record.exports = None;
        }
        info!(failures = failures.len(), "Extension manager shut down");
    }

    // ================================================================
    // Queries
    // ================================================================

    pub fn list(&self) -> Vec<ExtensionRecord> {
        let mut records: Vec<_> = lock(&self.records).values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn get(&self, id: &str) -> Option<ExtensionRecord> {
        lock(&self.records).get(id).cloned()
    }

    fn require(&self, id: &str) -> Result<ExtensionRecord> {
        self.get(id).ok_or_else(|| ExtensionError::NotFound(id.to_string()))
    }
}

/// Reads every `<dir>/<name>/manifest.json`, in name order. Invalid
/// manifests are logged and skipped.
fn scan_directory(dir: &Path, is_builtin: bool) -> Vec<ExtensionRecord> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping extension directory {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.join(MANIFEST_FILE).is_file())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| match Manifest::load(&path) {
            Ok(manifest) => Some(ExtensionRecord::new(path, manifest, is_builtin)),
            Err(e) => {
                warn!("Skipping extension at {:?}: {}", path, e);
                None
            }
        })
        .collect()
}
