//! Plugin loading.
//!
//! The worker never decides how plugin code comes into existence; it asks
//! the [`ModuleLoader`] it was constructed with. [`NativeModules`] is the
//! registry of compiled-in plugins, keyed by manifest name.

use crate::error::{Result, SdkError};
use crate::extension::Extension;
use harbor_types::Manifest;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub trait ModuleLoader: Send + Sync {
    /// Instantiates the plugin whose entry file is `entry`.
    fn load(&self, manifest: &Manifest, entry: &Path) -> Result<Box<dyn Extension>>;
}

pub type ExtensionFactory = Arc<dyn Fn() -> Box<dyn Extension> + Send + Sync>;

#[derive(Clone, Default)]
pub struct NativeModules {
    factories: HashMap<String, ExtensionFactory>,
}

impl NativeModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for the extension named `name`. Later
    /// registrations replace earlier ones.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ModuleLoader for NativeModules {
    fn load(&self, manifest: &Manifest, _entry: &Path) -> Result<Box<dyn Extension>> {
        let factory = self
            .factories
            .get(&manifest.name)
            .ok_or_else(|| SdkError::PluginNotRegistered(manifest.name.clone()))?;
        Ok(factory())
    }
}
