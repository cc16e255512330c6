//! Extension manifest (`manifest.json`) parsing and validation.

use crate::{Error, PermissionSet, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path};

/// File name of the manifest inside every extension directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Activation pattern used when a manifest declares none.
const DEFAULT_ACTIVATION: &str = "*";

/// Declarative description of an extension.
///
/// `name`, `version` and `main` are required and non-empty; everything else
/// is optional. Once loaded a manifest is never mutated; a re-scan reads it
/// again from disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub main: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_events: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

/// On-disk shape, with the required fields still optional so that a missing
/// field produces a readable validation message instead of a serde error.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    main: Option<String>,
    #[serde(default)]
    permissions: Vec<String>,
    activation_events: Option<Vec<String>>,
    contributes: Option<Value>,
    display_name: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
}

impl Manifest {
    /// Reads and validates `manifest.json` from an extension directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(Error::ManifestNotFound(dir.to_path_buf()));
        }
        let contents = std::fs::read_to_string(&path)?;
        Self::parse(&contents).map_err(|message| Error::ManifestInvalid { path, message })
    }

    /// Parses and validates manifest JSON. The error is a human-readable reason.
    pub fn parse(json: &str) -> std::result::Result<Self, String> {
        let raw: RawManifest = serde_json::from_str(json).map_err(|e| e.to_string())?;

        let name = required(raw.name, "name")?;
        check_name(&name)?;
        let version = required(raw.version, "version")?;
        let main = required(raw.main, "main")?;

        Ok(Self {
            name,
            version,
            main,
            permissions: raw.permissions,
            activation_events: raw.activation_events,
            contributes: raw.contributes,
            display_name: raw.display_name,
            description: raw.description,
            author: raw.author,
            categories: raw.categories,
        })
    }

    /// Activation patterns, defaulting to `["*"]`.
    pub fn activation_events(&self) -> Vec<String> {
        match &self.activation_events {
            Some(events) => events.clone(),
            None => vec![DEFAULT_ACTIVATION.to_string()],
        }
    }

    /// The declared permissions as a checked set.
    pub fn permission_set(&self) -> PermissionSet {
        PermissionSet::from_declared(&self.permissions)
    }

    /// Display name if declared, otherwise the manifest name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

fn required(value: Option<String>, field: &str) -> std::result::Result<String, String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(format!("required field '{field}' is empty")),
        None => Err(format!("missing required field '{field}'")),
    }
}

/// The name doubles as the install directory name, so it must be a single
/// plain path component.
fn check_name(name: &str) -> std::result::Result<(), String> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains(['/', '\\']) {
        return Err(format!("name '{name}' must be a single directory name"));
    }
    Ok(())
}
