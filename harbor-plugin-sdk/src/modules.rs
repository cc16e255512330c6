//! Restricted module resolver.
//!
//! Plugin code obtains host facilities only through [`ModuleResolver::require`]:
//! - platform utilities (`path`, `url`, `util`, `events`, `timers`, ...) always;
//! - `fs` with a filesystem permission (reads and writes gated separately);
//! - `net` (and its `http`/`https` aliases) with `network`;
//! - `crypto` with `cryptography`;
//! - a short allowlist of utility packages;
//! - local paths that stay inside the extension directory.
//!
//! Everything else is refused with `ModuleNotAllowed`.

use crate::error::{Result, SdkError};
use harbor_types::{Permission, PermissionSet};
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

const PLATFORM_MODULES: &[&str] = &[
    "path",
    "url",
    "util",
    "events",
    "timers",
    "string_decoder",
    "querystring",
];

const ALLOWED_PACKAGES: &[&str] = &["uuid", "lodash", "date-fns", "moment"];

/// A module handed to plugin code.
#[derive(Debug, Clone)]
pub enum Module {
    Platform(&'static str),
    Package(&'static str),
    Fs(FsModule),
    Net(NetModule),
    Crypto(CryptoModule),
    /// A file inside the extension directory.
    Local(PathBuf),
}

impl Module {
    pub fn name(&self) -> &str {
        match self {
            Self::Platform(name) | Self::Package(name) => name,
            Self::Fs(_) => "fs",
            Self::Net(_) => "net",
            Self::Crypto(_) => "crypto",
            Self::Local(_) => "local",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModuleResolver {
    extension_path: PathBuf,
    permissions: PermissionSet,
}

impl ModuleResolver {
    pub fn new(extension_path: impl Into<PathBuf>, permissions: PermissionSet) -> Self {
        Self {
            extension_path: extension_path.into(),
            permissions,
        }
    }

    pub fn require(&self, specifier: &str) -> Result<Module> {
        if is_local(specifier) {
            return self.resolve_local(specifier);
        }
        if let Some(name) = PLATFORM_MODULES.iter().find(|m| **m == specifier) {
            return Ok(Module::Platform(*name));
        }
        if let Some(name) = ALLOWED_PACKAGES.iter().find(|m| **m == specifier) {
            return Ok(Module::Package(*name));
        }

        match specifier {
            "fs" => {
                if !self.permissions.has_filesystem() {
                    return Err(SdkError::ModuleNotAllowed(specifier.to_string()));
                }
                Ok(Module::Fs(FsModule {
                    root: self.extension_path.clone(),
                    can_read: self.permissions.is_granted(Permission::FilesystemRead),
                    can_write: self.permissions.is_granted(Permission::FilesystemWrite),
                }))
            }
            "net" | "http" | "https" => {
                if !self.permissions.is_granted(Permission::Network) {
                    return Err(SdkError::ModuleNotAllowed(specifier.to_string()));
                }
                Ok(Module::Net(NetModule { client: Client::new() }))
            }
            "crypto" => {
                if !self.permissions.is_granted(Permission::Cryptography) {
                    return Err(SdkError::ModuleNotAllowed(specifier.to_string()));
                }
                Ok(Module::Crypto(CryptoModule))
            }
            _ => Err(SdkError::ModuleNotAllowed(specifier.to_string())),
        }
    }

    /// Convenience accessors for the permission-gated modules.
    pub fn fs(&self) -> Result<FsModule> {
        match self.require("fs")? {
            Module::Fs(fs) => Ok(fs),
            _ => Err(SdkError::ModuleNotAllowed("fs".into())),
        }
    }

    pub fn net(&self) -> Result<NetModule> {
        match self.require("net")? {
            Module::Net(net) => Ok(net),
            _ => Err(SdkError::ModuleNotAllowed("net".into())),
        }
    }

    pub fn crypto(&self) -> Result<CryptoModule> {
        match self.require("crypto")? {
            Module::Crypto(crypto) => Ok(crypto),
            _ => Err(SdkError::ModuleNotAllowed("crypto".into())),
        }
    }

    fn resolve_local(&self, specifier: &str) -> Result<Module> {
        let root = normalize(&self.extension_path);
        let requested = Path::new(specifier);
        let joined = if requested.is_absolute() {
            normalize(requested)
        } else {
            normalize(&root.join(requested))
        };
        if !joined.starts_with(&root) {
            return Err(SdkError::ModuleAccessDenied(specifier.to_string()));
        }
        if !joined.exists() {
            return Err(SdkError::ModuleNotFound(joined));
        }
        Ok(Module::Local(joined))
    }
}

fn is_local(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

fn denied(module: &str, permission: Permission) -> SdkError {
    SdkError::PermissionDenied {
        module: module.to_string(),
        permission: permission.name().to_string(),
    }
}

/// Lexically resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Filesystem access with separate read and write gates. Relative paths are
/// resolved against the extension directory.
#[derive(Debug, Clone)]
pub struct FsModule {
    root: PathBuf,
    can_read: bool,
    can_write: bool,
}

impl FsModule {
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn check(&self, allowed: bool, permission: Permission) -> Result<()> {
        if allowed { Ok(()) } else { Err(denied("fs", permission)) }
    }

    pub async fn read_to_string(&self, path: &str) -> Result<String> {
        self.check(self.can_read, Permission::FilesystemRead)?;
        Ok(tokio::fs::read_to_string(self.resolve(path)).await?)
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.check(self.can_read, Permission::FilesystemRead)?;
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    pub async fn write(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        self.check(self.can_write, Permission::FilesystemWrite)?;
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(target, contents).await?)
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        self.check(self.can_write, Permission::FilesystemWrite)?;
        Ok(tokio::fs::remove_file(self.resolve(path)).await?)
    }
}

/// Outbound HTTP.
#[derive(Debug, Clone)]
pub struct NetModule {
    client: Client,
}

impl NetModule {
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(network)?;
        let response = response.error_for_status().map_err(network)?;
        response.text().await.map_err(network)
    }

    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self.client.post(url).json(body).send().await.map_err(network)?;
        let response = response.error_for_status().map_err(network)?;
        response.json().await.map_err(network)
    }
}

fn network(e: reqwest::Error) -> SdkError {
    SdkError::Network(e.to_string())
}

/// Hashing and random identifiers.
#[derive(Debug, Clone, Copy)]
pub struct CryptoModule;

impl CryptoModule {
    pub fn sha256_hex(&self, data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    pub fn random_uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
