//! Capability-based permission model for sandboxed extensions.
//!
//! Permissions are declared in the manifest and gate which host modules the
//! sandbox resolver hands to plugin code:
//! - `filesystem-read` / `filesystem-write`: the `fs` module (and `files.readFile`)
//! - `network`: the `net` module
//! - `cryptography`: the `crypto` module
//!
//! Platform utilities and the small utility-package allowlist need no grant.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Individual permission an extension may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    FilesystemRead,
    FilesystemWrite,
    Network,
    Cryptography,
}

impl Permission {
    /// All known permissions.
    pub const ALL: [Permission; 4] = [
        Permission::FilesystemRead,
        Permission::FilesystemWrite,
        Permission::Network,
        Permission::Cryptography,
    ];

    /// Returns the manifest spelling of this permission.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FilesystemRead => "filesystem-read",
            Self::FilesystemWrite => "filesystem-write",
            Self::Network => "network",
            Self::Cryptography => "cryptography",
        }
    }

    /// Returns the sandbox module family this permission unlocks.
    pub fn module(&self) -> &'static str {
        match self {
            Self::FilesystemRead | Self::FilesystemWrite => "fs",
            Self::Network => "net",
            Self::Cryptography => "crypto",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown permission '{s}'"))
    }
}

/// Set of permissions granted to an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    granted: HashSet<Permission>,
}

impl PermissionSet {
    /// Creates an empty set (platform utilities only).
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a set with all permissions granted (for testing).
    pub fn all_granted() -> Self {
        Self {
            granted: Permission::ALL.into_iter().collect(),
        }
    }

    /// Builds a set from manifest permission strings.
    /// Unknown names are logged and ignored so that a typo never widens access.
    pub fn from_declared<S: AsRef<str>>(declared: &[S]) -> Self {
        let mut granted = HashSet::new();
        for name in declared {
            match name.as_ref().parse::<Permission>() {
                Ok(permission) => {
                    granted.insert(permission);
                }
                Err(e) => warn!("ignoring manifest permission: {}", e),
            }
        }
        Self { granted }
    }

    pub fn is_granted(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }

    /// True if either filesystem permission is held.
    pub fn has_filesystem(&self) -> bool {
        self.is_granted(Permission::FilesystemRead) || self.is_granted(Permission::FilesystemWrite)
    }

    pub fn grant(&mut self, permission: Permission) {
        self.granted.insert(permission);
    }

    pub fn revoke(&mut self, permission: Permission) {
        self.granted.remove(&permission);
    }

    /// Returns all granted permissions.
    pub fn granted_permissions(&self) -> &HashSet<Permission> {
        &self.granted
    }

    /// Returns the granted permission names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.granted.iter().map(Permission::name).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_grants_nothing() {
        let perms = PermissionSet::none();
        for permission in Permission::ALL {
            assert!(!perms.is_granted(permission));
        }
        assert!(!perms.has_filesystem());
    }

    #[test]
    fn from_declared_parses_known_names() {
        let perms = PermissionSet::from_declared(&["filesystem-read", "network"]);
        assert!(perms.is_granted(Permission::FilesystemRead));
        assert!(perms.is_granted(Permission::Network));
        assert!(!perms.is_granted(Permission::FilesystemWrite));
        assert!(!perms.is_granted(Permission::Cryptography));
        assert!(perms.has_filesystem());
    }

    #[test]
    fn from_declared_ignores_unknown_names() {
        let perms = PermissionSet::from_declared(&["vault", "cryptography", "root"]);
        assert_eq!(perms.names(), vec!["cryptography"]);
    }

    #[test]
    fn grant_and_revoke() {
        let mut perms = PermissionSet::none();
        perms.grant(Permission::FilesystemWrite);
        assert!(perms.has_filesystem());

        perms.revoke(Permission::FilesystemWrite);
        assert!(!perms.has_filesystem());
    }

    #[test]
    fn all_granted_has_everything() {
        let perms = PermissionSet::all_granted();
        assert_eq!(perms.granted_permissions().len(), 4);
    }

    #[test]
    fn name_roundtrips_through_from_str() {
        for permission in Permission::ALL {
            assert_eq!(permission.name().parse::<Permission>(), Ok(permission));
        }
    }

    #[test]
    fn module_families() {
        assert_eq!(Permission::FilesystemRead.module(), "fs");
        assert_eq!(Permission::FilesystemWrite.module(), "fs");
        assert_eq!(Permission::Network.module(), "net");
        assert_eq!(Permission::Cryptography.module(), "crypto");
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&Permission::FilesystemRead).unwrap();
        assert_eq!(json, "\"filesystem-read\"");
    }
}
