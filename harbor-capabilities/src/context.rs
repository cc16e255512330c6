use crate::error::{CapabilityError, Result};
use harbor_types::{Permission, PermissionSet};
use std::path::PathBuf;

/// Identity of the extension on whose behalf a capability call runs.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub extension_id: String,
    pub extension_path: PathBuf,
    pub permissions: PermissionSet,
}

impl CallContext {
    pub fn new(extension_id: impl Into<String>, extension_path: impl Into<PathBuf>, permissions: PermissionSet) -> Self {
        Self {
            extension_id: extension_id.into(),
            extension_path: extension_path.into(),
            permissions,
        }
    }

    /// Fails with `PermissionDenied` unless `permission` is granted.
    pub fn require(&self, permission: Permission) -> Result<()> {
        if self.permissions.is_granted(permission) {
            Ok(())
        } else {
            Err(CapabilityError::PermissionDenied {
                extension_id: self.extension_id.clone(),
                permission: permission.name().to_string(),
            })
        }
    }
}
