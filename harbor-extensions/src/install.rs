//! Filesystem side of install and uninstall.

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recursively copies `src` into `dest`, creating `dest` if needed.
pub(crate) fn copy_tree(src: &Path, dest: &Path) -> io::Result<usize> {
    let mut files = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            files += 1;
        } else {
            debug!("Skipping {:?} during install", entry.path());
        }
    }
    Ok(files)
}

/// Deletes an extension directory. Failures are logged, never raised.
pub(crate) fn remove_tree(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(path) {
        warn!("Failed to delete extension directory {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copies_nested_files() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("manifest.json"), "{}").unwrap();
        std::fs::create_dir_all(src.path().join("assets/icons")).unwrap();
        std::fs::write(src.path().join("assets/icons/a.svg"), "<svg/>").unwrap();

        let dest = TempDir::new().unwrap();
        let target = dest.path().join("ext");
        assert_eq!(copy_tree(src.path(), &target).unwrap(), 2);
        assert_eq!(std::fs::read_to_string(target.join("assets/icons/a.svg")).unwrap(), "<svg/>");
        assert!(target.join("manifest.json").is_file());
    }

    #[test]
    fn removing_missing_tree_is_quiet() {
        let dir = TempDir::new().unwrap();
        remove_tree(&dir.path().join("absent"));
        let present = dir.path().join("present");
        std::fs::create_dir_all(present.join("sub")).unwrap();
        remove_tree(&present);
        assert!(!present.exists());
    }
}
