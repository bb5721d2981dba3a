// Checkpoint snapshots of adapter versions

use std::path::Path;
use walkdir::WalkDir;

use crate::errors::AdapterError;

/// Labels become part of a directory name
pub(crate) fn validate_label(label: &str) -> Result<(), AdapterError> {
    let ok = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && label != "."
        && label != "..";

    if ok {
        Ok(())
    } else {
        Err(AdapterError::InvalidLabel(label.to_string()))
    }
}

/// Recursively copy `source` into the empty directory `dest`, marking every
/// copied file read-only
pub(crate) fn copy_tree(source: &Path, dest: &Path) -> Result<(), AdapterError> {
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| AdapterError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| AdapterError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
            let mut perms = std::fs::metadata(&target)?.permissions();
            perms.set_readonly(true);
            std::fs::set_permissions(&target, perms)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping non-regular file in checkpoint");
        }
    }

    Ok(())
}

/// Best-effort removal of a partial copy, including read-only files
pub(crate) fn remove_partial(dest: &Path) {
    for entry in WalkDir::new(dest).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(meta) = entry.metadata() {
                let mut perms = meta.permissions();
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = std::fs::set_permissions(entry.path(), perms);
            }
        }
    }
    if let Err(e) = std::fs::remove_dir_all(dest) {
        tracing::warn!(path = %dest.display(), error = %e, "Failed to clean up partial checkpoint");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_label_validation() {
        assert!(validate_label("before-deploy_2").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label("../escape").is_err());
        assert!(validate_label("a/b").is_err());
        assert!(validate_label("..").is_err());
    }

    #[test]
    fn test_copy_tree_is_read_only() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        std::fs::create_dir_all(source.join("adapter")).unwrap();
        std::fs::write(source.join("adapter").join("weights.bin"), b"w").unwrap();
        std::fs::write(source.join("adapter_meta.json"), b"{}").unwrap();

        let dest = dir.path().join("dest");
        std::fs::create_dir(&dest).unwrap();
        copy_tree(&source, &dest).unwrap();

        let copied = dest.join("adapter").join("weights.bin");
        assert_eq!(std::fs::read(&copied).unwrap(), b"w");
        assert!(std::fs::metadata(&copied).unwrap().permissions().readonly());

        remove_partial(&dest);
        assert!(!dest.exists());
    }
}
