// Active-adapter pointer
//
// A single symbolic link. Swaps go through a temporary link in the same
// directory followed by rename(2), so readers see either the old or the new
// target and never a missing or half-written link.

use std::io;
use std::path::{Path, PathBuf};

use crate::errors::AdapterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PointerState {
    Missing,
    Symlink,
    /// Something other than a symlink occupies the pointer path
    Foreign,
}

pub(crate) fn inspect(link: &Path) -> Result<PointerState, AdapterError> {
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => Ok(PointerState::Symlink),
        Ok(_) => Ok(PointerState::Foreign),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PointerState::Missing),
        Err(e) => Err(AdapterError::Io(e)),
    }
}

/// Resolve the pointer to the directory it names, if any
pub(crate) fn resolve(link: &Path) -> Result<Option<PathBuf>, AdapterError> {
    if inspect(link)? != PointerState::Symlink {
        return Ok(None);
    }

    let target = std::fs::read_link(link)?;
    let target = if target.is_relative() {
        link.parent().unwrap_or_else(|| Path::new(".")).join(target)
    } else {
        target
    };

    match target.canonicalize() {
        Ok(path) => Ok(Some(path)),
        // Dangling pointer
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AdapterError::Io(e)),
    }
}

/// Point `link` at `target`. The caller holds the activation lock.
pub(crate) fn swap(link: &Path, target: &Path) -> Result<(), AdapterError> {
    let parent = link.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent).map_err(AdapterError::ActivationFailed)?;
    }

    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AdapterError::ActivationRefused(format!("pointer path {} has no file name", link.display())))?;
    let temp = link.with_file_name(format!(".{}.swap-{}", name, std::process::id()));

    // Leftover from a crashed swap
    if inspect(&temp)? != PointerState::Missing {
        std::fs::remove_file(&temp).map_err(AdapterError::ActivationFailed)?;
    }

    symlink_dir(target, &temp).map_err(AdapterError::ActivationFailed)?;

    if let Err(e) = std::fs::rename(&temp, link) {
        let _ = std::fs::remove_file(&temp);
        return Err(AdapterError::ActivationFailed(e));
    }

    Ok(())
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_swap_replaces_existing_link() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();
        let link = dir.path().join("current");

        swap(&link, &a).unwrap();
        assert_eq!(resolve(&link).unwrap(), Some(a.canonicalize().unwrap()));

        swap(&link, &b).unwrap();
        assert_eq!(resolve(&link).unwrap(), Some(b.canonicalize().unwrap()));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".swap-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_inspect_states() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("current");
        assert_eq!(inspect(&link).unwrap(), PointerState::Missing);

        std::fs::create_dir(&link).unwrap();
        assert_eq!(inspect(&link).unwrap(), PointerState::Foreign);
    }

    #[test]
    fn test_dangling_pointer_resolves_to_none() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("current");
        std::os::unix::fs::symlink(dir.path().join("gone"), &link).unwrap();
        assert_eq!(resolve(&link).unwrap(), None);
    }
}
