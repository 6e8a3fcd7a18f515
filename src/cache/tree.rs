//! Cache directory bootstrap and eviction
//!
//! Nothing here takes entry locks. Evicting a subtree while entries under
//! it are being written is the caller's problem.

use crate::error::{CacheError, CacheResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Create `path` and any missing parents.
///
/// Succeeds if the directory already exists; fails if some component is
/// not a directory.
pub fn create_tree(path: impl AsRef<Path>) -> CacheResult<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).map_err(|e| CacheError::io("creating directory", path, e))?;
    Ok(())
}

/// Delete `path` and everything under it.
///
/// Files go first, then directories deepest first so each is empty when
/// removed. Stops at the first failure; whatever was already deleted stays
/// deleted. Symlinks are removed, never followed.
pub fn remove_tree(path: impl AsRef<Path>) -> CacheResult<()> {
    let root = path.as_ref();
    let mut files: Vec<PathBuf> = Vec::new();
    let mut dirs: Vec<(usize, PathBuf)> = Vec::new();

    for entry in WalkDir::new(root).follow_root_links(false) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_dir() {
            dirs.push((entry.depth(), entry.into_path()));
        } else {
            files.push(entry.into_path());
        }
    }

    for file in &files {
        fs::remove_file(file).map_err(|e| CacheError::io("removing file", file, e))?;
    }

    dirs.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, dir) in &dirs {
        fs::remove_dir(dir).map_err(|e| CacheError::io("removing directory", dir, e))?;
    }

    debug!(
        path = %root.display(),
        files = files.len(),
        dirs = dirs.len(),
        "Removed cache tree"
    );
    Ok(())
}

fn walk_error(root: &Path, err: walkdir::Error) -> CacheError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(source) => CacheError::io("walking", &path, source),
        None => CacheError::Internal(format!("filesystem loop under {}", path.display())),
    }
}

/// Whether anything exists at `path`
pub fn exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

/// Size in bytes of the file at `path`
pub fn file_size(path: impl AsRef<Path>) -> CacheResult<u64> {
    let path = path.as_ref();
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|e| CacheError::io("reading metadata of", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_then_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("c");

        create_tree(&path).unwrap();
        assert!(exists(&path));
        assert!(path.is_dir());

        // Already there is fine
        create_tree(&path).unwrap();
    }

    #[test]
    fn create_through_file_fails() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();

        assert!(create_tree(file.join("sub")).is_err());
        assert!(create_tree(&file).is_err());
    }

    #[test]
    fn remove_tree_deletes_everything() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        for sub in ["k1", "k1/deep/deeper", "k2", "empty"] {
            create_tree(root.join(sub)).unwrap();
        }
        for file in ["k1/entry", "k1/entry.done", "k1/deep/deeper/x", "k2/y", "top"] {
            fs::write(root.join(file), b"data").unwrap();
        }

        remove_tree(&root).unwrap();

        assert!(!exists(&root));
        assert!(exists(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn remove_tree_does_not_follow_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("outside");
        create_tree(&outside).unwrap();
        fs::write(outside.join("keep"), b"precious").unwrap();

        let root = dir.path().join("cache");
        create_tree(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        remove_tree(&root).unwrap();

        assert!(!exists(&root));
        assert_eq!(fs::read(outside.join("keep")).unwrap(), b"precious");
    }

    #[cfg(unix)]
    #[test]
    fn remove_tree_on_symlinked_root_removes_only_the_link() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        create_tree(target.join("sub")).unwrap();
        fs::write(target.join("sub").join("keep"), b"precious").unwrap();

        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        remove_tree(&link).unwrap();

        assert!(fs::symlink_metadata(&link).is_err());
        assert_eq!(fs::read(target.join("sub").join("keep")).unwrap(), b"precious");
    }

    #[test]
    fn remove_missing_tree_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = remove_tree(dir.path().join("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn remove_tree_stops_at_first_error() {
        use std::os::unix::fs::PermissionsExt;

        // Root ignores directory permissions
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let locked = root.join("locked");
        create_tree(&locked).unwrap();
        fs::write(locked.join("pinned"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

        let err = remove_tree(&root).unwrap_err();
        assert!(matches!(err, CacheError::PermissionDenied(_)));
        assert!(exists(locked.join("pinned")));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
    }

    #[test]
    fn file_size_reports_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry");
        fs::write(&path, b"12345").unwrap();

        assert_eq!(file_size(&path).unwrap(), 5);
        assert!(file_size(dir.path().join("absent")).unwrap_err().is_not_found());
    }
}
