//! Bundle directory creation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::BundleError;

/// Attempts made before giving up on directory creation.
pub const CREATE_ATTEMPTS: usize = 3;

/// Create `path` (and parents), optionally wiping an existing tree first.
///
/// `AlreadyExists` during creation is retried up to [`CREATE_ATTEMPTS`]
/// times to ride out concurrent creators; any other error returns at once.
pub fn ensure_directory(path: &Path, overwrite: bool) -> Result<PathBuf, BundleError> {
    if overwrite {
        match std::fs::remove_dir_all(path) {
            Ok(()) => debug!(path = %path.display(), "removed existing bundle directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(BundleError::io(path, e)),
        }
    }

    create_with_retry(path, CREATE_ATTEMPTS, |p| std::fs::create_dir_all(p))
}

fn create_with_retry<F>(path: &Path, attempts: usize, mut create: F) -> Result<PathBuf, BundleError>
where
    F: FnMut(&Path) -> std::io::Result<()>,
{
    for attempt in 1..=attempts {
        match create(path) {
            Ok(()) => return Ok(path.to_path_buf()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), attempt, "bundle directory creation raced");
            }
            Err(e) => return Err(BundleError::io(path, e)),
        }
    }
    Err(BundleError::DirectoryExhausted {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directory_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("abc").join("notebook");
        let created = ensure_directory(&target, false).unwrap();
        assert_eq!(created, target);
        assert!(target.is_dir());
    }

    #[test]
    fn test_ensure_directory_twice_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("race").join("nb");
        ensure_directory(&target, false).unwrap();
        ensure_directory(&target, false).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_ensure_directory_reuses_contents_without_overwrite() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("nb");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("keep.txt"), "x").unwrap();
        ensure_directory(&target, false).unwrap();
        assert!(target.join("keep.txt").exists());
    }

    #[test]
    fn test_ensure_directory_overwrite_clears_tree() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("nb");
        std::fs::create_dir_all(target.join("sub")).unwrap();
        std::fs::write(target.join("sub/stale.txt"), "x").unwrap();
        ensure_directory(&target, true).unwrap();
        assert!(target.is_dir());
        assert!(!target.join("sub").exists());
    }

    #[test]
    fn test_ensure_directory_overwrite_missing_is_fine() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("fresh");
        ensure_directory(&target, true).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_ensure_directory_under_a_file_fails_fast() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = ensure_directory(&blocker.join("nb"), false).unwrap_err();
        assert!(matches!(err, BundleError::Io { .. }));
    }

    #[test]
    fn test_retry_absorbs_transient_already_exists() {
        let mut calls = 0;
        let result = create_with_retry(Path::new("/x"), CREATE_ATTEMPTS, |_| {
            calls += 1;
            if calls < 2 {
                Err(std::io::Error::from(ErrorKind::AlreadyExists))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_gives_up_after_bound() {
        let mut calls = 0;
        let err = create_with_retry(Path::new("/x"), CREATE_ATTEMPTS, |_| {
            calls += 1;
            Err(std::io::Error::from(ErrorKind::AlreadyExists))
        })
        .unwrap_err();
        assert_eq!(calls, CREATE_ATTEMPTS);
        assert!(matches!(err, BundleError::DirectoryExhausted { .. }));
    }

    #[test]
    fn test_retry_does_not_retry_other_errors() {
        let mut calls = 0;
        let err = create_with_retry(Path::new("/x"), CREATE_ATTEMPTS, |_| {
            calls += 1;
            Err(std::io::Error::from(ErrorKind::PermissionDenied))
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, BundleError::Io { .. }));
    }
}
