//! Isolated state directory provider.
//!
//! The engine needs a filesystem root for caches and daemon coordination
//! during a run. A runner either receives a fixed directory from the caller
//! (validated on every use) or materializes one process-lifetime temporary
//! directory on first use. Temporary directories are never deleted by the
//! harness; cleanup belongs to the caller or the OS.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::ConfigError;

/// Distinguishes temporary directories created by different runner instances
/// within one process.
static NEXT_TEMP_DIR_ID: AtomicU64 = AtomicU64::new(0);

/// Supplies the state directory for a runner's engine runs.
#[derive(Debug)]
pub(crate) enum StateDirProvider {
    Fixed(PathBuf),
    Temporary(TempStateDir),
}

impl StateDirProvider {
    pub(crate) fn fixed(path: PathBuf) -> Self {
        Self::Fixed(path)
    }

    pub(crate) fn temporary() -> Self {
        Self::Temporary(TempStateDir::default())
    }

    pub(crate) fn dir(&self) -> Result<PathBuf, ConfigError> {
        match self {
            Self::Fixed(path) => prepare_fixed_dir(path),
            Self::Temporary(temp) => temp.dir(),
        }
    }
}

/// A caller-fixed path must already be a writable directory, or a
/// non-existent path that can be created. Nothing is retried.
fn prepare_fixed_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            if meta.permissions().readonly() {
                Err(ConfigError::StateDirNotWritable(path.to_path_buf()))
            } else {
                Ok(path.to_path_buf())
            }
        }
        Ok(_) => Err(ConfigError::StateDirNotADirectory(path.to_path_buf())),
        Err(_) => fs::create_dir_all(path)
            .map(|_| path.to_path_buf())
            .map_err(|source| ConfigError::StateDirCreate {
                path: path.to_path_buf(),
                source,
            }),
    }
}

/// Lazily created temporary state directory, memoized for the provider's
/// lifetime (first writer wins; later calls return the same path).
#[derive(Debug, Default)]
pub(crate) struct TempStateDir {
    created: Mutex<Option<PathBuf>>,
}

impl TempStateDir {
    fn dir(&self) -> Result<PathBuf, ConfigError> {
        let mut slot = self.created.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = slot.as_ref() {
            return Ok(path.clone());
        }

        let id = NEXT_TEMP_DIR_ID.fetch_add(1, Ordering::Relaxed);
        let path = env::temp_dir().join(format!("forgekit-state-{}-{}", process::id(), id));
        fs::create_dir_all(&path).map_err(|source| ConfigError::StateDirCreate {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "created temporary state directory");

        *slot = Some(path.clone());
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn temporary_dir_is_memoized() {
        let provider = StateDirProvider::temporary();
        let first = provider.dir().unwrap();
        let second = provider.dir().unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
        let _ = fs::remove_dir_all(first);
    }

    #[test]
    fn distinct_providers_get_distinct_dirs() {
        let a = StateDirProvider::temporary();
        let b = StateDirProvider::temporary();
        let dir_a = a.dir().unwrap();
        let dir_b = b.dir().unwrap();
        assert_ne!(dir_a, dir_b);
        let _ = fs::remove_dir_all(dir_a);
        let _ = fs::remove_dir_all(dir_b);
    }

    #[test]
    fn fixed_dir_is_created_when_missing() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("state/nested");
        let provider = StateDirProvider::fixed(target.clone());
        assert_eq!(provider.dir().unwrap(), target);
        assert!(target.is_dir());
    }

    #[test]
    fn fixed_path_to_regular_file_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("state");
        fs::write(&file, "not a directory").unwrap();

        let err = StateDirProvider::fixed(file.clone()).dir().unwrap_err();
        assert!(matches!(err, ConfigError::StateDirNotADirectory(path) if path == file));
    }

    #[cfg(unix)]
    #[test]
    fn fixed_readonly_dir_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("readonly");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

        let err = StateDirProvider::fixed(dir.clone()).dir().unwrap_err();
        // Restore so tempdir cleanup can remove it
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(err, ConfigError::StateDirNotWritable(path) if path == dir));
    }
}
