//! Host interaction surface: working directory, cache directory, and the
//! file-write primitive every install goes through.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::OperationError;

#[derive(Clone, Debug)]
pub struct HostEnvironment {
    working_dir: PathBuf,
    cache_dir: PathBuf,
}

impl HostEnvironment {
    pub fn new(working_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self { working_dir: working_dir.into(), cache_dir: cache_dir.into() }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolve a manifest-relative destination under the working directory.
    /// Absolute paths and `..` traversal are rejected.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, OperationError> {
        let path = Path::new(relative);
        if relative.trim().is_empty() || path.is_absolute() {
            return Err(OperationError::destination_not_valid(relative));
        }
        for component in path.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(OperationError::destination_not_valid(relative));
                }
                _ => {}
            }
        }
        Ok(self.working_dir.join(path))
    }

    /// Write a destination file if absent. Returns Ok(false) untouched when
    /// the file already exists (idempotent install), Ok(true) when written.
    /// `produce` is only called when bytes are actually needed.
    pub fn write_file<F>(&self, relative: &str, produce: F) -> Result<bool, OperationError>
    where
        F: FnOnce() -> Result<Vec<u8>, OperationError>,
    {
        let dest = self.resolve(relative)?;
        if dest.is_file() {
            return Ok(false);
        }
        let bytes = produce()?;
        write_atomic(&dest, &bytes).map_err(|e| OperationError::write_failed(relative, &e))?;
        Ok(true)
    }

    /// Best-effort removal for uninstall. Ok(false) when nothing was there.
    pub fn remove_file(&self, relative: &str) -> Result<bool, OperationError> {
        let dest = self.resolve(relative)?;
        if !dest.exists() {
            return Ok(false);
        }
        fs::remove_file(&dest).map_err(|e| OperationError::write_failed(relative, &e.to_string()))?;
        Ok(true)
    }
}

static TMP_WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp-file-then-rename write: a concurrent reader never observes a partial
/// file, and the loser of a rename race succeeds by finding the file present.
/// Orphan temp cleanup is best-effort and never fails the operation.
pub(crate) fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let n = TMP_WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = dest
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| "invalid destination path".to_string())?;
    let tmp = dest.with_file_name(format!(".{}.tmp-{}-{}", file_name, std::process::id(), n));
    fs::write(&tmp, bytes).map_err(|e| e.to_string())?;
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        if !dest.is_file() {
            return Err(e.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn host(dir: &Path) -> HostEnvironment {
        HostEnvironment::new(dir, dir.join("cache"))
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(dir.path());
        assert!(host.resolve("lib/js/app.js").is_ok());
        for bad in ["../outside.js", "lib/../../outside.js", "/etc/passwd", ""] {
            let err = host.resolve(bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::DestinationNotValid, "{}", bad);
        }
    }

    #[test]
    fn test_write_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(dir.path());
        let wrote = host.write_file("lib/a.js", || Ok(b"one".to_vec())).unwrap();
        assert!(wrote);
        // Second write must not re-fetch: producer failing proves it was not called.
        let wrote = host
            .write_file("lib/a.js", || {
                Err(OperationError::download_failed("unused", "must not run"))
            })
            .unwrap();
        assert!(!wrote);
        assert_eq!(fs::read(dir.path().join("lib/a.js")).unwrap(), b"one");
    }

    #[test]
    fn test_write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("deep/nested/file.css");
        write_atomic(&dest, b"body{}").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"body{}");
        let leftovers: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_remove_file_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(dir.path());
        assert!(!host.remove_file("lib/none.js").unwrap());
    }
}
