//! On-disk cache: cacheRoot/<providerId>/<libraryName>/<version>/<files...>.
//! Versioned entries are immutable once written (content keyed by exact
//! version); catalog metadata documents expire after a TTL.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::error::OperationError;
use crate::host::write_atomic;

pub struct Cache {
    root: PathBuf,
}

/// One cached (library, version) pair, for diagnostic listing.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedLibrary {
    pub name: String,
    pub version: String,
    pub files: Vec<String>,
}

/// Expected identity of a file for the freshness check.
#[derive(Clone, Debug)]
pub struct ExpectedFile {
    pub name: String,
    pub size: u64,
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn provider_dir(&self, provider_id: &str) -> PathBuf {
        self.root.join(provider_id)
    }

    /// Scoped names keep their '/' and become nested directories.
    fn library_dir(&self, provider_id: &str, name: &str, version: &str) -> PathBuf {
        let mut dir = self.provider_dir(provider_id);
        for segment in name.split('/').filter(|s| !s.is_empty()) {
            dir = dir.join(segment);
        }
        if !version.is_empty() {
            dir = dir.join(version);
        }
        dir
    }

    fn metadata_path(&self, provider_id: &str, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.provider_dir(provider_id)
            .join("metadata")
            .join(format!("{:x}.json", hasher.finalize()))
    }

    /// Fetch-through for an immutable versioned asset: presence == fresh.
    /// On miss, `fetch` supplies the bytes, persisted via temp-then-rename
    /// before the path is returned. A failed fetch leaves any previous entry
    /// untouched.
    pub fn get_or_fetch_file<F>(
        &self,
        provider_id: &str,
        name: &str,
        version: &str,
        relative_path: &str,
        fetch: F,
    ) -> Result<PathBuf, OperationError>
    where
        F: FnOnce() -> Result<Vec<u8>, OperationError>,
    {
        let mut path = self.library_dir(provider_id, name, version);
        for segment in relative_path.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path = path.join(segment);
        }
        if path.is_file() {
            return Ok(path);
        }
        let bytes = fetch()?;
        write_atomic(&path, &bytes).map_err(|e| OperationError::cache_failure(&e))?;
        Ok(path)
    }

    /// Fetch-through for a metadata document keyed by an arbitrary string
    /// (usually the upstream URL). Refetched once older than the TTL; when the
    /// refetch fails, a stale-but-parseable copy still wins over no data.
    pub fn get_or_fetch_metadata<F>(
        &self,
        provider_id: &str,
        key: &str,
        fetch: F,
    ) -> Result<Vec<u8>, OperationError>
    where
        F: FnOnce() -> Result<Vec<u8>, OperationError>,
    {
        let path = self.metadata_path(provider_id, key);
        if metadata_is_fresh(&path) {
            if let Ok(bytes) = fs::read(&path) {
                if serde_json::from_slice::<serde_json::Value>(&bytes).is_ok() {
                    return Ok(bytes);
                }
            }
        }
        match fetch() {
            Ok(bytes) => {
                let _ = write_atomic(&path, &bytes);
                Ok(bytes)
            }
            Err(e) => {
                if let Ok(bytes) = fs::read(&path) {
                    if serde_json::from_slice::<serde_json::Value>(&bytes).is_ok() {
                        return Ok(bytes);
                    }
                }
                Err(e)
            }
        }
    }

    /// Freshness check: same name case-insensitively, same size, write time
    /// not older than the reference. Any mismatch means stale.
    pub fn are_files_up_to_date(
        dir: &Path,
        expected: &[ExpectedFile],
        reference: SystemTime,
    ) -> bool {
        for exp in expected {
            let Some(actual) = find_file_case_insensitive(dir, &exp.name) else {
                return false;
            };
            let Ok(meta) = fs::metadata(&actual) else {
                return false;
            };
            if meta.len() != exp.size {
                return false;
            }
            match meta.modified() {
                Ok(modified) if modified >= reference => {}
                _ => return false,
            }
        }
        true
    }

    /// Diagnostic listing of everything cached for a provider. Read-only;
    /// sorted by name then version for stable output.
    pub fn list_cached_libraries(&self, provider_id: &str) -> Vec<CachedLibrary> {
        let mut out = Vec::new();
        let provider_dir = self.provider_dir(provider_id);
        for (name, library_dir) in list_library_dirs(&provider_dir) {
            let Ok(versions) = fs::read_dir(&library_dir) else {
                continue;
            };
            for version_entry in versions.flatten() {
                let version_dir = version_entry.path();
                if !version_dir.is_dir() {
                    continue;
                }
                let version = version_entry.file_name().to_string_lossy().to_string();
                let mut files = Vec::new();
                collect_files(&version_dir, &version_dir, &mut files);
                files.sort();
                out.push(CachedLibrary { name: name.clone(), version, files });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| b.version.cmp(&a.version)));
        out
    }

    /// Remove the whole cache tree.
    pub fn clean(&self) -> Result<(), String> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

fn metadata_is_fresh(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    let modified: DateTime<Utc> = modified.into();
    Utc::now() - modified < Duration::hours(crate::config::metadata_ttl_hours())
}

fn find_file_case_insensitive(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return Some(entry.path());
        }
    }
    None
}

/// Library dirs directly under a provider dir. A '@scope' dir holds one more
/// level of library names; "metadata" is the provider's document store.
fn list_library_dirs(provider_dir: &Path) -> Vec<(String, PathBuf)> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(provider_dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "metadata" {
            continue;
        }
        if name.starts_with('@') {
            if let Ok(scoped) = fs::read_dir(&path) {
                for sub in scoped.flatten() {
                    if sub.path().is_dir() {
                        let sub_name = sub.file_name().to_string_lossy().to_string();
                        out.push((format!("{}/{}", name, sub_name), sub.path()));
                    }
                }
            }
        } else {
            out.push((name, path));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, out);
        } else if let Ok(rel) = path.strip_prefix(base) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
}
