//! Filesystem provider: a library id is a local path, absolute or relative to
//! the working directory. No versions, no network, no cache involvement.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::catalog::{Catalog, CompletionSet, LibraryFile, LibraryGroup, ResolvedLibrary};
use crate::error::{Failure, OperationError};
use crate::host::HostEnvironment;
use crate::manifest::LibraryInstallationState;
use crate::naming::{NamingScheme, PathNamingScheme};
use crate::providers::{install_files, Provider};

pub const FILESYSTEM_PROVIDER_ID: &str = "filesystem";

pub struct FileSystemCatalog {
    host: Arc<HostEnvironment>,
}

impl FileSystemCatalog {
    /// Relative ids are anchored at the working directory, never the process
    /// cwd.
    fn source_path(&self, id: &str) -> PathBuf {
        let path = Path::new(id);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.host.working_dir().join(path)
        }
    }

    /// File list for a source path: a file is itself, a directory is its
    /// recursive contents with forward-slash relative paths, sorted.
    fn list_files(&self, id: &str) -> Result<Vec<String>, OperationError> {
        let source = self.source_path(id);
        if source.is_file() {
            let name = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| OperationError::invalid_library(id, FILESYSTEM_PROVIDER_ID))?;
            return Ok(vec![name.to_string()]);
        }
        if source.is_dir() {
            let mut files = Vec::new();
            collect_relative(&source, Path::new(""), &mut files)
                .map_err(|_| OperationError::invalid_library(id, FILESYSTEM_PROVIDER_ID))?;
            files.sort();
            return Ok(files);
        }
        Err(OperationError::invalid_library(id, FILESYSTEM_PROVIDER_ID))
    }
}

fn collect_relative(root: &Path, prefix: &Path, out: &mut Vec<String>) -> Result<(), String> {
    let entries = fs::read_dir(root.join(prefix)).map_err(|e| e.to_string())?;
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let name = entry.file_name();
        let relative = prefix.join(&name);
        if entry.path().is_dir() {
            collect_relative(root, &relative, out)?;
        } else {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

impl Catalog for FileSystemCatalog {
    /// Search probes the term as a path: one hit when it exists, none
    /// otherwise. Never an error.
    fn search(
        &self,
        term: &str,
        _max_hits: usize,
        token: &CancellationToken,
    ) -> Result<Vec<LibraryGroup>, Failure> {
        if token.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        if term.trim().is_empty() || !self.source_path(term).exists() {
            return Ok(Vec::new());
        }
        Ok(vec![LibraryGroup {
            display_name: term.to_string(),
            description: None,
            versions: vec![String::new()],
        }])
    }

    fn get_library(
        &self,
        name: &str,
        _version: &str,
        token: &CancellationToken,
    ) -> Result<ResolvedLibrary, Failure> {
        if token.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        let files = self
            .list_files(name)?
            .into_iter()
            .map(|path| LibraryFile { path, default: false })
            .collect();
        Ok(ResolvedLibrary {
            name: name.to_string(),
            version: String::new(),
            provider_id: FILESYSTEM_PROVIDER_ID.to_string(),
            files,
        })
    }

    /// Paths carry no version history.
    fn get_latest_version(
        &self,
        _name: &str,
        _include_prerelease: bool,
        _token: &CancellationToken,
    ) -> Result<Option<String>, Failure> {
        Ok(None)
    }

    fn get_completion_set(
        &self,
        partial_library_id: &str,
        _caret_position: usize,
        _token: &CancellationToken,
    ) -> Result<CompletionSet, Failure> {
        Ok(CompletionSet {
            start: 0,
            length: partial_library_id.len(),
            completions: Vec::new(),
        })
    }
}

pub struct FileSystemProvider {
    catalog: FileSystemCatalog,
    host: Arc<HostEnvironment>,
    scheme: PathNamingScheme,
}

impl FileSystemProvider {
    pub fn new(host: Arc<HostEnvironment>) -> Self {
        Self {
            catalog: FileSystemCatalog { host: host.clone() },
            host,
            scheme: PathNamingScheme,
        }
    }
}

impl Provider for FileSystemProvider {
    fn id(&self) -> &'static str {
        FILESYSTEM_PROVIDER_ID
    }

    fn catalog(&self) -> &dyn Catalog {
        &self.catalog
    }

    fn naming_scheme(&self) -> &dyn NamingScheme {
        &self.scheme
    }

    fn install(
        &self,
        state: &LibraryInstallationState,
        token: &CancellationToken,
    ) -> Result<(), Failure> {
        let source = self.catalog.source_path(&state.library_id);
        let source_is_file = source.is_file();
        install_files(state, &self.host, token, |file| {
            let from = if source_is_file { source.clone() } else { source.join(file) };
            fs::read(&from).map_err(|e| {
                OperationError::download_failed(&from.to_string_lossy(), &e.to_string())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn provider(dir: &Path) -> FileSystemProvider {
        FileSystemProvider::new(Arc::new(HostEnvironment::new(dir, dir.join("cache"))))
    }

    fn state(id: &str, dest: &str) -> LibraryInstallationState {
        LibraryInstallationState {
            library_id: id.to_string(),
            provider_id: Some(FILESYSTEM_PROVIDER_ID.to_string()),
            destination_path: Some(dest.to_string()),
            files: None,
        }
    }

    #[test]
    fn test_directory_id_lists_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vendor/lib/css")).unwrap();
        fs::write(dir.path().join("vendor/lib/app.js"), b"js").unwrap();
        fs::write(dir.path().join("vendor/lib/css/app.css"), b"css").unwrap();

        let provider = provider(dir.path());
        let token = CancellationToken::new();
        let resolved = provider.catalog().get_library("vendor/lib", "", &token).unwrap();
        assert_eq!(resolved.file_names(), vec!["app.js", "css/app.css"]);
    }

    #[test]
    fn test_file_id_is_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("local.js"), b"x").unwrap();

        let provider = provider(dir.path());
        let token = CancellationToken::new();
        let resolved = provider.catalog().get_library("local.js", "", &token).unwrap();
        assert_eq!(resolved.file_names(), vec!["local.js"]);
    }

    #[test]
    fn test_missing_path_is_invalid_library() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let token = CancellationToken::new();
        match provider.catalog().get_library("no/such/path", "", &token) {
            Err(Failure::Errors(errors)) => {
                assert_eq!(errors[0].code, ErrorCode::InvalidLibrary);
            }
            other => panic!("expected InvalidLibrary, got {:?}", other.map(|_| ())),
        }
        assert!(provider.catalog().search("no/such/path", 10, &token).unwrap().is_empty());
    }

    #[test]
    fn test_install_copies_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src-lib")).unwrap();
        fs::write(dir.path().join("src-lib/a.js"), b"original").unwrap();

        let provider = provider(dir.path());
        let token = CancellationToken::new();
        let expanded = provider.update_state(&state("src-lib", "wwwroot/lib"), &token).unwrap();
        provider.install(&expanded, &token).unwrap();
        let installed = dir.path().join("wwwroot/lib/a.js");
        assert_eq!(fs::read(&installed).unwrap(), b"original");

        // Re-install leaves existing output untouched.
        fs::write(&installed, b"edited").unwrap();
        provider.install(&expanded, &token).unwrap();
        assert_eq!(fs::read(&installed).unwrap(), b"edited");
    }

    #[test]
    fn test_install_without_destination_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.js"), b"x").unwrap();
        let provider = provider(dir.path());
        let token = CancellationToken::new();
        let mut entry = state("x.js", "lib");
        entry.destination_path = None;
        entry.files = Some(vec!["x.js".to_string()]);
        match provider.install(&entry, &token) {
            Err(Failure::Errors(errors)) => {
                assert_eq!(errors[0].code, ErrorCode::DestinationUndefined);
            }
            other => panic!("expected DestinationUndefined, got {:?}", other),
        }
    }
}
