//! Restore: bring the working directory in sync with the manifest. Unlike
//! validation, restore isolates faults per entry, so one broken library never
//! blocks the rest.

use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::error::{Failure, OperationError, OperationResult};
use crate::host::HostEnvironment;
use crate::logging::{LogLevel, Logger};
use crate::manifest::{LibraryInstallationState, Manifest};
use crate::providers::ProviderRegistry;
use crate::validator::{detect_conflicts, expand_entry};

pub struct Restorer {
    registry: Arc<ProviderRegistry>,
    host: Arc<HostEnvironment>,
    logger: Arc<dyn Logger>,
}

impl Restorer {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        host: Arc<HostEnvironment>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self { registry, host, logger }
    }

    /// Restore every manifest entry, one result per entry. Manifest-level
    /// failures (unparseable, unsupported version) yield a single result.
    pub fn restore(
        &self,
        manifest: Option<&Manifest>,
        token: &CancellationToken,
    ) -> Vec<OperationResult> {
        if token.is_cancelled() {
            return vec![OperationResult::cancelled(None)];
        }
        let Some(manifest) = manifest else {
            return vec![OperationResult::failed(
                None,
                vec![OperationError::manifest_malformed()],
            )];
        };
        if !manifest.is_supported_version() {
            return vec![OperationResult::failed(
                None,
                vec![OperationError::version_not_supported(&manifest.version)],
            )];
        }

        self.logger.log(
            &format!("Restoring {} libraries", manifest.libraries.len()),
            LogLevel::Status,
        );

        // Expand each entry on its own; a failure here settles that entry's
        // result without touching its neighbors.
        let mut expanded: Vec<(usize, LibraryInstallationState)> = Vec::new();
        let mut results: Vec<Option<OperationResult>> = Vec::new();
        for (idx, raw) in manifest.libraries.iter().enumerate() {
            if token.is_cancelled() {
                results.push(Some(OperationResult::cancelled(Some(raw.clone()))));
                continue;
            }
            let entry = raw.with_defaults(
                manifest.default_provider.as_deref(),
                manifest.default_destination.as_deref(),
            );
            let property_errors = entry.property_errors();
            if !property_errors.is_empty() {
                results.push(Some(OperationResult::failed(Some(entry), property_errors)));
                continue;
            }
            match expand_entry(&entry, &self.registry, token) {
                Ok(state) => {
                    expanded.push((idx, state));
                    results.push(None);
                }
                Err(failure) => {
                    results.push(Some(OperationResult::from_failure(Some(entry), failure)));
                }
            }
        }

        // Entries whose destination files collide fail as a group; the rest
        // still install.
        let states: Vec<LibraryInstallationState> =
            expanded.iter().map(|(_, s)| s.clone()).collect();
        for conflict in detect_conflicts(&states) {
            let error = OperationError::conflicting_libraries(&conflict.file, &conflict.libraries);
            for (idx, state) in &expanded {
                if conflict.libraries.contains(&state.library_id) {
                    match &mut results[*idx] {
                        Some(result) => result.errors.push(error.clone()),
                        slot => {
                            *slot = Some(OperationResult::failed(
                                Some(state.clone()),
                                vec![error.clone()],
                            ));
                        }
                    }
                }
            }
        }

        for (idx, state) in expanded {
            if results[idx].is_some() {
                continue;
            }
            if token.is_cancelled() {
                results[idx] = Some(OperationResult::cancelled(Some(state)));
                continue;
            }
            self.logger
                .log(&format!("Restoring \"{}\"", state.library_id), LogLevel::Info);
            let provider_id = state.provider_id.as_deref().unwrap_or("");
            let outcome = match self.registry.get(provider_id) {
                Some(provider) => provider.install(&state, token),
                None => Err(Failure::from(OperationError::provider_undefined(provider_id))),
            };
            results[idx] = Some(match outcome {
                Ok(()) => OperationResult::ok(Some(state)),
                Err(failure) => OperationResult::from_failure(Some(state), failure),
            });
        }

        let results: Vec<OperationResult> = results.into_iter().flatten().collect();
        let succeeded = results.iter().filter(|r| r.success).count();
        self.logger.log(
            &format!("Restored {} of {} libraries", succeeded, results.len()),
            LogLevel::TaskSummary,
        );
        results
    }

    /// Remove one library's installed files. The entry is expanded first so
    /// the file list matches what a restore would have written.
    pub fn uninstall(
        &self,
        manifest: &Manifest,
        library_id: &str,
        token: &CancellationToken,
    ) -> OperationResult {
        if token.is_cancelled() {
            return OperationResult::cancelled(None);
        }
        let Some(raw) = manifest.find(library_id) else {
            return OperationResult::failed(
                None,
                vec![OperationError::invalid_library(library_id, "manifest")],
            );
        };
        let entry = raw.with_defaults(
            manifest.default_provider.as_deref(),
            manifest.default_destination.as_deref(),
        );
        let state = match expand_entry(&entry, &self.registry, token) {
            Ok(state) => state,
            Err(failure) => return OperationResult::from_failure(Some(entry), failure),
        };
        let Some(dest) = state.destination_path.as_deref() else {
            return OperationResult::failed(
                Some(state.clone()),
                vec![OperationError::destination_undefined(library_id)],
            );
        };
        let dest = dest.trim_end_matches(['/', '\\']).to_string();
        for file in state.files.as_deref().unwrap_or(&[]) {
            let relative = format!("{}/{}", dest, file);
            if let Err(error) = self.host.remove_file(&relative) {
                return OperationResult::failed(Some(state), vec![error]);
            }
        }
        self.logger
            .log(&format!("Uninstalled \"{}\"", library_id), LogLevel::Info);
        OperationResult::ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::error::ErrorCode;
    use crate::logging::NullLogger;
    use std::fs;
    use std::path::Path;

    fn restorer(dir: &Path) -> Restorer {
        let host = Arc::new(HostEnvironment::new(dir, dir.join("cache")));
        let cache = Arc::new(Cache::new(dir.join("cache")));
        let registry = Arc::new(ProviderRegistry::with_default_providers(cache, host.clone()));
        Restorer::new(registry, host, Arc::new(NullLogger))
    }

    fn fs_entry(id: &str, dest: &str) -> LibraryInstallationState {
        LibraryInstallationState {
            library_id: id.to_string(),
            provider_id: Some("filesystem".to_string()),
            destination_path: Some(dest.to_string()),
            files: None,
        }
    }

    #[test]
    fn test_restore_installs_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src-lib")).unwrap();
        fs::write(dir.path().join("src-lib/a.js"), b"content").unwrap();

        let restorer = restorer(dir.path());
        let mut manifest = Manifest::default();
        manifest.libraries.push(fs_entry("src-lib", "wwwroot/lib"));

        let token = CancellationToken::new();
        let results = restorer.restore(Some(&manifest), &token);
        assert_eq!(results.len(), 1);
        assert!(results[0].success, "{:?}", results[0].errors);
        let installed = dir.path().join("wwwroot/lib/a.js");
        assert_eq!(fs::read(&installed).unwrap(), b"content");

        // A second restore leaves the file as it is.
        fs::write(&installed, b"edited").unwrap();
        let results = restorer.restore(Some(&manifest), &token);
        assert!(results[0].success);
        assert_eq!(fs::read(&installed).unwrap(), b"edited");
    }

    #[test]
    fn test_restore_isolates_entry_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("good-lib")).unwrap();
        fs::write(dir.path().join("good-lib/ok.js"), b"ok").unwrap();

        let restorer = restorer(dir.path());
        let mut manifest = Manifest::default();
        manifest.libraries.push(fs_entry("good-lib", "out/a"));
        let mut broken = fs_entry("good-lib", "out/b");
        broken.provider_id = Some("no-such-provider".to_string());
        manifest.libraries.push(broken);
        manifest.libraries.push(fs_entry("missing-lib", "out/c"));

        let results = restorer.restore(Some(&manifest), &CancellationToken::new());
        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(results[1].has_code(ErrorCode::ProviderIsUndefined));
        assert!(results[2].has_code(ErrorCode::InvalidLibrary));
        assert!(dir.path().join("out/a/ok.js").is_file());
    }

    #[test]
    fn test_restore_fails_conflicting_entries_as_group() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib-one")).unwrap();
        fs::create_dir_all(dir.path().join("lib-two")).unwrap();
        fs::write(dir.path().join("lib-one/shared.js"), b"one").unwrap();
        fs::write(dir.path().join("lib-two/shared.js"), b"two").unwrap();

        let restorer = restorer(dir.path());
        let mut manifest = Manifest::default();
        manifest.libraries.push(fs_entry("lib-one", "out"));
        manifest.libraries.push(fs_entry("lib-two", "out"));

        let results = restorer.restore(Some(&manifest), &CancellationToken::new());
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(result.has_code(ErrorCode::ConflictingLibrariesInManifest));
        }
        assert!(!dir.path().join("out/shared.js").exists());
    }

    #[test]
    fn test_restore_manifest_level_failures() {
        let dir = tempfile::tempdir().unwrap();
        let restorer = restorer(dir.path());
        let token = CancellationToken::new();

        let results = restorer.restore(None, &token);
        assert_eq!(results.len(), 1);
        assert!(results[0].has_code(ErrorCode::ManifestMalformed));

        let mut manifest = Manifest::default();
        manifest.version = "0.9".to_string();
        let results = restorer.restore(Some(&manifest), &token);
        assert_eq!(results.len(), 1);
        assert!(results[0].has_code(ErrorCode::VersionIsNotSupported));

        token.cancel();
        let results = restorer.restore(Some(&Manifest::default()), &token);
        assert_eq!(results.len(), 1);
        assert!(results[0].cancelled);
    }

    #[test]
    fn test_uninstall_removes_installed_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src-lib")).unwrap();
        fs::write(dir.path().join("src-lib/a.js"), b"x").unwrap();

        let restorer = restorer(dir.path());
        let mut manifest = Manifest::default();
        manifest.libraries.push(fs_entry("src-lib", "wwwroot/lib"));
        let token = CancellationToken::new();
        restorer.restore(Some(&manifest), &token);
        assert!(dir.path().join("wwwroot/lib/a.js").is_file());

        let result = restorer.uninstall(&manifest, "src-lib", &token);
        assert!(result.success);
        assert!(!dir.path().join("wwwroot/lib/a.js").exists());

        let missing = restorer.uninstall(&manifest, "not-in-manifest", &token);
        assert!(missing.has_code(ErrorCode::InvalidLibrary));
    }
}
