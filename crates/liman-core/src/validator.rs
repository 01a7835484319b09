//! Manifest validation: a fail-fast pipeline over property checks, catalog
//! expansion, and destination-conflict detection.

use std::collections::HashMap;

use crate::cancellation::CancellationToken;
use crate::error::{Failure, OperationError, OperationResult};
use crate::manifest::{LibraryInstallationState, Manifest};
use crate::providers::ProviderRegistry;

/// Two or more manifest entries writing the same destination file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileConflict {
    pub file: String,
    pub libraries: Vec<String>,
}

/// Canonical form of a destination file path for conflict comparison:
/// forward slashes, no repeated or trailing separators. Case folds only on
/// platforms whose filesystems compare paths case-insensitively; elsewhere
/// `Lib/app.js` and `lib/app.js` are distinct files.
pub fn normalize_destination(path: &str) -> String {
    let normalized = path
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if cfg!(windows) {
        normalized.to_lowercase()
    } else {
        normalized
    }
}

/// Map every expanded entry's destination files to the entries claiming them.
/// Conflicts come back in first-seen order; every colliding file is reported,
/// not just the first.
pub fn detect_conflicts(states: &[LibraryInstallationState]) -> Vec<FileConflict> {
    let mut claims: HashMap<String, Vec<String>> = HashMap::new();
    let mut order: Vec<(String, String)> = Vec::new();
    for state in states {
        let Some(dest) = state.destination_path.as_deref() else {
            continue;
        };
        for file in state.files.as_deref().unwrap_or(&[]) {
            let display = format!("{}/{}", dest.trim_end_matches(['/', '\\']), file);
            let key = normalize_destination(&display);
            if !claims.contains_key(&key) {
                order.push((key.clone(), display));
            }
            claims.entry(key).or_default().push(state.library_id.clone());
        }
    }
    order
        .into_iter()
        .filter_map(|(key, display)| {
            let libraries = claims.remove(&key)?;
            if libraries.len() > 1 {
                Some(FileConflict { file: display, libraries })
            } else {
                None
            }
        })
        .collect()
}

/// Resolve an entry's provider and expand it against the catalog. The entry
/// must already carry manifest defaults.
pub fn expand_entry(
    state: &LibraryInstallationState,
    registry: &ProviderRegistry,
    token: &CancellationToken,
) -> Result<LibraryInstallationState, Failure> {
    let provider_id = state.provider_id.as_deref().unwrap_or("");
    let provider = registry
        .get(provider_id)
        .ok_or_else(|| OperationError::provider_undefined(provider_id))?;
    provider.update_state(state, token)
}

pub struct Validator<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Validate a loaded manifest end to end. The pipeline stops at the first
    /// stage that produced failures, so catalog lookups never run for a
    /// manifest that is structurally broken.
    pub fn validate_manifest(
        &self,
        manifest: Option<&Manifest>,
        token: &CancellationToken,
    ) -> Vec<OperationResult> {
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
        if token.is_cancelled() {
            return vec![OperationResult::cancelled(None)];
        }

        let entries: Vec<LibraryInstallationState> = manifest
            .libraries
            .iter()
            .map(|s| {
                s.with_defaults(
                    manifest.default_provider.as_deref(),
                    manifest.default_destination.as_deref(),
                )
            })
            .collect();

        // Stage 1: per-entry property checks. The first invalid entry aborts
        // with its errors alone.
        for entry in &entries {
            let errors = entry.property_errors();
            if !errors.is_empty() {
                return vec![OperationResult::failed(Some(entry.clone()), errors)];
            }
        }

        // Stage 2: provider resolution and catalog expansion. An unknown
        // provider surfaces here as ProviderIsUndefined; the first failure
        // aborts the rest.
        let mut expanded = Vec::with_capacity(entries.len());
        for entry in &entries {
            if token.is_cancelled() {
                return vec![OperationResult::cancelled(None)];
            }
            match expand_entry(entry, self.registry, token) {
                Ok(state) => expanded.push(state),
                Err(Failure::Cancelled) => return vec![OperationResult::cancelled(None)],
                Err(failure) => {
                    return vec![OperationResult::from_failure(Some(entry.clone()), failure)];
                }
            }
        }

        // Stage 3: destination conflicts, reported as one aggregate result.
        let conflicts = detect_conflicts(&expanded);
        if !conflicts.is_empty() {
            let errors = conflicts
                .iter()
                .map(|c| OperationError::conflicting_libraries(&c.file, &c.libraries))
                .collect();
            return vec![OperationResult::failed(None, errors)];
        }

        expanded
            .into_iter()
            .map(|state| OperationResult::ok(Some(state)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn entry(id: &str, dest: &str, files: &[&str]) -> LibraryInstallationState {
        LibraryInstallationState {
            library_id: id.to_string(),
            provider_id: Some("filesystem".to_string()),
            destination_path: Some(dest.to_string()),
            files: Some(files.iter().map(|f| f.to_string()).collect()),
        }
    }

    #[test]
    fn test_normalize_destination() {
        assert_eq!(normalize_destination("lib\\js//app.js"), "lib/js/app.js");
        assert_eq!(normalize_destination("./lib/app.js"), "lib/app.js");
        assert_eq!(normalize_destination("lib/app.js/"), "lib/app.js");
    }

    #[cfg(windows)]
    #[test]
    fn test_normalize_destination_folds_case() {
        assert_eq!(normalize_destination("Lib\\JS\\app.js"), "lib/js/app.js");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_case_sensitive_destinations_do_not_conflict() {
        // On case-sensitive filesystems these are two distinct files.
        let a = entry("a@1.0.0", "Lib", &["app.js"]);
        let b = entry("b@1.0.0", "lib", &["app.js"]);
        assert!(detect_conflicts(&[a, b]).is_empty());
    }

    #[test]
    fn test_detect_conflicts_regardless_of_order() {
        let a = entry("a@1.0.0", "wwwroot/lib", &["shared.js", "only-a.js"]);
        let b = entry("b@2.0.0", "wwwroot\\lib\\", &["shared.js"]);

        for states in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
            let conflicts = detect_conflicts(&states);
            assert_eq!(conflicts.len(), 1, "exactly one colliding file");
            assert_eq!(conflicts[0].libraries.len(), 2);
            assert!(conflicts[0].libraries.contains(&"a@1.0.0".to_string()));
            assert!(conflicts[0].libraries.contains(&"b@2.0.0".to_string()));
        }
    }

    #[test]
    fn test_no_conflict_for_distinct_destinations() {
        let a = entry("a@1.0.0", "wwwroot/lib/a", &["shared.js"]);
        let b = entry("b@2.0.0", "wwwroot/lib/b", &["shared.js"]);
        assert!(detect_conflicts(&[a, b]).is_empty());
    }

    #[test]
    fn test_malformed_manifest_is_single_result() {
        let registry = ProviderRegistry::new();
        let validator = Validator::new(&registry);
        let results = validator.validate_manifest(None, &CancellationToken::new());
        assert_eq!(results.len(), 1);
        assert!(results[0].has_code(ErrorCode::ManifestMalformed));
    }

    #[test]
    fn test_unsupported_version_stops_pipeline() {
        let registry = ProviderRegistry::new();
        let validator = Validator::new(&registry);
        let mut manifest = Manifest::default();
        manifest.version = "9.9".to_string();
        // An entry that would also fail; version check wins.
        manifest.libraries.push(LibraryInstallationState::new(""));
        let results =
            validator.validate_manifest(Some(&manifest), &CancellationToken::new());
        assert_eq!(results.len(), 1);
        assert!(results[0].has_code(ErrorCode::VersionIsNotSupported));
    }

    #[test]
    fn test_property_stage_aborts_at_first_invalid_entry() {
        let registry = ProviderRegistry::new();
        let validator = Validator::new(&registry);
        let mut manifest = Manifest::default();
        manifest.libraries.push(LibraryInstallationState::new(""));
        manifest.libraries.push(LibraryInstallationState::new("also-empty-dest"));
        let results =
            validator.validate_manifest(Some(&manifest), &CancellationToken::new());
        assert_eq!(results.len(), 1);
        assert!(results[0].has_code(ErrorCode::LibraryIdRequired));
    }

    #[test]
    fn test_unknown_provider_surfaces_in_expansion() {
        // Properties are fine; the empty registry makes the first expansion
        // fail with ProviderIsUndefined and abort the rest.
        let registry = ProviderRegistry::new();
        let validator = Validator::new(&registry);
        let mut manifest = Manifest::default();
        manifest.libraries.push(LibraryInstallationState::new("jquery@3.6.0"));
        manifest.libraries.push(LibraryInstallationState::new("lodash@4.17.21"));
        let results =
            validator.validate_manifest(Some(&manifest), &CancellationToken::new());
        assert_eq!(results.len(), 1);
        assert!(results[0].has_code(ErrorCode::ProviderIsUndefined));
    }

    #[test]
    fn test_pre_cancelled_token() {
        let registry = ProviderRegistry::new();
        let validator = Validator::new(&registry);
        let token = CancellationToken::new();
        token.cancel();
        let results = validator.validate_manifest(Some(&Manifest::default()), &token);
        assert_eq!(results.len(), 1);
        assert!(results[0].cancelled);
    }
}
