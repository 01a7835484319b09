//! The declarative manifest (liman.json) and its per-library entries.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_MANIFEST_VERSION, SUPPORTED_MANIFEST_VERSIONS};
use crate::error::OperationError;
use crate::host::write_atomic;

/// One desired library: a provider-specific id plus optional overrides.
/// Provider and destination fall back to manifest-level defaults; `files`
/// absent means "everything the catalog declares for this version".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LibraryInstallationState {
    #[serde(rename = "library")]
    pub library_id: String,
    #[serde(rename = "provider", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(rename = "destination", skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

impl LibraryInstallationState {
    pub fn new(library_id: impl Into<String>) -> Self {
        Self {
            library_id: library_id.into(),
            provider_id: None,
            destination_path: None,
            files: None,
        }
    }

    /// Per-entry property check: non-empty id, sane destination when present.
    pub fn property_errors(&self) -> Vec<OperationError> {
        let mut errors = Vec::new();
        if self.library_id.trim().is_empty() {
            errors.push(OperationError::library_id_required());
        }
        if let Some(dest) = &self.destination_path {
            let escapes = dest.split(['/', '\\']).any(|segment| segment == "..");
            if dest.trim().is_empty()
                || dest.contains('\0')
                || Path::new(dest).is_absolute()
                || escapes
            {
                errors.push(OperationError::destination_not_valid(dest));
            }
        }
        errors
    }

    pub fn is_valid(&self) -> bool {
        self.property_errors().is_empty()
    }

    /// Fill provider/destination from manifest-level defaults, producing a new
    /// state. The original entry is never mutated in place.
    pub fn with_defaults(
        &self,
        default_provider: Option<&str>,
        default_destination: Option<&str>,
    ) -> Self {
        let mut out = self.clone();
        if out.provider_id.is_none() {
            out.provider_id = default_provider.map(str::to_string);
        }
        if out.destination_path.is_none() {
            out.destination_path = default_destination.map(str::to_string);
        }
        out
    }
}

/// The user-authored manifest. Entries keep their file order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(rename = "defaultProvider", skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    #[serde(rename = "defaultDestination", skip_serializing_if = "Option::is_none")]
    pub default_destination: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryInstallationState>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: DEFAULT_MANIFEST_VERSION.to_string(),
            default_provider: None,
            default_destination: None,
            libraries: Vec::new(),
        }
    }
}

impl Manifest {
    pub fn is_supported_version(&self) -> bool {
        SUPPORTED_MANIFEST_VERSIONS.contains(&self.version.as_str())
    }

    /// Missing file -> empty manifest at the default version. Malformed JSON
    /// or wrong shape -> None (surfaced by the validator as ManifestMalformed).
    pub fn load(path: &Path) -> Option<Manifest> {
        if !path.exists() {
            return Some(Manifest::default());
        }
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        write_atomic(path, content.as_bytes())
    }

    pub fn find(&self, library_id: &str) -> Option<&LibraryInstallationState> {
        self.libraries.iter().find(|s| s.library_id == library_id)
    }

    /// Replace the entry with the same id, or append. Returns the replaced
    /// entry when there was one.
    pub fn upsert(&mut self, state: LibraryInstallationState) -> Option<LibraryInstallationState> {
        if let Some(existing) = self
            .libraries
            .iter_mut()
            .find(|s| s.library_id == state.library_id)
        {
            return Some(std::mem::replace(existing, state));
        }
        self.libraries.push(state);
        None
    }

    pub fn remove(&mut self, library_id: &str) -> Option<LibraryInstallationState> {
        let idx = self.libraries.iter().position(|s| s.library_id == library_id)?;
        Some(self.libraries.remove(idx))
    }
}
