//! cdnjs provider: catalog metadata from api.cdnjs.com, asset bytes from
//! cdnjs.cloudflare.com. All catalog reads go through the metadata cache.

use std::fs;
use std::sync::Arc;

use crate::cache::Cache;
use crate::cancellation::CancellationToken;
use crate::catalog::{
    completion_set_for, latest_version, sort_versions_descending, Catalog, CompletionSet,
    LibraryFile, LibraryGroup, ResolvedLibrary,
};
use crate::error::{Failure, OperationError};
use crate::host::HostEnvironment;
use crate::http_client;
use crate::manifest::LibraryInstallationState;
use crate::naming::{NamingScheme, VersionedNamingScheme};
use crate::providers::{install_files, Provider};

pub const CDNJS_PROVIDER_ID: &str = "cdnjs";

const API_BASE: &str = "https://api.cdnjs.com/libraries";
const ASSET_BASE: &str = "https://cdnjs.cloudflare.com/ajax/libs";
const SEARCH_FIELDS: &str = "fields=description,version";
const LIBRARY_FIELDS: &str = "fields=filename,versions,description";

/// Decode a cdnjs search payload ({"results":[{name, description, version}]})
/// into groups. Null, empty, or syntactically invalid payloads yield None —
/// "no data", which is not the same as an empty result list.
pub fn convert_to_library_groups(payload: &str) -> Option<Vec<LibraryGroup>> {
    if payload.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let results = value.get("results")?.as_array()?;
    let mut groups = Vec::new();
    for item in results {
        let name = item.get("name")?.as_str()?;
        let description = item
            .get("description")
            .and_then(|d| d.as_str())
            .map(String::from);
        let mut versions = Vec::new();
        if let Some(version) = item.get("version").and_then(|v| v.as_str()) {
            versions.push(version.to_string());
        }
        groups.push(LibraryGroup { display_name: name.to_string(), description, versions });
    }
    Some(groups)
}

/// Decode a cdnjs per-version document ({"files":[...]}) into its file list.
pub fn convert_to_version_files(payload: &str) -> Option<Vec<String>> {
    if payload.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let files = value.get("files")?.as_array()?;
    let mut out = Vec::new();
    for file in files {
        out.push(file.as_str()?.to_string());
    }
    Some(out)
}

/// Decode a cdnjs library document into (default filename, versions).
fn convert_to_library_doc(payload: &str) -> Option<(Option<String>, Vec<String>)> {
    if payload.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let filename = value
        .get("filename")
        .and_then(|f| f.as_str())
        .map(String::from);
    let versions = value
        .get("versions")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Some((filename, versions))
}

fn encode_term(term: &str) -> String {
    term.trim().replace(' ', "%20")
}

fn is_not_found(error: &OperationError) -> bool {
    error.message.contains("404")
}

pub struct CdnjsCatalog {
    cache: Arc<Cache>,
}

impl CdnjsCatalog {
    fn fetch_document(&self, url: &str, token: &CancellationToken) -> Result<Vec<u8>, Failure> {
        if token.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        self.cache
            .get_or_fetch_metadata(CDNJS_PROVIDER_ID, url, || {
                http_client::get_bytes(url).map_err(|e| OperationError::download_failed(url, &e))
            })
            .map_err(Failure::from)
    }

    /// Library document: (default filename, all published versions descending).
    fn library_doc(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<(Option<String>, Vec<String>), Failure> {
        let url = format!("{}/{}?{}", API_BASE, name, LIBRARY_FIELDS);
        let bytes = self.fetch_document(&url, token)?;
        let payload = String::from_utf8_lossy(&bytes);
        let (filename, mut versions) = convert_to_library_doc(&payload)
            .ok_or_else(|| OperationError::invalid_library(name, CDNJS_PROVIDER_ID))?;
        sort_versions_descending(&mut versions);
        Ok((filename, versions))
    }
}

impl Catalog for CdnjsCatalog {
    fn search(
        &self,
        term: &str,
        max_hits: usize,
        token: &CancellationToken,
    ) -> Result<Vec<LibraryGroup>, Failure> {
        let term = encode_term(term);
        let url = if term.is_empty() {
            format!("{}?{}&limit={}", API_BASE, SEARCH_FIELDS, max_hits)
        } else {
            format!("{}?search={}&{}&limit={}", API_BASE, term, SEARCH_FIELDS, max_hits)
        };
        let bytes = self.fetch_document(&url, token)?;
        let payload = String::from_utf8_lossy(&bytes);
        let mut groups = convert_to_library_groups(&payload).unwrap_or_default();
        groups.truncate(max_hits);
        groups.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(groups)
    }

    fn get_library(
        &self,
        name: &str,
        version: &str,
        token: &CancellationToken,
    ) -> Result<ResolvedLibrary, Failure> {
        if name.trim().is_empty() || version.trim().is_empty() {
            let id = VersionedNamingScheme.build(name, version);
            return Err(Failure::from(OperationError::invalid_library(&id, CDNJS_PROVIDER_ID)));
        }
        let url = format!("{}/{}/{}", API_BASE, name, version);
        let bytes = match self.fetch_document(&url, token) {
            Ok(bytes) => bytes,
            Err(Failure::Errors(errors)) if errors.iter().any(is_not_found) => {
                let id = VersionedNamingScheme.build(name, version);
                return Err(Failure::from(OperationError::invalid_library(&id, CDNJS_PROVIDER_ID)));
            }
            Err(failure) => return Err(failure),
        };
        let payload = String::from_utf8_lossy(&bytes);
        let files = convert_to_version_files(&payload).ok_or_else(|| {
            let id = VersionedNamingScheme.build(name, version);
            OperationError::invalid_library(&id, CDNJS_PROVIDER_ID)
        })?;
        if files.is_empty() {
            let id = VersionedNamingScheme.build(name, version);
            return Err(Failure::from(OperationError::invalid_library(&id, CDNJS_PROVIDER_ID)));
        }
        // Default file comes from the library-level document; absence is fine.
        let default_file = self
            .library_doc(name, token)
            .map(|(filename, _)| filename)
            .unwrap_or(None);
        let files = files
            .into_iter()
            .map(|path| LibraryFile {
                default: Some(path.as_str()) == default_file.as_deref(),
                path,
            })
            .collect();
        Ok(ResolvedLibrary {
            name: name.to_string(),
            version: version.to_string(),
            provider_id: CDNJS_PROVIDER_ID.to_string(),
            files,
        })
    }

    fn get_latest_version(
        &self,
        name: &str,
        include_prerelease: bool,
        token: &CancellationToken,
    ) -> Result<Option<String>, Failure> {
        match self.library_doc(name, token) {
            Ok((_, versions)) => Ok(latest_version(&versions, include_prerelease)),
            // Unknown name: no candidate rather than a hard failure.
            Err(Failure::Errors(errors)) if errors.iter().any(is_not_found) => Ok(None),
            Err(Failure::Errors(errors))
                if errors.iter().any(|e| e.code == crate::error::ErrorCode::InvalidLibrary) =>
            {
                Ok(None)
            }
            Err(failure) => Err(failure),
        }
    }

    fn get_completion_set(
        &self,
        partial_library_id: &str,
        caret_position: usize,
        token: &CancellationToken,
    ) -> Result<CompletionSet, Failure> {
        completion_set_for(
            partial_library_id,
            caret_position,
            |term| self.search(term, 25, token),
            |name| self.library_doc(name, token).map(|(_, versions)| versions),
        )
    }
}

pub struct CdnjsProvider {
    catalog: CdnjsCatalog,
    cache: Arc<Cache>,
    host: Arc<HostEnvironment>,
    scheme: VersionedNamingScheme,
}

impl CdnjsProvider {
    pub fn new(cache: Arc<Cache>, host: Arc<HostEnvironment>) -> Self {
        Self {
            catalog: CdnjsCatalog { cache: cache.clone() },
            cache,
            host,
            scheme: VersionedNamingScheme,
        }
    }
}

impl Provider for CdnjsProvider {
    fn id(&self) -> &'static str {
        CDNJS_PROVIDER_ID
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
        let (name, version) = self.scheme.parse(&state.library_id).map_err(Failure::from)?;
        install_files(state, &self.host, token, |file| {
            let url = format!("{}/{}/{}/{}", ASSET_BASE, name, version, file);
            let cached = self.cache.get_or_fetch_file(CDNJS_PROVIDER_ID, &name, &version, file, || {
                http_client::get_bytes(&url).map_err(|e| OperationError::download_failed(&url, &e))
            })?;
            fs::read(&cached).map_err(|e| OperationError::cache_failure(&e.to_string()))
        })
    }
}
