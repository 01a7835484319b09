//! unpkg provider: version metadata from the npm registry packument, file
//! lists from unpkg's `?meta` endpoint, asset bytes from unpkg itself.

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

pub const UNPKG_PROVIDER_ID: &str = "unpkg";

const REGISTRY_BASE: &str = "https://registry.npmjs.org";
const ASSET_BASE: &str = "https://unpkg.com";

/// Scoped packages escape the slash in registry paths: @scope/pkg -> @scope%2Fpkg.
fn encoded_package_path(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

/// Decode an npm search payload ({"objects":[{"package":{...}}]}) into groups.
/// Null, empty, or invalid payloads yield None.
pub fn convert_to_library_groups(payload: &str) -> Option<Vec<LibraryGroup>> {
    if payload.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let objects = value.get("objects")?.as_array()?;
    let mut groups = Vec::new();
    for item in objects {
        let package = item.get("package")?;
        let name = package.get("name")?.as_str()?;
        let description = package
            .get("description")
            .and_then(|d| d.as_str())
            .map(String::from);
        let mut versions = Vec::new();
        if let Some(version) = package.get("version").and_then(|v| v.as_str()) {
            versions.push(version.to_string());
        }
        groups.push(LibraryGroup { display_name: name.to_string(), description, versions });
    }
    Some(groups)
}

/// Flatten an unpkg `?meta` file tree ({"path":"/","type":"directory",
/// "files":[...]}) into sorted paths without the leading slash. Invalid
/// payloads yield None.
pub fn convert_to_file_list(payload: &str) -> Option<Vec<String>> {
    if payload.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let mut out = Vec::new();
    flatten_tree(&value, &mut out)?;
    out.sort();
    Some(out)
}

fn flatten_tree(node: &serde_json::Value, out: &mut Vec<String>) -> Option<()> {
    match node.get("type")?.as_str()? {
        "file" => {
            let path = node.get("path")?.as_str()?;
            out.push(path.trim_start_matches('/').to_string());
        }
        "directory" => {
            if let Some(children) = node.get("files").and_then(|f| f.as_array()) {
                for child in children {
                    flatten_tree(child, out)?;
                }
            }
        }
        _ => return None,
    }
    Some(())
}

/// Version list from a packument's "versions" object. None on wrong shape.
fn packument_versions(packument: &serde_json::Value) -> Option<Vec<String>> {
    let versions = packument.get("versions")?.as_object()?;
    Some(versions.keys().cloned().collect())
}

/// Default asset for a version: the packument's per-version "main" entry.
fn packument_main(packument: &serde_json::Value, version: &str) -> Option<String> {
    packument
        .get("versions")?
        .as_object()?
        .get(version)?
        .get("main")?
        .as_str()
        .map(|m| m.trim_start_matches("./").to_string())
}

fn is_not_found(error: &OperationError) -> bool {
    error.message.contains("404")
}

pub struct UnpkgCatalog {
    cache: Arc<Cache>,
}

impl UnpkgCatalog {
    fn fetch_document(&self, url: &str, token: &CancellationToken) -> Result<Vec<u8>, Failure> {
        if token.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        self.cache
            .get_or_fetch_metadata(UNPKG_PROVIDER_ID, url, || {
                http_client::get_bytes(url).map_err(|e| OperationError::download_failed(url, &e))
            })
            .map_err(Failure::from)
    }

    fn packument(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<serde_json::Value, Failure> {
        let url = format!("{}/{}", REGISTRY_BASE, encoded_package_path(name));
        let bytes = self.fetch_document(&url, token)?;
        serde_json::from_slice(&bytes)
            .map_err(|_| Failure::from(OperationError::invalid_library(name, UNPKG_PROVIDER_ID)))
    }

    fn versions_descending(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<Vec<String>, Failure> {
        let packument = self.packument(name, token)?;
        let mut versions = packument_versions(&packument)
            .ok_or_else(|| OperationError::invalid_library(name, UNPKG_PROVIDER_ID))?;
        sort_versions_descending(&mut versions);
        Ok(versions)
    }
}

impl Catalog for UnpkgCatalog {
    fn search(
        &self,
        term: &str,
        max_hits: usize,
        token: &CancellationToken,
    ) -> Result<Vec<LibraryGroup>, Failure> {
        let url = format!(
            "{}/-/v1/search?text={}&size={}",
            REGISTRY_BASE,
            term.trim().replace(' ', "%20"),
            max_hits
        );
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
        let id = VersionedNamingScheme.build(name, version);
        if name.trim().is_empty() || version.trim().is_empty() {
            return Err(Failure::from(OperationError::invalid_library(&id, UNPKG_PROVIDER_ID)));
        }
        let packument = match self.packument(name, token) {
            Ok(p) => p,
            Err(Failure::Errors(errors)) if errors.iter().any(is_not_found) => {
                return Err(Failure::from(OperationError::invalid_library(&id, UNPKG_PROVIDER_ID)));
            }
            Err(failure) => return Err(failure),
        };
        let versions = packument_versions(&packument)
            .ok_or_else(|| OperationError::invalid_library(&id, UNPKG_PROVIDER_ID))?;
        if !versions.iter().any(|v| v == version) {
            return Err(Failure::from(OperationError::invalid_library(&id, UNPKG_PROVIDER_ID)));
        }

        let meta_url = format!("{}/{}@{}/?meta", ASSET_BASE, name, version);
        let bytes = self.fetch_document(&meta_url, token)?;
        let payload = String::from_utf8_lossy(&bytes);
        let files = convert_to_file_list(&payload)
            .ok_or_else(|| OperationError::invalid_library(&id, UNPKG_PROVIDER_ID))?;
        let default_file = packument_main(&packument, version);
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
            provider_id: UNPKG_PROVIDER_ID.to_string(),
            files,
        })
    }

    fn get_latest_version(
        &self,
        name: &str,
        include_prerelease: bool,
        token: &CancellationToken,
    ) -> Result<Option<String>, Failure> {
        match self.versions_descending(name, token) {
            Ok(versions) => Ok(latest_version(&versions, include_prerelease)),
            Err(Failure::Errors(errors))
                if errors.iter().any(|e| {
                    is_not_found(e) || e.code == crate::error::ErrorCode::InvalidLibrary
                }) =>
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
            |name| self.versions_descending(name, token),
        )
    }
}

pub struct UnpkgProvider {
    catalog: UnpkgCatalog,
    cache: Arc<Cache>,
    host: Arc<HostEnvironment>,
    scheme: VersionedNamingScheme,
}

impl UnpkgProvider {
    pub fn new(cache: Arc<Cache>, host: Arc<HostEnvironment>) -> Self {
        Self {
            catalog: UnpkgCatalog { cache: cache.clone() },
            cache,
            host,
            scheme: VersionedNamingScheme,
        }
    }
}

impl Provider for UnpkgProvider {
    fn id(&self) -> &'static str {
        UNPKG_PROVIDER_ID
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
            let url = format!("{}/{}@{}/{}", ASSET_BASE, name, version, file);
            let cached = self.cache.get_or_fetch_file(UNPKG_PROVIDER_ID, &name, &version, file, || {
                http_client::get_bytes(&url).map_err(|e| OperationError::download_failed(&url, &e))
            })?;
            fs::read(&cached).map_err(|e| OperationError::cache_failure(&e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_to_library_groups_npm_shape() {
        assert!(convert_to_library_groups("").is_none());
        assert!(convert_to_library_groups("not json").is_none());
        assert!(convert_to_library_groups("{\"results\":[]}").is_none());

        let payload = r#"{"objects":[{"package":{"name":"lodash","description":"utils","version":"4.17.21"}}]}"#;
        let groups = convert_to_library_groups(payload).unwrap();
        assert_eq!(groups[0].display_name, "lodash");
        assert_eq!(groups[0].versions, vec!["4.17.21"]);
    }

    #[test]
    fn test_convert_to_file_list_flattens_tree() {
        let payload = r#"{
            "path": "/",
            "type": "directory",
            "files": [
                {"path": "/package.json", "type": "file"},
                {"path": "/dist", "type": "directory", "files": [
                    {"path": "/dist/lodash.js", "type": "file"},
                    {"path": "/dist/lodash.min.js", "type": "file"}
                ]}
            ]
        }"#;
        let files = convert_to_file_list(payload).unwrap();
        assert_eq!(files, vec!["dist/lodash.js", "dist/lodash.min.js", "package.json"]);

        assert!(convert_to_file_list("").is_none());
        assert!(convert_to_file_list("{\"type\":\"banana\"}").is_none());
        assert!(convert_to_file_list("{\"files\":[]}").is_none());
    }

    #[test]
    fn test_encoded_package_path() {
        assert_eq!(encoded_package_path("lodash"), "lodash");
        assert_eq!(encoded_package_path("@types/node"), "@types%2Fnode");
    }

    fn seeded_catalog(dir: &std::path::Path) -> UnpkgCatalog {
        let cache = Arc::new(Cache::new(dir.join("cache")));
        let packument_url = format!("{}/lodash", REGISTRY_BASE);
        cache
            .get_or_fetch_metadata(UNPKG_PROVIDER_ID, &packument_url, || {
                Ok(br#"{
                    "name": "lodash",
                    "versions": {
                        "4.17.20": {"main": "lodash.js"},
                        "4.17.21": {"main": "lodash.js"},
                        "5.0.0-alpha.1": {"main": "lodash.js"}
                    }
                }"#
                .to_vec())
            })
            .unwrap();
        let meta_url = format!("{}/lodash@4.17.21/?meta", ASSET_BASE);
        cache
            .get_or_fetch_metadata(UNPKG_PROVIDER_ID, &meta_url, || {
                Ok(br#"{"path":"/","type":"directory","files":[
                    {"path":"/lodash.js","type":"file"},
                    {"path":"/package.json","type":"file"}
                ]}"#
                .to_vec())
            })
            .unwrap();
        UnpkgCatalog { cache }
    }

    #[test]
    fn test_get_library_and_default_flag() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = seeded_catalog(dir.path());
        let token = CancellationToken::new();

        let resolved = catalog.get_library("lodash", "4.17.21", &token).unwrap();
        assert_eq!(resolved.file_names(), vec!["lodash.js", "package.json"]);
        assert!(resolved.files.iter().any(|f| f.path == "lodash.js" && f.default));

        // Version not in the packument: InvalidLibrary, not a panic.
        match catalog.get_library("lodash", "9.9.9", &token) {
            Err(Failure::Errors(errors)) => {
                assert_eq!(errors[0].code, crate::error::ErrorCode::InvalidLibrary);
            }
            other => panic!("expected InvalidLibrary, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_latest_version_skips_prerelease() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = seeded_catalog(dir.path());
        let token = CancellationToken::new();

        let latest = catalog.get_latest_version("lodash", false, &token).unwrap();
        assert_eq!(latest.as_deref(), Some("4.17.21"));
        let latest = catalog.get_latest_version("lodash", true, &token).unwrap();
        assert_eq!(latest.as_deref(), Some("5.0.0-alpha.1"));
    }
}
