//! Pluggable library sources. Each provider binds a catalog and a naming
//! scheme to expansion (`update_state`) and installation behavior.

pub mod cdnjs;
pub mod filesystem;
pub mod unpkg;

use std::sync::Arc;

use crate::cache::Cache;
use crate::cancellation::CancellationToken;
use crate::catalog::Catalog;
use crate::error::{Failure, OperationError};
use crate::host::HostEnvironment;
use crate::manifest::LibraryInstallationState;
use crate::naming::NamingScheme;

pub use cdnjs::{CdnjsProvider, CDNJS_PROVIDER_ID};
pub use filesystem::{FileSystemProvider, FILESYSTEM_PROVIDER_ID};
pub use unpkg::{UnpkgProvider, UNPKG_PROVIDER_ID};

pub trait Provider: Send + Sync {
    fn id(&self) -> &'static str;

    fn catalog(&self) -> &dyn Catalog;

    fn naming_scheme(&self) -> &dyn NamingScheme;

    /// Expand a partially specified entry: resolve the library against the
    /// catalog, fill `files` from the authoritative list when absent, and
    /// reject file names the library does not offer.
    fn update_state(
        &self,
        state: &LibraryInstallationState,
        token: &CancellationToken,
    ) -> Result<LibraryInstallationState, Failure> {
        if token.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        let (name, version) = self
            .naming_scheme()
            .parse(&state.library_id)
            .map_err(Failure::from)?;
        let resolved = self.catalog().get_library(&name, &version, token)?;

        let mut out = state.clone();
        out.provider_id = Some(self.id().to_string());
        match &state.files {
            None => out.files = Some(resolved.file_names()),
            Some(requested) => {
                let errors: Vec<OperationError> = requested
                    .iter()
                    .filter(|f| !resolved.offers(f))
                    .map(|f| OperationError::file_not_offered(&state.library_id, f))
                    .collect();
                if !errors.is_empty() {
                    return Err(Failure::Errors(errors));
                }
            }
        }
        Ok(out)
    }

    /// Install every required file under the entry's destination, relative to
    /// the working directory. Idempotent: existing destination files are left
    /// untouched.
    fn install(
        &self,
        state: &LibraryInstallationState,
        token: &CancellationToken,
    ) -> Result<(), Failure>;
}

/// Shared install loop: resolve the destination, then write each file through
/// the host (which skips files already present). `produce` maps a declared
/// file name to its bytes, usually via the cache.
pub(crate) fn install_files<F>(
    state: &LibraryInstallationState,
    host: &HostEnvironment,
    token: &CancellationToken,
    mut produce: F,
) -> Result<(), Failure>
where
    F: FnMut(&str) -> Result<Vec<u8>, OperationError>,
{
    let Some(dest) = state.destination_path.as_deref().filter(|d| !d.trim().is_empty()) else {
        return Err(Failure::from(OperationError::destination_undefined(&state.library_id)));
    };
    let dest = dest.trim_end_matches(['/', '\\']);
    for file in state.files.as_deref().unwrap_or(&[]) {
        if token.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        let relative = format!("{}/{}", dest, file.trim_start_matches(['/', '\\']));
        host.write_file(&relative, || produce(file)).map_err(Failure::from)?;
    }
    Ok(())
}

/// Ordered, case-sensitive id -> provider mapping, looked up at
/// manifest-expansion time.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Production wiring: cdnjs + unpkg + filesystem sharing one cache and
    /// host environment.
    pub fn with_default_providers(cache: Arc<Cache>, host: Arc<HostEnvironment>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CdnjsProvider::new(cache.clone(), host.clone())));
        registry.register(Box::new(UnpkgProvider::new(cache, host.clone())));
        registry.register(Box::new(FileSystemProvider::new(host)));
        registry
    }

    pub fn register(&mut self, provider: Box<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn get(&self, id: &str) -> Option<&dyn Provider> {
        self.providers.iter().find(|p| p.id() == id).map(|p| p.as_ref())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }
}
