//! Core library for Liman: manifest, validation, providers, cache, restore.
//! Used by the CLI binary; can be reused by other tools (e.g. IDE tooling).

pub mod cache;
pub mod cancellation;
pub mod catalog;
pub mod config;
pub mod error;
pub mod host;
pub mod http_client;
pub mod logging;
pub mod manifest;
pub mod naming;
pub mod providers;
pub mod restore;
pub mod validator;

// Re-export main API for CLI
pub use cache::{Cache, CachedLibrary};
pub use cancellation::CancellationToken;
pub use catalog::{Catalog, CompletionItem, CompletionSet, LibraryFile, LibraryGroup, ResolvedLibrary};
pub use config::{cache_dir, DEFAULT_MANIFEST_VERSION, MANIFEST_NAME};
pub use error::{ErrorCode, Failure, OperationError, OperationResult};
pub use host::HostEnvironment;
pub use logging::{FileLogger, LogLevel, Logger, NullLogger};
pub use manifest::{LibraryInstallationState, Manifest};
pub use naming::{NamingScheme, PathNamingScheme, VersionedNamingScheme};
pub use providers::{
    CdnjsProvider, FileSystemProvider, Provider, ProviderRegistry, UnpkgProvider,
    CDNJS_PROVIDER_ID, FILESYSTEM_PROVIDER_ID, UNPKG_PROVIDER_ID,
};
pub use restore::Restorer;
pub use validator::{detect_conflicts, FileConflict, Validator};
