//! Structured operation results. Every public operation that can partially
//! fail returns an `OperationResult` (or a sequence of them) instead of
//! bubbling raw errors across the core boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::manifest::LibraryInstallationState;

/// Stable error codes for expected failure modes. The short string form
/// (`LM0xx`) is what CLI/IDE layers key their messages on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    ManifestMalformed,
    VersionIsNotSupported,
    ProviderIsUndefined,
    LibraryIdRequired,
    MalformedIdentifier,
    InvalidLibrary,
    FileNotOffered,
    DestinationNotValid,
    DestinationUndefined,
    ConflictingLibrariesInManifest,
    DownloadFailed,
    WriteFailed,
    CacheFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ManifestMalformed => "LM001",
            ErrorCode::VersionIsNotSupported => "LM002",
            ErrorCode::ProviderIsUndefined => "LM003",
            ErrorCode::LibraryIdRequired => "LM004",
            ErrorCode::MalformedIdentifier => "LM005",
            ErrorCode::InvalidLibrary => "LM006",
            ErrorCode::FileNotOffered => "LM007",
            ErrorCode::DestinationNotValid => "LM008",
            ErrorCode::DestinationUndefined => "LM009",
            ErrorCode::ConflictingLibrariesInManifest => "LM010",
            ErrorCode::DownloadFailed => "LM011",
            ErrorCode::WriteFailed => "LM012",
            ErrorCode::CacheFailure => "LM013",
        }
    }
}

/// One expected failure: a code, a rendered message, and the positional
/// arguments the message was built from (for IDE layers that re-render).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub code: ErrorCode,
    pub message: String,
    pub args: Vec<String>,
}

impl OperationError {
    fn new(code: ErrorCode, message: String, args: Vec<String>) -> Self {
        Self { code, message, args }
    }

    pub fn manifest_malformed() -> Self {
        Self::new(
            ErrorCode::ManifestMalformed,
            "The manifest is malformed or could not be parsed".to_string(),
            Vec::new(),
        )
    }

    pub fn version_not_supported(version: &str) -> Self {
        Self::new(
            ErrorCode::VersionIsNotSupported,
            format!("Manifest version \"{}\" is not supported", version),
            vec![version.to_string()],
        )
    }

    pub fn provider_undefined(provider_id: &str) -> Self {
        Self::new(
            ErrorCode::ProviderIsUndefined,
            format!("Provider \"{}\" is not registered", provider_id),
            vec![provider_id.to_string()],
        )
    }

    pub fn library_id_required() -> Self {
        Self::new(
            ErrorCode::LibraryIdRequired,
            "Library id must not be empty".to_string(),
            Vec::new(),
        )
    }

    pub fn malformed_identifier(library_id: &str) -> Self {
        Self::new(
            ErrorCode::MalformedIdentifier,
            format!("Library id \"{}\" is malformed", library_id),
            vec![library_id.to_string()],
        )
    }

    pub fn invalid_library(library_id: &str, provider_id: &str) -> Self {
        Self::new(
            ErrorCode::InvalidLibrary,
            format!(
                "Library \"{}\" could not be resolved by the \"{}\" provider",
                library_id, provider_id
            ),
            vec![library_id.to_string(), provider_id.to_string()],
        )
    }

    pub fn file_not_offered(library_id: &str, file: &str) -> Self {
        Self::new(
            ErrorCode::FileNotOffered,
            format!("Library \"{}\" does not offer file \"{}\"", library_id, file),
            vec![library_id.to_string(), file.to_string()],
        )
    }

    pub fn destination_not_valid(path: &str) -> Self {
        Self::new(
            ErrorCode::DestinationNotValid,
            format!("Destination path \"{}\" is not valid", path),
            vec![path.to_string()],
        )
    }

    pub fn destination_undefined(library_id: &str) -> Self {
        Self::new(
            ErrorCode::DestinationUndefined,
            format!("No destination defined for library \"{}\"", library_id),
            vec![library_id.to_string()],
        )
    }

    pub fn conflicting_libraries(destination_file: &str, library_ids: &[String]) -> Self {
        let list = library_ids.join(", ");
        let mut args = vec![destination_file.to_string()];
        args.extend(library_ids.iter().cloned());
        Self::new(
            ErrorCode::ConflictingLibrariesInManifest,
            format!(
                "File \"{}\" is written by more than one library: {}",
                destination_file, list
            ),
            args,
        )
    }

    pub fn download_failed(url: &str, detail: &str) -> Self {
        Self::new(
            ErrorCode::DownloadFailed,
            format!("Failed to download \"{}\": {}", url, detail),
            vec![url.to_string(), detail.to_string()],
        )
    }

    pub fn write_failed(path: &str, detail: &str) -> Self {
        Self::new(
            ErrorCode::WriteFailed,
            format!("Failed to write \"{}\": {}", path, detail),
            vec![path.to_string(), detail.to_string()],
        )
    }

    pub fn cache_failure(detail: &str) -> Self {
        Self::new(
            ErrorCode::CacheFailure,
            format!("Cache operation failed: {}", detail),
            vec![detail.to_string()],
        )
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for OperationError {}

/// Internal failure channel: cancellation is not an error and must stay
/// distinguishable from one all the way to the result shape.
#[derive(Clone, Debug)]
pub enum Failure {
    Cancelled,
    Errors(Vec<OperationError>),
}

impl From<OperationError> for Failure {
    fn from(error: OperationError) -> Self {
        Failure::Errors(vec![error])
    }
}

/// Outcome of one unit of work (usually one manifest entry). `state` carries
/// the expanded goal state when one was produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub cancelled: bool,
    pub state: Option<LibraryInstallationState>,
    pub errors: Vec<OperationError>,
}

impl OperationResult {
    pub fn ok(state: Option<LibraryInstallationState>) -> Self {
        Self { success: true, cancelled: false, state, errors: Vec::new() }
    }

    pub fn failed(state: Option<LibraryInstallationState>, errors: Vec<OperationError>) -> Self {
        Self { success: false, cancelled: false, state, errors }
    }

    pub fn cancelled(state: Option<LibraryInstallationState>) -> Self {
        Self { success: false, cancelled: true, state, errors: Vec::new() }
    }

    pub fn from_failure(state: Option<LibraryInstallationState>, failure: Failure) -> Self {
        match failure {
            Failure::Cancelled => Self::cancelled(state),
            Failure::Errors(errors) => Self::failed(state, errors),
        }
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}
