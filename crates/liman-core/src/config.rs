//! Env-first configuration: cache root, manifest name, freshness knobs.
//! CLI flags and env override everything; defaults live here.

use std::env;
use std::path::PathBuf;

pub const MANIFEST_NAME: &str = "liman.json";
pub const LOG_FILE: &str = "logs.txt";

/// Manifest format versions this build understands.
pub const SUPPORTED_MANIFEST_VERSIONS: &[&str] = &["1.0"];
pub const DEFAULT_MANIFEST_VERSION: &str = "1.0";

const DEFAULT_METADATA_TTL_HOURS: i64 = 24;

/// Cache root: LIMAN_CACHE_DIR if set, otherwise ~/.liman-cache.
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = env::var("LIMAN_CACHE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".liman-cache")
}

/// How long cached catalog/search documents stay fresh. Per-version asset
/// files never expire (content is keyed by exact version).
pub fn metadata_ttl_hours() -> i64 {
    env::var("LIMAN_METADATA_TTL_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .unwrap_or(DEFAULT_METADATA_TTL_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_versions_include_default() {
        assert!(SUPPORTED_MANIFEST_VERSIONS.contains(&DEFAULT_MANIFEST_VERSION));
    }
}
