//! Library identifier schemes: parse a canonical id into (name, version) and
//! build it back. Pure functions; each provider picks one scheme.

use crate::error::OperationError;

pub trait NamingScheme: Send + Sync {
    /// Split a library id into (name, version). Version is empty when the id
    /// carries none.
    fn parse(&self, library_id: &str) -> Result<(String, String), OperationError>;

    /// Build the canonical id from its parts. `build(parse(x)) == x` for
    /// every well-formed id of the scheme.
    fn build(&self, name: &str, version: &str) -> String;

    /// Separator between name and version segments, if the scheme has one.
    fn separator(&self) -> Option<char> {
        None
    }
}

/// `name@version`, npm-style: scoped names start with '@' so the split is on
/// the last '@' past position zero.
pub struct VersionedNamingScheme;

impl NamingScheme for VersionedNamingScheme {
    fn parse(&self, library_id: &str) -> Result<(String, String), OperationError> {
        let id = library_id.trim();
        if id.is_empty() || id == "@" {
            return Err(OperationError::malformed_identifier(library_id));
        }
        match id.rfind('@') {
            None | Some(0) => Ok((id.to_string(), String::new())),
            Some(idx) if idx == id.len() - 1 => {
                // Trailing separator with no version segment.
                Err(OperationError::malformed_identifier(library_id))
            }
            Some(idx) => Ok((id[..idx].to_string(), id[idx + 1..].to_string())),
        }
    }

    fn build(&self, name: &str, version: &str) -> String {
        if version.is_empty() {
            name.to_string()
        } else {
            format!("{}@{}", name, version)
        }
    }

    fn separator(&self) -> Option<char> {
        Some('@')
    }
}

/// Filesystem ids: the whole id is the name (a path); there is no version
/// segment.
pub struct PathNamingScheme;

impl NamingScheme for PathNamingScheme {
    fn parse(&self, library_id: &str) -> Result<(String, String), OperationError> {
        if library_id.trim().is_empty() {
            return Err(OperationError::malformed_identifier(library_id));
        }
        Ok((library_id.to_string(), String::new()))
    }

    fn build(&self, name: &str, _version: &str) -> String {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versioned_round_trip() {
        let scheme = VersionedNamingScheme;
        for id in ["jquery@3.6.0", "@types/node@18.0.0", "lodash", "@scope/pkg", "d3@7.0.0-rc.1"] {
            let (name, version) = scheme.parse(id).unwrap();
            assert_eq!(scheme.build(&name, &version), id, "{}", id);
        }
    }

    #[test]
    fn test_versioned_scoped_split() {
        let scheme = VersionedNamingScheme;
        let (name, version) = scheme.parse("@scope/pkg@1.2.3").unwrap();
        assert_eq!(name, "@scope/pkg");
        assert_eq!(version, "1.2.3");

        let (name, version) = scheme.parse("@scope/pkg").unwrap();
        assert_eq!(name, "@scope/pkg");
        assert_eq!(version, "");
    }

    #[test]
    fn test_versioned_malformed() {
        let scheme = VersionedNamingScheme;
        for bad in ["", "  ", "@", "jquery@", "@scope/pkg@"] {
            assert!(scheme.parse(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_path_scheme_keeps_id_whole() {
        let scheme = PathNamingScheme;
        let (name, version) = scheme.parse("vendor/lib@2/file.js").unwrap();
        assert_eq!(name, "vendor/lib@2/file.js");
        assert_eq!(version, "");
        assert_eq!(scheme.build(&name, &version), "vendor/lib@2/file.js");
    }
}
