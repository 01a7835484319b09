//! Catalog seam: per-provider search, version resolution, and
//! editor-completion sets, plus the shared semver ordering helpers.

use semver::Version;

use crate::cancellation::CancellationToken;
use crate::error::Failure;
use crate::naming::NamingScheme;

/// One search hit: a library name with its description and known versions
/// (descending).
#[derive(Clone, Debug, PartialEq)]
pub struct LibraryGroup {
    pub display_name: String,
    pub description: Option<String>,
    pub versions: Vec<String>,
}

impl LibraryGroup {
    /// Canonical ids for this group's known versions.
    pub fn library_ids(&self, scheme: &dyn NamingScheme) -> Vec<String> {
        self.versions
            .iter()
            .map(|v| scheme.build(&self.display_name, v))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LibraryFile {
    pub path: String,
    /// Whether the catalog marks this file as the library's default asset.
    pub default: bool,
}

/// A fully resolved (name, version) pair with its declared file list.
/// Immutable once produced by a catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedLibrary {
    pub name: String,
    pub version: String,
    pub provider_id: String,
    pub files: Vec<LibraryFile>,
}

impl ResolvedLibrary {
    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn offers(&self, file: &str) -> bool {
        self.files.iter().any(|f| f.path == file)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionItem {
    pub display_text: String,
    pub insertion_text: String,
}

/// Completions plus the span of the input they replace, ready for an editor
/// suggestion UI.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletionSet {
    pub start: usize,
    pub length: usize,
    pub completions: Vec<CompletionItem>,
}

pub trait Catalog: Send + Sync {
    /// Empty term means the unfiltered/default result set; a term matching
    /// nothing yields an empty sequence, never an error. Ordering is
    /// deterministic: names lexical, versions descending.
    fn search(
        &self,
        term: &str,
        max_hits: usize,
        token: &CancellationToken,
    ) -> Result<Vec<LibraryGroup>, Failure>;

    /// Fails with InvalidLibrary when the name is unknown or the version does
    /// not exist for that name.
    fn get_library(
        &self,
        name: &str,
        version: &str,
        token: &CancellationToken,
    ) -> Result<ResolvedLibrary, Failure>;

    /// Highest version under semver ordering; None when no candidate exists.
    fn get_latest_version(
        &self,
        name: &str,
        include_prerelease: bool,
        token: &CancellationToken,
    ) -> Result<Option<String>, Failure>;

    fn get_completion_set(
        &self,
        partial_library_id: &str,
        caret_position: usize,
        token: &CancellationToken,
    ) -> Result<CompletionSet, Failure>;
}

/// Descending semantic-version order; non-semver strings sort after,
/// lexically descending, so listings stay deterministic.
pub fn sort_versions_descending(versions: &mut [String]) {
    versions.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => vb.cmp(&va),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => b.cmp(a),
    });
}

/// Highest version under semver ordering. With include_prerelease = false,
/// prerelease-tagged versions never participate in the comparison at all, so
/// 4.0.0-beta.1 can never win over 3.9.0.
pub fn latest_version(versions: &[String], include_prerelease: bool) -> Option<String> {
    let mut best: Option<Version> = None;
    for raw in versions {
        let Ok(v) = Version::parse(raw.trim()) else {
            continue;
        };
        if !include_prerelease && !v.pre.is_empty() {
            continue;
        }
        if best.as_ref().map_or(true, |b| v > *b) {
            best = Some(v);
        }
    }
    best.map(|v| v.to_string())
}

/// Which segment of a partial `name@version` id the caret sits in.
pub enum CompletionSegment {
    Name,
    Version { name: String, version_start: usize },
}

/// Scoped-name aware: the separator is the last '@' past position zero.
pub fn completion_segment(partial: &str, caret: usize) -> CompletionSegment {
    match partial.rfind('@') {
        Some(idx) if idx > 0 && caret > idx => CompletionSegment::Version {
            name: partial[..idx].to_string(),
            version_start: idx + 1,
        },
        _ => CompletionSegment::Name,
    }
}

/// Shared completion builder for `name@version` catalogs. `search` supplies
/// candidate groups for a name prefix; `versions` supplies the descending
/// version list for an exact name.
pub(crate) fn completion_set_for<S, V>(
    partial: &str,
    caret: usize,
    search: S,
    versions: V,
) -> Result<CompletionSet, Failure>
where
    S: FnOnce(&str) -> Result<Vec<LibraryGroup>, Failure>,
    V: FnOnce(&str) -> Result<Vec<String>, Failure>,
{
    match completion_segment(partial, caret) {
        CompletionSegment::Name => {
            let groups = search(partial)?;
            let completions = groups
                .into_iter()
                .map(|group| {
                    // Carry a default version so the insertion is a complete id.
                    let insertion = match latest_version(&group.versions, false)
                        .or_else(|| group.versions.first().cloned())
                    {
                        Some(v) => format!("{}@{}", group.display_name, v),
                        None => group.display_name.clone(),
                    };
                    CompletionItem {
                        display_text: group.display_name,
                        insertion_text: insertion,
                    }
                })
                .collect();
            Ok(CompletionSet { start: 0, length: partial.len(), completions })
        }
        CompletionSegment::Version { name, version_start } => {
            let list = versions(&name)?;
            let completions = list
                .into_iter()
                .map(|v| CompletionItem { display_text: v.clone(), insertion_text: v })
                .collect();
            Ok(CompletionSet {
                start: version_start,
                length: partial.len() - version_start,
                completions,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_latest_version_excludes_prerelease() {
        let versions = v(&["3.9.0", "4.0.0-beta.1", "2.0.0"]);
        assert_eq!(latest_version(&versions, false).as_deref(), Some("3.9.0"));
        assert_eq!(latest_version(&versions, true).as_deref(), Some("4.0.0-beta.1"));
    }

    #[test]
    fn test_latest_version_none_without_candidates() {
        assert_eq!(latest_version(&[], false), None);
        // Only prereleases and the caller excludes them.
        assert_eq!(latest_version(&v(&["1.0.0-rc.1"]), false), None);
        // Unparseable strings are skipped, not errors.
        assert_eq!(latest_version(&v(&["not-a-version"]), true), None);
    }

    #[test]
    fn test_sort_versions_descending() {
        let mut versions = v(&["1.2.0", "10.0.0", "1.10.0", "weird", "2.0.0-rc.1"]);
        sort_versions_descending(&mut versions);
        assert_eq!(versions, v(&["10.0.0", "2.0.0-rc.1", "1.10.0", "1.2.0", "weird"]));
    }

    #[test]
    fn test_completion_segment_caret_positions() {
        // Caret inside the name part.
        assert!(matches!(completion_segment("jque", 4), CompletionSegment::Name));
        // Caret past the separator completes versions.
        match completion_segment("jquery@3.", 9) {
            CompletionSegment::Version { name, version_start } => {
                assert_eq!(name, "jquery");
                assert_eq!(version_start, 7);
            }
            CompletionSegment::Name => panic!("expected version segment"),
        }
        // A scoped name's leading '@' is not a separator.
        assert!(matches!(completion_segment("@types/nod", 10), CompletionSegment::Name));
        match completion_segment("@types/node@18", 14) {
            CompletionSegment::Version { name, .. } => assert_eq!(name, "@types/node"),
            CompletionSegment::Name => panic!("expected version segment"),
        }
    }

    #[test]
    fn test_completion_set_spans() {
        let set = completion_set_for(
            "jque",
            4,
            |term| {
                assert_eq!(term, "jque");
                Ok(vec![LibraryGroup {
                    display_name: "jquery".to_string(),
                    description: None,
                    versions: v(&["3.6.0", "4.0.0-beta.1"]),
                }])
            },
            |_| unreachable!("name segment must not ask for versions"),
        )
        .unwrap();
        assert_eq!(set.start, 0);
        assert_eq!(set.length, 4);
        assert_eq!(set.completions[0].insertion_text, "jquery@3.6.0");

        let set = completion_set_for(
            "jquery@3",
            8,
            |_| unreachable!("version segment must not search"),
            |name| {
                assert_eq!(name, "jquery");
                Ok(v(&["3.6.0", "3.5.1"]))
            },
        )
        .unwrap();
        assert_eq!(set.start, 7);
        assert_eq!(set.length, 1);
        assert_eq!(set.completions.len(), 2);
    }

    #[test]
    fn test_library_ids_use_scheme() {
        let group = LibraryGroup {
            display_name: "jquery".to_string(),
            description: None,
            versions: v(&["3.6.0", "3.5.1"]),
        };
        let ids = group.library_ids(&crate::naming::VersionedNamingScheme);
        assert_eq!(ids, v(&["jquery@3.6.0", "jquery@3.5.1"]));
    }
}
