use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Group bucket for records whose creator or package name is unknown.
pub const UNKNOWN_GROUP: &str = "Unknown";

const LATEST_VERSION: &str = "latest";

/// The `(creator, packageName, version)` triple naming a package release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub version: String,
}

impl Identity {
    pub fn new(creator: &str, package_name: &str, version: &str) -> Self {
        Self {
            creator: creator.to_string(),
            package_name: package_name.to_string(),
            version: version.to_string(),
        }
    }

    /// Parse `Creator.Package.Version`. Anything after the second dot is the version.
    pub fn parse(id: &str) -> Option<Self> {
        let mut parts = id.splitn(3, '.');
        let creator = parts.next()?;
        let package_name = parts.next()?;
        let version = parts.next().unwrap_or_default();
        Some(Self::new(creator, package_name, version))
    }

    pub fn is_known(&self) -> bool {
        !self.creator.trim().is_empty() && !self.package_name.trim().is_empty()
    }

    /// `creator.packageName.version`, as declared.
    pub fn id(&self) -> String {
        format!("{}.{}.{}", self.creator, self.package_name, self.version)
    }

    /// Lowercased full identity used for lookups.
    pub fn lookup_id(&self) -> String {
        self.id().to_lowercase()
    }

    /// Lowercased `creator.packageName`, used to resolve `.latest` and fallback references.
    pub fn lookup_base(&self) -> String {
        format!("{}.{}", self.creator, self.package_name).to_lowercase()
    }

    pub fn group_key(&self) -> String {
        if self.is_known() {
            format!("{}.{}", self.creator, self.package_name)
        } else {
            UNKNOWN_GROUP.to_string()
        }
    }

    pub fn version_number(&self) -> u64 {
        parse_version(&self.version)
    }
}

/// One physical package file in a library snapshot.
///
/// The scanner owns every field except `is_obsolete`, `is_exact_duplicate` and
/// `missing_dependencies`, which only the classifier writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub file_path: String,
    pub file_name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub declared_dependencies: BTreeSet<String>,
    pub is_enabled: bool,
    #[serde(default)]
    pub is_obsolete: bool,
    #[serde(default)]
    pub is_exact_duplicate: bool,
    #[serde(default)]
    pub missing_dependencies: Vec<String>,
}

impl PackageRecord {
    pub fn new(file_path: &str, identity: Identity, size_bytes: u64, is_enabled: bool) -> Self {
        let file_name = file_name_of(file_path).to_string();
        Self {
            file_path: file_path.to_string(),
            file_name,
            size_bytes,
            identity,
            declared_dependencies: BTreeSet::new(),
            is_enabled,
            is_obsolete: false,
            is_exact_duplicate: false,
            missing_dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn group_key(&self) -> String {
        self.identity.group_key()
    }

    /// `GroupKey.version.sizeBytes`: equal keys are treated as identical content.
    ///
    /// Records without an identity get a key of their own path, so they never
    /// count as copies of each other.
    pub fn exact_key(&self) -> String {
        if !self.identity.is_known() {
            return format!("{}:{}", UNKNOWN_GROUP, self.file_path);
        }
        format!(
            "{}.{}.{}",
            self.group_key(),
            self.identity.version,
            self.size_bytes
        )
    }

    pub fn version_number(&self) -> u64 {
        self.identity.version_number()
    }

    pub fn is_in_root(&self, library_root: &str) -> bool {
        is_in_root(&self.file_path, library_root)
    }

    /// Drop everything the classifier owns.
    pub fn clear_annotations(&mut self) {
        self.is_obsolete = false;
        self.is_exact_duplicate = false;
        self.missing_dependencies.clear();
    }
}

/// Leading-integer version heuristic. A single leading `v` is skipped, so
/// `"12"`, `"v12"` and `"12.3-beta"` all yield 12; anything without a numeric
/// prefix yields 0.
pub fn parse_version(version: &str) -> u64 {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let digits: &str = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(end) => &trimmed[..end],
        None => trimmed,
    };
    if digits.is_empty() {
        return 0;
    }
    digits.parse::<u64>().unwrap_or(u64::MAX)
}

/// A declared dependency id split into its lookup parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    /// Lowercased full id.
    pub lookup_id: String,
    /// Lowercased `creator.packageName`, when the id has at least two segments.
    pub base: Option<String>,
    /// True when the version segment is the literal `latest`.
    pub is_latest: bool,
}

impl DependencyRef {
    pub fn parse(dep_id: &str) -> Self {
        let lookup_id = dep_id.trim().to_lowercase();
        let mut parts = lookup_id.splitn(3, '.');
        let base = match (parts.next(), parts.next()) {
            (Some(creator), Some(name)) if !creator.is_empty() && !name.is_empty() => {
                Some(format!("{}.{}", creator, name))
            }
            _ => None,
        };
        let is_latest = parts.next() == Some(LATEST_VERSION);
        Self {
            lookup_id,
            base,
            is_latest,
        }
    }
}

/// Case-insensitive glob patterns naming system/core dependency namespaces.
#[derive(Debug, Clone, Default)]
pub struct SystemPatterns {
    patterns: Vec<Pattern>,
}

impl SystemPatterns {
    pub fn new(globs: &[String]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(&glob.to_lowercase()) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("Invalid system pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, dep_id: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let dep = dep_id.trim();
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(dep, options))
    }
}

/// Lowercase, forward-slash, no trailing separator.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    unified.trim_end_matches('/').to_lowercase()
}

pub fn file_name_of(path: &str) -> &str {
    path.rsplit(&['/', '\\'][..]).next().unwrap_or(path)
}

/// True when the file sits directly in `library_root` (not in a subfolder).
pub fn is_in_root(file_path: &str, library_root: &str) -> bool {
    if library_root.trim().is_empty() {
        return false;
    }
    let file = normalize_path(file_path);
    let parent = match file.rfind('/') {
        Some(idx) => &file[..idx],
        None => "",
    };
    parent == normalize_path(library_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_leading_integer() {
        assert_eq!(parse_version("12"), 12);
        assert_eq!(parse_version("3.1.4"), 3);
        assert_eq!(parse_version("v7"), 7);
        assert_eq!(parse_version(" 42beta"), 42);
        assert_eq!(parse_version("latest"), 0);
        assert_eq!(parse_version(""), 0);
        assert_eq!(parse_version("vv2"), 0);
    }

    #[test]
    fn test_unknown_group_for_missing_fields() {
        let identity = Identity::new("", "Pack", "1");
        assert_eq!(identity.group_key(), UNKNOWN_GROUP);
        let identity = Identity::new("Creator", "  ", "1");
        assert_eq!(identity.group_key(), UNKNOWN_GROUP);
        let identity = Identity::new("Creator", "Pack", "1");
        assert_eq!(identity.group_key(), "Creator.Pack");
    }

    #[test]
    fn test_exact_key_includes_size() {
        let a = PackageRecord::new("/lib/A.P.1.var", Identity::new("A", "P", "1"), 100, true);
        let b = PackageRecord::new("/lib/sub/A.P.1.var", Identity::new("A", "P", "1"), 101, true);
        assert_eq!(a.exact_key(), "A.P.1.100");
        assert_ne!(a.exact_key(), b.exact_key());
    }

    #[test]
    fn test_exact_key_unique_without_identity() {
        let a = PackageRecord::new("/lib/foo.var", Identity::default(), 3, true);
        let b = PackageRecord::new("/lib/sub/bar.var", Identity::default(), 3, true);
        assert_eq!(a.group_key(), b.group_key());
        assert_ne!(a.exact_key(), b.exact_key());
    }

    #[test]
    fn test_dependency_ref_parse() {
        let dep = DependencyRef::parse("CreatorY.Lib.Latest");
        assert_eq!(dep.lookup_id, "creatory.lib.latest");
        assert_eq!(dep.base.as_deref(), Some("creatory.lib"));
        assert!(dep.is_latest);

        let dep = DependencyRef::parse("Loose");
        assert!(dep.base.is_none());
        assert!(!dep.is_latest);
    }

    #[test]
    fn test_system_patterns_case_insensitive() {
        let patterns = SystemPatterns::new(&["vam.core*".to_string(), "system.*".to_string()]);
        assert!(patterns.matches("VaM.Core.latest"));
        assert!(patterns.matches("system.Shaders.1"));
        assert!(!patterns.matches("CreatorY.Lib.2"));
    }

    #[test]
    fn test_is_in_root() {
        assert!(is_in_root("/games/AddonPackages/A.P.1.var", "/games/AddonPackages/"));
        assert!(is_in_root("C:\\Games\\AddonPackages\\A.P.1.var", "c:/games/addonpackages"));
        assert!(!is_in_root("/games/AddonPackages/sub/A.P.1.var", "/games/AddonPackages"));
        assert!(!is_in_root("/games/AddonPackages/A.P.1.var", ""));
    }

    #[test]
    fn test_identity_parse() {
        let id = Identity::parse("CreatorX.Pack.1.2").unwrap();
        assert_eq!(id.creator, "CreatorX");
        assert_eq!(id.package_name, "Pack");
        assert_eq!(id.version, "1.2");
        assert!(Identity::parse("Lonely").is_none());
    }
}
