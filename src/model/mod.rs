//! Shared data model for dependency scanning.
//!
//! Every ecosystem scanner normalises its manifest syntax into the same
//! [`Dependency`] record so the walker, tree builder, and output layers
//! never need ecosystem-specific knowledge. Records are deduplicated and
//! conflict-tracked by [`DependencyKey`], the `(ecosystem, name)` pair,
//! never by version alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod filter;
pub use filter::FilterSet;

/// Sentinel prefix marking a version that redirects deeper scanning to a
/// local filesystem path instead of a remote checkout (Go `replace`
/// directives pointing at `../sibling` produce these).
pub const LOCAL_VERSION_PREFIX: &str = "local:";

/// Parent key used for records discovered in the root manifests.
pub const ROOT_PARENT: &str = "root";

/// Ecosystem family a dependency was declared in.
///
/// Doubles as the scanner tag: the registry maps `Ecosystem::as_str()`
/// to the scanner that owns the manifest family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// Go module dependency (`go.mod` / `go.sum`).
    Go,
    /// Go extended-standard-library module (`golang.org/x/*`).
    Stdlib,
    /// Python package (`requirements.txt`, `Pipfile`, `pyproject.toml`, ...).
    Pip,
    /// Node package (`package.json` and its lockfiles).
    Npm,
    /// Container image reference (`Dockerfile`, compose files).
    Docker,
    /// Helm chart dependency (`Chart.yaml`, `values.yaml`, ...).
    Helm,
}

impl Ecosystem {
    /// Short lower-case tag used in scan jobs, filters, and wire output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Stdlib => "stdlib",
            Self::Pip => "pip",
            Self::Npm => "npm",
            Self::Docker => "docker",
            Self::Helm => "helm",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "go" => Ok(Self::Go),
            "stdlib" => Ok(Self::Stdlib),
            "pip" => Ok(Self::Pip),
            "npm" => Ok(Self::Npm),
            "docker" => Ok(Self::Docker),
            "helm" => Ok(Self::Helm),
            other => Err(format!("unknown ecosystem tag: {other}")),
        }
    }
}

/// Deduplication and conflict-tracking key: `(ecosystem, name)`.
///
/// Two records with the same key but different versions are the *same*
/// dependency observed at divergent versions, which is what the conflict
/// detector reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyKey {
    /// Ecosystem tag half of the key.
    pub ecosystem: Ecosystem,
    /// Opaque ecosystem-specific identifier half of the key.
    pub name: String,
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ecosystem, self.name)
    }
}

/// A single declared dependency, normalised across ecosystems.
///
/// The wire shape is stable (camelCase, empty optionals omitted):
///
/// ```json
/// { "name": "github.com/a/b", "version": "v1.2.3", "type": "go",
///   "source": "go.mod:4", "git": "https://github.com/a/b", "depth": 0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Ecosystem-specific identifier: module path, package id, image
    /// reference, chart name.
    pub name: String,

    /// Version exactly as declared: a semver, a pseudo-version, a digest
    /// (`@sha256:...`), `latest`, `local:<path>`, or empty. Constraints
    /// are never resolved.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Ecosystem tag.
    #[serde(rename = "type")]
    pub ecosystem: Ecosystem,

    /// Human-readable origin, e.g. `go.mod:42`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    /// Canonical remote URL when resolvable. Empty forbids deeper
    /// traversal through this record.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git: String,

    /// Sub-package identifiers folded into this record (e.g. the original
    /// chart name when an `alias` replaced it).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package: Vec<String>,

    /// BFS distance from the scan root; 0 for direct dependencies.
    #[serde(default)]
    pub depth: u32,

    /// Declared as indirect in the manifest (`// indirect` in go.mod).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub indirect: bool,

    /// Original declaration when a replace directive rewrote this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_from: Option<String>,
}

impl Dependency {
    /// Creates a record with the fields every scanner fills in; the rest
    /// default to empty.
    #[must_use]
    pub fn new(
        ecosystem: Ecosystem,
        name: impl Into<String>,
        version: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem,
            source: source.into(),
            git: String::new(),
            package: Vec::new(),
            depth: 0,
            indirect: false,
            resolved_from: None,
        }
    }

    /// Builder-style setter for the canonical remote URL.
    #[must_use]
    pub fn with_git(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    /// The `(ecosystem, name)` deduplication key.
    #[must_use]
    pub fn key(&self) -> DependencyKey {
        DependencyKey {
            ecosystem: self.ecosystem,
            name: self.name.clone(),
        }
    }

    /// Whether the version redirects traversal to a local path.
    #[must_use]
    pub fn is_local_replacement(&self) -> bool {
        self.version.starts_with(LOCAL_VERSION_PREFIX)
    }

    /// The filesystem path carried by a `local:<path>` version.
    #[must_use]
    pub fn local_replacement_path(&self) -> Option<&str> {
        self.version.strip_prefix(LOCAL_VERSION_PREFIX)
    }

    /// Tests this record against a filter expression.
    ///
    /// Both `name` and `git` are offered to each pattern; the first match
    /// wins. An empty filter always matches.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use depscan_cli::model::{Dependency, Ecosystem, FilterSet};
    ///
    /// let dep = Dependency::new(Ecosystem::Go, "github.com/a/b", "v1.0.0", "go.mod:3")
    ///     .with_git("https://github.com/a/b");
    ///
    /// assert!(dep.matches(&FilterSet::parse("github.com/*")?));
    /// assert!(dep.matches(&FilterSet::parse("")?));
    /// assert!(!dep.matches(&FilterSet::parse("gitlab.com/*")?));
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    #[must_use]
    pub fn matches(&self, filter: &FilterSet) -> bool {
        filter.matches_record(&self.name, &self.git)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_version() {
        let a = Dependency::new(Ecosystem::Go, "github.com/x/y", "v1.0.0", "go.mod:3");
        let b = Dependency::new(Ecosystem::Go, "github.com/x/y", "v2.0.0", "go.mod:9");
        assert_eq!(a.key(), b.key());

        let c = Dependency::new(Ecosystem::Npm, "github.com/x/y", "v1.0.0", "package.json");
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn local_replacement_round_trip() {
        let mut dep = Dependency::new(Ecosystem::Go, "example.com/m", "v1.0.0", "go.mod:2");
        assert!(!dep.is_local_replacement());

        dep.version = format!("{LOCAL_VERSION_PREFIX}../other");
        assert!(dep.is_local_replacement());
        assert_eq!(dep.local_replacement_path(), Some("../other"));
    }

    #[test]
    fn wire_shape_omits_empty_optionals() {
        let dep = Dependency::new(Ecosystem::Docker, "nginx", "1.27", "Dockerfile:1");
        let json = serde_json::to_value(&dep).unwrap();
        assert_eq!(json["type"], "docker");
        assert_eq!(json["depth"], 0);
        assert!(json.get("git").is_none());
        assert!(json.get("package").is_none());
        assert!(json.get("indirect").is_none());
        assert!(json.get("resolvedFrom").is_none());
    }

    #[test]
    fn resolved_from_serializes_camel_case() {
        let mut dep = Dependency::new(Ecosystem::Go, "X", "v2.0.0", "go.mod:5");
        dep.resolved_from = Some("X v1.0.0".to_string());
        let json = serde_json::to_value(&dep).unwrap();
        assert_eq!(json["resolvedFrom"], "X v1.0.0");
    }
}
