//! Result aggregation: flat list, tree, and version conflicts.
//!
//! The walker accumulates a [`WalkState`] (the per-parent record lists
//! plus the visited-dependency table) and hands it here once the task
//! group drains. The builder produces the stable wire-shaped
//! [`ScanResult`]: a deduplicated flat list (shallowest depth preferred,
//! first arrival wins among equals), the root references in insertion
//! order, one [`VersionConflict`] per key observed at two or more
//! distinct non-empty versions, and the scan metadata.
//!
//! Conflicts are computed over emitted records only, so they are always
//! reproducible from the returned flat list and its version history.

use crate::model::{Dependency, DependencyKey, ROOT_PARENT};
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;

/// Conflicts are reported, never auto-resolved; the strategy label is
/// fixed.
pub const RESOLUTION_STRATEGY: &str = "latest";

/// One observation of a dependency's version during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInstance {
    /// The declared version.
    pub version: String,
    /// Depth the observation happened at.
    pub depth: u32,
    /// Parent record (or `"root"`) that declared it.
    pub parent: String,
}

/// Everything known about one `(type, name)` key after the walk.
#[derive(Debug, Clone)]
pub struct VisitedDependency {
    /// Depth of the first observation.
    pub first_seen: u32,
    /// Every depth the key was observed at, in arrival order.
    pub seen_at: Vec<u32>,
    /// Every version observation, in arrival order.
    pub versions: Vec<VersionInstance>,
    /// The record that represents this key in the flat list.
    pub record: Dependency,
    /// Arrival sequence number of the first observation.
    pub arrival: u64,
}

/// Shared mutable state the walker accumulates under lock.
#[derive(Debug, Default)]
pub struct WalkState {
    /// Parent key mapped to the records discovered under it, in scanner order.
    pub discovered: HashMap<String, Vec<Dependency>>,
    /// The visited-dependency table.
    pub visited: HashMap<DependencyKey, VisitedDependency>,
    next_seq: u64,
}

impl WalkState {
    /// Records one post-filter dependency observation.
    pub fn note(&mut self, dep: &Dependency, parent: &str) {
        let instance = VersionInstance {
            version: dep.version.clone(),
            depth: dep.depth,
            parent: parent.to_string(),
        };
        match self.visited.entry(dep.key()) {
            Entry::Vacant(slot) => {
                slot.insert(VisitedDependency {
                    first_seen: dep.depth,
                    seen_at: vec![dep.depth],
                    versions: vec![instance],
                    record: dep.clone(),
                    arrival: self.next_seq,
                });
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                entry.seen_at.push(dep.depth);
                entry.versions.push(instance);
                // Shallowest depth wins; first arrival wins among equals.
                if dep.depth < entry.record.depth {
                    entry.record = dep.clone();
                }
            }
        }
        self.next_seq += 1;
    }

    /// Appends records to a parent's discovery list.
    pub fn append_discovered(&mut self, parent: &str, deps: &[Dependency]) {
        if deps.is_empty() {
            return;
        }
        self.discovered
            .entry(parent.to_string())
            .or_default()
            .extend_from_slice(deps);
    }

    /// Highest depth any record was observed at.
    #[must_use]
    pub fn max_depth_observed(&self) -> u32 {
        self.visited
            .values()
            .flat_map(|v| v.seen_at.iter().copied())
            .max()
            .unwrap_or(0)
    }
}

/// A version string with optional commit metadata.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictVersion {
    /// The declared version.
    pub version: String,
    /// Commit the version resolved to, when known.
    #[serde(rename = "commitSHA", skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    /// Commit timestamp, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_date: Option<String>,
}

/// Divergent versions observed for one dependency key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConflict {
    /// The dependency's name.
    pub dependency_name: String,
    /// The distinct non-empty versions, in first-seen order.
    pub versions: Vec<ConflictVersion>,
    /// Always [`RESOLUTION_STRATEGY`].
    pub resolution_strategy: String,
}

/// How the scan was rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// Local tree, no traversal requested.
    Local,
    /// Remote repository root.
    Git,
    /// Local tree with traversal (`maxDepth > 0`).
    Mixed,
}

/// Result metadata block.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMetadata {
    /// How the scan was rooted.
    pub scan_type: ScanType,
    /// The requested depth bound.
    pub max_depth: u32,
    /// Unique non-empty git URLs among the emitted records.
    pub repositories_found: usize,
    /// Length of the flat dependency list.
    pub total_dependencies: usize,
    /// Number of version conflicts.
    pub conflicts_found: usize,
    /// Root of the repository manager's cache.
    pub git_cache_dir: PathBuf,
}

/// The stable wire-shaped scan result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Deduplicated flat list in first-arrival order.
    pub dependencies: Vec<Dependency>,
    /// Version conflicts among the emitted records.
    pub conflicts: Vec<VersionConflict>,
    /// Summary metadata.
    pub metadata: ScanMetadata,
}

/// Parent-keyed view of the walk for tree-style rendering.
#[derive(Debug, Clone)]
pub struct DependencyTree {
    /// Names of the depth-0 records, in insertion order, deduplicated by
    /// key.
    pub root_refs: Vec<String>,
    /// Parent name mapped to its child records.
    pub children: HashMap<String, Vec<Dependency>>,
    /// Highest depth observed during the walk.
    pub max_depth: u32,
}

/// Builds the final result from the drained walk state.
#[must_use]
pub fn build_result(
    state: &WalkState,
    scan_type: ScanType,
    max_depth: u32,
    git_cache_dir: PathBuf,
) -> ScanResult {
    let mut flat: Vec<&VisitedDependency> = state.visited.values().collect();
    flat.sort_by_key(|entry| entry.arrival);
    let dependencies: Vec<Dependency> = flat.iter().map(|entry| entry.record.clone()).collect();

    let mut conflicts: Vec<VersionConflict> = Vec::new();
    for entry in &flat {
        let mut distinct: Vec<String> = Vec::new();
        for instance in &entry.versions {
            if !instance.version.is_empty() && !distinct.contains(&instance.version) {
                distinct.push(instance.version.clone());
            }
        }
        if distinct.len() > 1 {
            conflicts.push(VersionConflict {
                dependency_name: entry.record.name.clone(),
                versions: distinct
                    .into_iter()
                    .map(|version| ConflictVersion {
                        version,
                        commit_sha: None,
                        commit_date: None,
                    })
                    .collect(),
                resolution_strategy: RESOLUTION_STRATEGY.to_string(),
            });
        }
    }

    let repositories_found = {
        let mut repos: Vec<&str> = dependencies
            .iter()
            .map(|d| d.git.as_str())
            .filter(|git| !git.is_empty())
            .collect();
        repos.sort_unstable();
        repos.dedup();
        repos.len()
    };

    let metadata = ScanMetadata {
        scan_type,
        max_depth,
        repositories_found,
        total_dependencies: dependencies.len(),
        conflicts_found: conflicts.len(),
        git_cache_dir,
    };

    ScanResult {
        dependencies,
        conflicts,
        metadata,
    }
}

/// Builds the parent-keyed tree view from the drained walk state.
#[must_use]
pub fn build_tree(state: &WalkState) -> DependencyTree {
    let mut root_refs = Vec::new();
    let mut seen_roots = Vec::new();
    if let Some(roots) = state.discovered.get(ROOT_PARENT) {
        for dep in roots {
            let key = dep.key();
            if !seen_roots.contains(&key) {
                root_refs.push(dep.name.clone());
                seen_roots.push(key);
            }
        }
    }

    DependencyTree {
        root_refs,
        children: state.discovered.clone(),
        max_depth: state.max_depth_observed(),
    }
}
