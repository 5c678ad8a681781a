//! Per-directory scan job discovery.
//!
//! Expands each registered scanner's filename patterns against the
//! immediate contents of one directory (never recursively; descending
//! into other repositories is the walker's job) and produces the scan
//! jobs for that directory. A directory with no manifest files yields
//! zero jobs, which is a perfectly valid outcome.

use crate::model::ROOT_PARENT;
use crate::scanner::ScannerRegistry;
use anyhow::{Context, Result};
use glob::Pattern;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One unit of work for the walker: a single manifest file to scan.
///
/// Jobs are ephemeral: created by discovery, executed once, discarded.
#[derive(Debug, Clone)]
pub struct ScanJob {
    /// Local directory the manifest lives in.
    pub base_path: PathBuf,
    /// Manifest filename relative to `base_path`.
    pub relative_file_path: PathBuf,
    /// Remote the directory was materialised from; empty for local jobs.
    pub git_url: String,
    /// Version the remote was materialised at; empty for local jobs.
    pub version: String,
    /// BFS depth the discovered records will carry.
    pub depth: u32,
    /// Dependency key of the enclosing record, or `"root"`.
    pub parent: String,
    /// Ecosystem tag of the scanner to invoke.
    pub scanner_tag: String,
    /// Whether this job reads from the original local tree.
    pub is_local: bool,
}

impl ScanJob {
    /// Dedup key for the walker's `visitedJobs` set. Local jobs key on
    /// the absolute file path; remote jobs on `url@version` plus the
    /// in-repo file path, so every manifest is scanned exactly once.
    #[must_use]
    pub fn visit_key(&self) -> String {
        let file = self.relative_file_path.display();
        if self.is_local {
            format!("local:{}/{file}", self.base_path.display())
        } else {
            format!("git:{}@{}//{file}", self.git_url, self.version)
        }
    }

    /// Absolute path of the manifest file.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.base_path.join(&self.relative_file_path)
    }
}

/// Source description for a batch of discovered jobs.
#[derive(Debug, Clone, Default)]
pub struct JobOrigin {
    /// Remote URL, empty for the local tree.
    pub git_url: String,
    /// Materialised version, empty for the local tree.
    pub version: String,
    /// Depth for records found by these jobs.
    pub depth: u32,
    /// Parent dependency name, or `"root"`.
    pub parent: String,
}

impl JobOrigin {
    /// Origin for the root of a scan.
    #[must_use]
    pub fn root() -> Self {
        Self {
            parent: ROOT_PARENT.to_string(),
            ..Self::default()
        }
    }

    /// Whether these jobs read the original local tree (or a `local:`
    /// replacement directory) rather than a materialised remote.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.git_url.is_empty()
    }
}

/// Produces the ordered scan jobs for one directory.
///
/// Order is deterministic: scanners in registration order, each
/// scanner's patterns in declaration order, filenames alphabetically. A
/// file belongs to at most one scanner (first claim wins).
///
/// # Examples
///
/// ```rust,no_run
/// use depscan_cli::discovery::{JobOrigin, discover_jobs};
/// use depscan_cli::scanner::ScannerRegistry;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let registry = ScannerRegistry::builtin();
/// let jobs = discover_jobs(&registry, Path::new("./my-project"), &JobOrigin::root())?;
/// for job in &jobs {
///     println!("{} -> {}", job.relative_file_path.display(), job.scanner_tag);
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Fails when the directory cannot be read.
pub fn discover_jobs(
    registry: &ScannerRegistry,
    dir: &Path,
    origin: &JobOrigin,
) -> Result<Vec<ScanJob>> {
    let mut entries: Vec<String> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    entries.sort();

    let has_go_mod = entries.iter().any(|name| name == "go.mod");

    let mut jobs = Vec::new();
    let mut claimed: HashSet<String> = HashSet::new();

    for scanner in registry.scanners() {
        let tag = scanner.ecosystem().as_str();
        for pattern_str in scanner.file_patterns() {
            let Ok(pattern) = Pattern::new(pattern_str) else {
                tracing::warn!("scanner '{tag}' declares invalid pattern '{pattern_str}'");
                continue;
            };
            for name in entries.iter().filter(|name| pattern.matches(name)) {
                // go.sum only stands in when no go.mod is present; the
                // lockfile alone still names every module.
                if name == "go.sum" && has_go_mod {
                    continue;
                }
                if !claimed.insert(name.clone()) {
                    continue;
                }
                jobs.push(ScanJob {
                    base_path: dir.to_path_buf(),
                    relative_file_path: PathBuf::from(name),
                    git_url: origin.git_url.clone(),
                    version: origin.version.clone(),
                    depth: origin.depth,
                    parent: origin.parent.clone(),
                    scanner_tag: tag.to_string(),
                    is_local: origin.is_local(),
                });
            }
        }
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn empty_directory_yields_no_jobs() {
        let dir = TempDir::new().unwrap();
        let registry = ScannerRegistry::builtin();
        let jobs = discover_jobs(&registry, dir.path(), &JobOrigin::root()).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn gomod_shadows_gosum() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "go.mod");
        touch(dir.path(), "go.sum");
        let registry = ScannerRegistry::builtin();
        let jobs = discover_jobs(&registry, dir.path(), &JobOrigin::root()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].relative_file_path, PathBuf::from("go.mod"));
    }

    #[test]
    fn gosum_alone_is_scanned() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "go.sum");
        let registry = ScannerRegistry::builtin();
        let jobs = discover_jobs(&registry, dir.path(), &JobOrigin::root()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].scanner_tag, "go");
    }

    #[test]
    fn mixed_directory_routes_files_to_scanners() {
        let dir = TempDir::new().unwrap();
        for name in ["go.mod", "package.json", "Dockerfile", "Chart.yaml", "values.yaml", "README.md"] {
            touch(dir.path(), name);
        }
        let registry = ScannerRegistry::builtin();
        let jobs = discover_jobs(&registry, dir.path(), &JobOrigin::root()).unwrap();
        let tags: Vec<&str> = jobs.iter().map(|j| j.scanner_tag.as_str()).collect();
        assert_eq!(tags, ["go", "npm", "docker", "helm", "helm"]);
        assert!(jobs.iter().all(|j| j.is_local));
        assert!(jobs.iter().all(|j| j.parent == "root"));
    }

    #[test]
    fn discovery_is_not_recursive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "go.mod");
        let registry = ScannerRegistry::builtin();
        let jobs = discover_jobs(&registry, dir.path(), &JobOrigin::root()).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn visit_keys_distinguish_local_and_remote() {
        let local = ScanJob {
            base_path: PathBuf::from("/work/proj"),
            relative_file_path: PathBuf::from("go.mod"),
            git_url: String::new(),
            version: String::new(),
            depth: 0,
            parent: "root".to_string(),
            scanner_tag: "go".to_string(),
            is_local: true,
        };
        assert_eq!(local.visit_key(), "local:/work/proj/go.mod");

        let remote = ScanJob {
            git_url: "https://github.com/org/repo".to_string(),
            version: "v1".to_string(),
            is_local: false,
            ..local
        };
        assert_eq!(
            remote.visit_key(),
            "git:https://github.com/org/repo@v1//go.mod"
        );
    }
}
