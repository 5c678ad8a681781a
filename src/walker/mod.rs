//! Concurrent, depth-bounded dependency discovery.
//!
//! The walker drives the whole scan. Jobs (one manifest file each) run
//! as tasks in a [`tokio::task::JoinSet`]; each task returns the
//! follow-up jobs it discovered and the drain loop spawns them, so a
//! task never blocks on work it submitted. Parallelism is bounded by a
//! semaphore sized like the git subprocess budget (3× cores unless
//! configured).
//!
//! Three shared structures coordinate the walk:
//! - `visited_jobs`: one scan per manifest file (`local:` / `git:` keys)
//! - `visited_repos`: one materialisation per `url@version`, checked
//!   and marked at *scheduling* time, which is what breaks dependency
//!   cycles across ecosystems
//! - the [`WalkState`]: ordered per-parent record lists plus the
//!   visited-dependency table, under one mutex
//!
//! Failure semantics: everything that goes wrong inside a task (parse
//! error, unreadable file, failed checkout) is logged at warn level and
//! contributes zero records; only cancellation ends the walk early, and
//! even then the result carries whatever was gathered.

use crate::context::ScanContext;
use crate::core::DepscanError;
use crate::discovery::{JobOrigin, ScanJob, discover_jobs};
use crate::git::canonical_git_url;
use crate::locator::ScanLocator;
use crate::model::{Dependency, FilterSet};
use crate::repo::RepoManager;
use crate::scanner::ScannerRegistry;
use crate::tree::{DependencyTree, ScanResult, ScanType, WalkState, build_result, build_tree};
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Caller-tunable knobs for one scan.
#[derive(Debug, Default)]
pub struct ScanOptions {
    /// Depth bound; 0 scans only the root.
    pub max_depth: u32,
    /// Record filter.
    pub filter: FilterSet,
    /// Whether indirect records are emitted.
    pub show_indirect: bool,
    /// Parallelism bound; defaults to 3× available cores.
    pub max_parallel: Option<usize>,
    /// Externally-held cancellation flag.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// The discovery engine.
pub struct Walker {
    registry: Arc<ScannerRegistry>,
    repos: Arc<RepoManager>,
}

/// State shared by every task of one walk.
struct WalkShared {
    registry: Arc<ScannerRegistry>,
    repos: Arc<RepoManager>,
    ctx: ScanContext,
    visited_jobs: DashMap<String, ()>,
    visited_repos: DashMap<String, ()>,
    state: Mutex<WalkState>,
    semaphore: Arc<Semaphore>,
}

impl Walker {
    /// Creates a walker over a scanner registry and repository manager.
    #[must_use]
    pub fn new(registry: Arc<ScannerRegistry>, repos: Arc<RepoManager>) -> Self {
        Self { registry, repos }
    }

    /// The repository manager backing this walker.
    #[must_use]
    pub fn repos(&self) -> &Arc<RepoManager> {
        &self.repos
    }

    /// Runs a complete scan of `input` (a local directory or a remote
    /// `url[//subdir][@version]` reference).
    ///
    /// # Errors
    ///
    /// Fails only when the starting point cannot be enumerated: the
    /// registry is empty, the root path is missing, the top-level
    /// repository cannot be materialised, or a requested subdirectory
    /// does not exist. All intra-walk failures degrade to warnings.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use depscan_cli::model::FilterSet;
    /// use depscan_cli::repo::RepoManager;
    /// use depscan_cli::scanner::ScannerRegistry;
    /// use depscan_cli::walker::{ScanOptions, Walker};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let walker = Walker::new(
    ///     Arc::new(ScannerRegistry::builtin()),
    ///     Arc::new(RepoManager::new("/tmp/depscan-cache")),
    /// );
    ///
    /// let options = ScanOptions {
    ///     max_depth: 1,
    ///     filter: FilterSet::parse("github.com/*")?,
    ///     ..Default::default()
    /// };
    /// let (result, tree) = walker.scan("./my-project", options).await?;
    ///
    /// println!("{} dependencies, {} conflicts", result.dependencies.len(),
    ///     result.conflicts.len());
    /// for root in &tree.root_refs {
    ///     println!("root: {root}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scan(&self, input: &str, options: ScanOptions) -> Result<(ScanResult, DependencyTree)> {
        if self.registry.is_empty() {
            return Err(DepscanError::RegistryEmpty.into());
        }

        let locator = ScanLocator::parse(input);
        let (scan_root, origin, scan_type) = self.resolve_root(&locator, options.max_depth).await?;

        let mut ctx = ScanContext::new(scan_root.clone(), options.max_depth)
            .with_filter(options.filter)
            .with_show_indirect(options.show_indirect);
        if let Some(flag) = options.cancel {
            ctx = ctx.with_cancel_flag(flag);
        }

        let initial = discover_jobs(&self.registry, &scan_root, &origin)
            .with_context(|| format!("failed to enumerate scan root {}", scan_root.display()))?;
        tracing::debug!("root discovery produced {} job(s)", initial.len());

        let parallel = options.max_parallel.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get() * 3).unwrap_or(12)
        });
        let shared = Arc::new(WalkShared {
            registry: Arc::clone(&self.registry),
            repos: Arc::clone(&self.repos),
            ctx,
            visited_jobs: DashMap::new(),
            visited_repos: DashMap::new(),
            state: Mutex::new(WalkState::default()),
            semaphore: Arc::new(Semaphore::new(parallel.max(1))),
        });

        // The root repository itself counts as walked.
        if !origin.git_url.is_empty() {
            shared
                .visited_repos
                .insert(format!("{}@{}", origin.git_url, origin.version), ());
        }

        let mut tasks: JoinSet<Vec<ScanJob>> = JoinSet::new();
        for job in initial {
            spawn_job(&mut tasks, Arc::clone(&shared), job);
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(followups) => {
                    if shared.ctx.is_cancelled() {
                        continue; // drain without scheduling more work
                    }
                    for job in followups {
                        spawn_job(&mut tasks, Arc::clone(&shared), job);
                    }
                }
                Err(e) => tracing::warn!("scan task failed to join: {e}"),
            }
        }

        let state = shared
            .state
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default();
        let result = build_result(
            &state,
            scan_type,
            options.max_depth,
            self.repos.cache_root().to_path_buf(),
        );
        let tree = build_tree(&state);
        Ok((result, tree))
    }

    /// Classifies the input and produces the root directory to scan.
    async fn resolve_root(
        &self,
        locator: &ScanLocator,
        max_depth: u32,
    ) -> Result<(PathBuf, JobOrigin, ScanType)> {
        if locator.is_remote {
            let version = self
                .repos
                .resolve_version_alias(&locator.git_url, locator.effective_version())
                .await;
            let worktree = self
                .repos
                .get_worktree_path(&locator.git_url, &version)
                .await
                .with_context(|| format!("failed to materialise {}", locator.git_url))?;

            let root = if locator.subdirectory.is_empty() {
                worktree
            } else {
                let sub = worktree.join(&locator.subdirectory);
                if !sub.is_dir() {
                    return Err(DepscanError::SubdirectoryNotFound {
                        subdir: locator.subdirectory.clone(),
                        url: locator.git_url.clone(),
                    }
                    .into());
                }
                sub
            };

            let origin = JobOrigin {
                git_url: canonical_git_url(&locator.git_url),
                version,
                depth: 0,
                parent: crate::model::ROOT_PARENT.to_string(),
            };
            return Ok((root, origin, ScanType::Git));
        }

        let expanded = shellexpand::tilde(&locator.git_url).into_owned();
        let root = PathBuf::from(expanded);
        if !root.is_dir() {
            return Err(DepscanError::ScanRootNotFound {
                path: locator.git_url.clone(),
            }
            .into());
        }
        let root = root.canonicalize().unwrap_or(root);
        let scan_type = if max_depth > 0 { ScanType::Mixed } else { ScanType::Local };
        Ok((root, JobOrigin::root(), scan_type))
    }
}

fn spawn_job(tasks: &mut JoinSet<Vec<ScanJob>>, shared: Arc<WalkShared>, job: ScanJob) {
    tasks.spawn(async move { run_job(shared, job).await });
}

/// Executes one scan job and returns the follow-up jobs it schedules.
async fn run_job(shared: Arc<WalkShared>, job: ScanJob) -> Vec<ScanJob> {
    // Lookup-then-insert is atomic; a concurrent duplicate observes
    // "already present" and backs off.
    if shared.visited_jobs.insert(job.visit_key(), ()).is_some() {
        return Vec::new();
    }
    if shared.ctx.is_cancelled() {
        return Vec::new();
    }
    if job.depth > shared.ctx.max_depth {
        return Vec::new();
    }

    let _permit = match shared.semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return Vec::new(),
    };

    let file_path = job.file_path();
    let content = match tokio::fs::read_to_string(&file_path).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("cannot read {}: {e}", file_path.display());
            return Vec::new();
        }
    };

    let scanner = match shared.registry.get_or_err(&job.scanner_tag) {
        Ok(scanner) => scanner,
        Err(e) => {
            tracing::warn!("skipping {}: {e}", file_path.display());
            return Vec::new();
        }
    };

    let records = match scanner.scan_file(&shared.ctx, &file_path, &content) {
        Ok(mut records) => {
            for record in &mut records {
                record.depth = job.depth;
            }
            records
        }
        Err(e) => {
            tracing::warn!("failed to parse {}: {e}", file_path.display());
            return Vec::new();
        }
    };

    let emitted = shared.ctx.filter_deps(records);
    tracing::debug!(
        "{} yielded {} record(s) at depth {}",
        file_path.display(),
        emitted.len(),
        job.depth
    );

    {
        let Ok(mut state) = shared.state.lock() else {
            return Vec::new();
        };
        for dep in &emitted {
            state.note(dep, &job.parent);
        }
        state.append_discovered(&job.parent, &emitted);
    }

    if job.depth >= shared.ctx.max_depth {
        return Vec::new();
    }

    let mut followups = Vec::new();
    for dep in &emitted {
        if shared.ctx.is_cancelled() {
            break;
        }
        match descend(&shared, &job, dep).await {
            Ok(mut jobs) => followups.append(&mut jobs),
            Err(e) => tracing::warn!("cannot descend into {}: {e}", dep.name),
        }
    }
    followups
}

/// Schedules deeper scanning for one record, materialising its
/// repository when needed.
async fn descend(shared: &WalkShared, job: &ScanJob, dep: &Dependency) -> Result<Vec<ScanJob>> {
    let child_origin = |git_url: String, version: String| JobOrigin {
        git_url,
        version,
        depth: job.depth + 1,
        parent: dep.name.clone(),
    };

    // Local replacements bypass the repository manager entirely.
    if let Some(path) = dep.local_replacement_path() {
        let dir = job.base_path.join(path);
        let dir = dir.canonicalize().unwrap_or(dir);
        if !dir.is_dir() {
            return Err(DepscanError::ScanRootNotFound {
                path: dir.display().to_string(),
            }
            .into());
        }
        let repo_key = format!("local:{}", dir.display());
        if shared.visited_repos.insert(repo_key, ()).is_some() {
            return Ok(Vec::new());
        }
        return discover_jobs(
            &shared.registry,
            &dir,
            &child_origin(String::new(), String::new()),
        );
    }

    if dep.git.is_empty() {
        return Ok(Vec::new());
    }

    let canonical = canonical_git_url(&dep.git);
    let declared = if dep.version.is_empty() { "HEAD" } else { dep.version.as_str() };
    let repo_key = format!("{canonical}@{declared}");
    if shared.visited_repos.insert(repo_key, ()).is_some() {
        return Ok(Vec::new()); // recursion break: repo already walked
    }

    let version = shared.repos.resolve_version_alias(&dep.git, declared).await;
    let worktree = shared.repos.get_worktree_path(&dep.git, &version).await?;
    discover_jobs(&shared.registry, &worktree, &child_origin(canonical, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_file;
    use tempfile::TempDir;

    fn walker_with_cache(cache: &TempDir) -> Walker {
        Walker::new(
            Arc::new(ScannerRegistry::builtin()),
            Arc::new(RepoManager::new(cache.path())),
        )
    }

    #[tokio::test]
    async fn empty_registry_is_a_top_level_error() {
        let cache = TempDir::new().unwrap();
        let walker = Walker::new(
            Arc::new(ScannerRegistry::new()),
            Arc::new(RepoManager::new(cache.path())),
        );
        let err = walker.scan(".", ScanOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("registry"));
    }

    #[tokio::test]
    async fn missing_root_is_a_top_level_error() {
        let cache = TempDir::new().unwrap();
        let walker = walker_with_cache(&cache);
        let result = walker
            .scan("/definitely/not/a/real/path", ScanOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_directory_scans_clean() {
        let cache = TempDir::new().unwrap();
        let proj = TempDir::new().unwrap();
        let walker = walker_with_cache(&cache);
        let (result, tree) = walker
            .scan(proj.path().to_str().unwrap(), ScanOptions::default())
            .await
            .unwrap();
        assert_eq!(result.metadata.scan_type, ScanType::Local);
        assert_eq!(result.metadata.total_dependencies, 0);
        assert_eq!(result.metadata.conflicts_found, 0);
        assert!(result.dependencies.is_empty());
        assert!(tree.root_refs.is_empty());
    }

    #[tokio::test]
    async fn local_go_module_scan_matches_manifest_order() {
        let cache = TempDir::new().unwrap();
        let proj = TempDir::new().unwrap();
        write_file(
            proj.path(),
            "go.mod",
            "module m\n\nrequire (\n\tgithub.com/a/b v1.2.3\n\tgolang.org/x/c v0.0.1\n\tgithub.com/d/e v0.0.0-20240101000000-abcdef\n)\n",
        );

        let walker = walker_with_cache(&cache);
        let (result, tree) = walker
            .scan(proj.path().to_str().unwrap(), ScanOptions::default())
            .await
            .unwrap();

        assert_eq!(result.dependencies.len(), 3);
        assert!(result.dependencies.iter().all(|d| d.depth == 0));
        assert_eq!(
            tree.root_refs,
            ["github.com/a/b", "golang.org/x/c", "github.com/d/e"]
        );
        let kinds: Vec<&str> = result
            .dependencies
            .iter()
            .map(|d| d.ecosystem.as_str())
            .collect();
        assert_eq!(kinds, ["go", "stdlib", "go"]);
        assert_eq!(result.metadata.repositories_found, 2);
    }

    #[tokio::test]
    async fn local_replacement_descends_without_network() {
        let cache = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let proj = root.path().join("proj");
        let other = root.path().join("other");
        std::fs::create_dir_all(&proj).unwrap();
        std::fs::create_dir_all(&other).unwrap();
        write_file(
            &proj,
            "go.mod",
            "module m\nrequire example.com/x v1.0.0\nreplace example.com/x => ../other\n",
        );
        write_file(&other, "go.mod", "module other\nrequire github.com/deep/dep v3.0.0\n");

        let walker = walker_with_cache(&cache);
        let (result, _) = walker
            .scan(
                proj.to_str().unwrap(),
                ScanOptions {
                    max_depth: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.metadata.scan_type, ScanType::Mixed);
        let nested = result
            .dependencies
            .iter()
            .find(|d| d.name == "github.com/deep/dep")
            .expect("descended into ../other");
        assert_eq!(nested.depth, 1);
        // No worktree was ever materialised.
        assert!(walker.repos.worktrees().is_empty());
    }

    #[tokio::test]
    async fn max_depth_zero_never_descends() {
        let cache = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let proj = root.path().join("proj");
        let other = root.path().join("other");
        std::fs::create_dir_all(&proj).unwrap();
        std::fs::create_dir_all(&other).unwrap();
        write_file(
            &proj,
            "go.mod",
            "module m\nrequire example.com/x v1.0.0\nreplace example.com/x => ../other\n",
        );
        write_file(&other, "go.mod", "module other\nrequire github.com/deep/dep v3.0.0\n");

        let walker = walker_with_cache(&cache);
        let (result, _) = walker
            .scan(proj.to_str().unwrap(), ScanOptions::default())
            .await
            .unwrap();
        assert!(result.dependencies.iter().all(|d| d.depth == 0));
        assert!(!result.dependencies.iter().any(|d| d.name == "github.com/deep/dep"));
    }

    #[tokio::test]
    async fn version_conflicts_across_manifests() {
        let cache = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let proj = root.path().join("proj");
        let sib = root.path().join("sib");
        std::fs::create_dir_all(&proj).unwrap();
        std::fs::create_dir_all(&sib).unwrap();
        write_file(
            &proj,
            "go.mod",
            "module m\nrequire (\n\tgithub.com/x/y v1.0.0\n\texample.com/s v0.1.0\n)\nreplace example.com/s => ../sib\n",
        );
        write_file(&sib, "go.mod", "module sib\nrequire github.com/x/y v2.0.0\n");

        let walker = walker_with_cache(&cache);
        let (result, _) = walker
            .scan(
                proj.to_str().unwrap(),
                ScanOptions {
                    max_depth: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.dependency_name, "github.com/x/y");
        let versions: Vec<&str> = conflict.versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(versions, ["v1.0.0", "v2.0.0"]);

        // Stable-first dedup: the depth-0 declaration represents the key.
        let flat = result
            .dependencies
            .iter()
            .find(|d| d.name == "github.com/x/y")
            .unwrap();
        assert_eq!(flat.version, "v1.0.0");
    }

    #[tokio::test]
    async fn filter_gates_emission_and_traversal() {
        let cache = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let proj = root.path().join("proj");
        let matched = root.path().join("matched");
        let unmatched = root.path().join("unmatched");
        for dir in [&proj, &matched, &unmatched] {
            std::fs::create_dir_all(dir).unwrap();
        }
        write_file(
            &proj,
            "go.mod",
            "module m\nrequire (\n\tkeep.io/a v1.0.0\n\tdrop.io/b v1.0.0\n)\nreplace keep.io/a => ../matched\nreplace drop.io/b => ../unmatched\n",
        );
        write_file(&matched, "go.mod", "module a\nrequire keep.io/inner v1.0.0\n");
        write_file(&unmatched, "go.mod", "module b\nrequire keep.io/hidden v1.0.0\n");

        let walker = walker_with_cache(&cache);
        let (result, _) = walker
            .scan(
                proj.to_str().unwrap(),
                ScanOptions {
                    max_depth: 1,
                    filter: FilterSet::parse("keep.io/*").unwrap(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let names: Vec<&str> = result.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"keep.io/a"));
        assert!(names.contains(&"keep.io/inner"));
        // Non-matching records are neither emitted nor traversed.
        assert!(!names.contains(&"drop.io/b"));
        assert!(!names.contains(&"keep.io/hidden"));
    }

    #[tokio::test]
    async fn cancellation_yields_partial_success() {
        let cache = TempDir::new().unwrap();
        let proj = TempDir::new().unwrap();
        write_file(proj.path(), "go.mod", "module m\nrequire github.com/a/b v1.0.0\n");

        let cancel = Arc::new(AtomicBool::new(true));
        let walker = walker_with_cache(&cache);
        let (result, _) = walker
            .scan(
                proj.path().to_str().unwrap(),
                ScanOptions {
                    cancel: Some(cancel),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // Pre-cancelled: completes successfully with nothing gathered.
        assert!(result.dependencies.is_empty());
    }

    #[tokio::test]
    async fn rescan_is_idempotent_on_the_flat_list() {
        let cache = TempDir::new().unwrap();
        let proj = TempDir::new().unwrap();
        write_file(
            proj.path(),
            "go.mod",
            "module m\nrequire (\n\tgithub.com/a/b v1.0.0\n\tgithub.com/c/d v2.0.0\n)\n",
        );

        let walker = walker_with_cache(&cache);
        let path = proj.path().to_str().unwrap();
        let (first, _) = walker.scan(path, ScanOptions::default()).await.unwrap();
        let (second, _) = walker.scan(path, ScanOptions::default()).await.unwrap();

        let mut a: Vec<String> = first.dependencies.iter().map(|d| d.key().to_string()).collect();
        let mut b: Vec<String> = second.dependencies.iter().map(|d| d.key().to_string()).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn indirect_records_follow_policy() {
        let cache = TempDir::new().unwrap();
        let proj = TempDir::new().unwrap();
        write_file(
            proj.path(),
            "go.mod",
            "module m\nrequire (\n\tgithub.com/a/b v1.0.0\n\tgithub.com/i/i v0.9.0 // indirect\n)\n",
        );

        let walker = walker_with_cache(&cache);
        let path = proj.path().to_str().unwrap();

        let (hidden, _) = walker.scan(path, ScanOptions::default()).await.unwrap();
        assert_eq!(hidden.dependencies.len(), 1);

        let (shown, _) = walker
            .scan(
                path,
                ScanOptions {
                    show_indirect: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(shown.dependencies.len(), 2);
    }
}
