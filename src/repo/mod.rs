//! Repository materialisation and caching.
//!
//! The [`RepoManager`] turns `(url, version)` pairs into local
//! directories the walker can scan. Each repository gets one cache slot:
//!
//! ```text
//! <cacheRoot>/<host>/<org>/<repo>/
//! ├── repo.git/                 # bare clone, fetched on reuse
//! └── worktrees/
//!     ├── v1.2.3/               # detached checkout, immutable
//!     └── main/
//! ```
//!
//! Concurrency contract: two concurrent requests for the same
//! `(canonical url, resolved version)` materialise exactly once. The
//! first caller populates a `tokio::sync::OnceCell`, followers await
//! it. A cross-process file lock additionally serialises bare-repository
//! mutation between independent `depscan` processes sharing the cache.
//!
//! Version aliases (`HEAD`, `latest`, `GA`) are resolved by inspecting
//! the remote; alias resolution never fails, callers get the alias
//! back unresolved and may proceed with it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use depscan_cli::repo::{RepoManager, resolve_cache_root};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let root = resolve_cache_root(None)?; // flag > env var > home default
//! let manager = RepoManager::new(root).with_shallow_depth(Some(1));
//!
//! let version = manager
//!     .resolve_version_alias("https://github.com/org/repo", "latest")
//!     .await;
//! let dir = manager
//!     .get_worktree_path("https://github.com/org/repo", &version)
//!     .await?;
//! println!("materialised at {}", dir.display());
//!
//! manager.close().await; // prune bookkeeping; cache entries stay
//! # Ok(())
//! # }
//! ```

pub mod lock;

use crate::core::DepscanError;
use crate::git::{GitRepo, canonical_git_url, parse_git_url};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::sync::atomic::AtomicBool;
use tokio::sync::{OnceCell, Semaphore};
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use uuid::Uuid;

pub use lock::RepoLock;

/// Default cache location relative to the user's home directory.
const DEFAULT_CACHE_SUBDIR: &str = ".cache/depscan/repositories";

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "DEPSCAN_CACHE_DIR";

// Global semaphore limiting concurrent git subprocesses, sized at
// 3x core count to keep large fan-outs from forking hundreds of
// processes at once.
static GIT_SEMAPHORE: OnceLock<Arc<Semaphore>> = OnceLock::new();

fn git_semaphore() -> &'static Arc<Semaphore> {
    GIT_SEMAPHORE.get_or_init(|| {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Arc::new(Semaphore::new(cores * 3))
    })
}

/// Resolves the cache root: explicit flag beats `DEPSCAN_CACHE_DIR`
/// beats the home-directory default.
///
/// # Errors
///
/// Fails when no home directory can be determined and nothing else is
/// configured.
pub fn resolve_cache_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
        return Ok(PathBuf::from(expanded));
    }
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV)
        && !dir.is_empty()
    {
        let expanded = shellexpand::tilde(&dir).into_owned();
        return Ok(PathBuf::from(expanded));
    }
    let home = dirs::home_dir().ok_or_else(|| DepscanError::ConfigError {
        message: "cannot determine home directory for the repository cache".to_string(),
    })?;
    Ok(home.join(DEFAULT_CACHE_SUBDIR))
}

/// One materialised checkout tracked by the manager.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorktreeEntry {
    /// Canonical `https://host/org/repo` form of the remote.
    pub canonical_url: String,
    /// The version the worktree is checked out to.
    pub resolved_version: String,
    /// Directory containing the checkout.
    pub local_path: PathBuf,
    /// When this entry was materialised.
    pub cloned_at: DateTime<Utc>,
    /// Whether the backing clone was shallow.
    pub shallow: bool,
}

/// Clone/worktree cache with version-alias resolution.
pub struct RepoManager {
    cache_root: PathBuf,
    shallow_depth: Option<u32>,
    cancel: Option<Arc<AtomicBool>>,
    cells: DashMap<String, Arc<OnceCell<PathBuf>>>,
    alias_cache: DashMap<String, String>,
    entries: Mutex<Vec<WorktreeEntry>>,
}

impl RepoManager {
    /// Creates a manager rooted at `cache_root`.
    #[must_use]
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            shallow_depth: None,
            cancel: None,
            cells: DashMap::new(),
            alias_cache: DashMap::new(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Clones (and fetches) with `--depth` when set.
    #[must_use]
    pub fn with_shallow_depth(mut self, depth: Option<u32>) -> Self {
        self.shallow_depth = depth;
        self
    }

    /// Attaches the scan's cancellation flag so in-flight network
    /// operations abort when the scan is cancelled.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The cache root directory.
    #[must_use]
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Worktrees materialised through this manager so far.
    #[must_use]
    pub fn worktrees(&self) -> Vec<WorktreeEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Translates a symbolic alias (`HEAD`, `latest`, `GA`) into a
    /// concrete ref by inspecting the remote.
    ///
    /// # Resolution strategy
    ///
    /// - `HEAD` (or empty): the remote's default branch, read from
    ///   `ls-remote --symref`
    /// - `latest` / `GA`: the highest semver-parsable release tag from
    ///   `ls-remote --tags` (prereleases excluded, a leading `v` is
    ///   tolerated)
    /// - anything else is already concrete and returned unchanged,
    ///   without touching the network
    ///
    /// # Failure behavior
    ///
    /// Never fails: on any error the alias comes back unchanged and the
    /// caller may keep using it (the later checkout will surface a real
    /// problem). Resolutions are cached for the life of this manager
    /// (one scan), not across scans.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use depscan_cli::repo::RepoManager;
    ///
    /// # async fn example() {
    /// let manager = RepoManager::new("/tmp/depscan-cache");
    ///
    /// // Concrete refs pass through without network access.
    /// let v = manager
    ///     .resolve_version_alias("https://github.com/org/repo", "v1.2.3")
    ///     .await;
    /// assert_eq!(v, "v1.2.3");
    ///
    /// // Aliases are resolved against the remote.
    /// let head = manager
    ///     .resolve_version_alias("https://github.com/org/repo", "HEAD")
    ///     .await;
    /// println!("default branch: {head}");
    /// # }
    /// ```
    pub async fn resolve_version_alias(&self, url: &str, alias: &str) -> String {
        let is_alias = matches!(alias, "" | "HEAD" | "latest" | "GA");
        if !is_alias {
            return alias.to_string();
        }

        let cache_key = format!("{}@{alias}", canonical_git_url(url));
        if let Some(hit) = self.alias_cache.get(&cache_key) {
            return hit.clone();
        }

        let resolved = match alias {
            "" | "HEAD" => match GitRepo::remote_default_branch(url).await {
                Ok(Some(branch)) => branch,
                Ok(None) => "HEAD".to_string(),
                Err(e) => {
                    tracing::debug!("could not resolve HEAD for {url}: {e}");
                    "HEAD".to_string()
                }
            },
            // "latest" / "GA": the highest release tag the remote offers.
            _ => match GitRepo::remote_tags(url).await {
                Ok(tags) => highest_release_tag(&tags).unwrap_or_else(|| alias.to_string()),
                Err(e) => {
                    tracing::debug!("could not list tags for {url}: {e}");
                    alias.to_string()
                }
            },
        };

        self.alias_cache.insert(cache_key, resolved.clone());
        resolved
    }

    /// Returns a directory containing `url` checked out at `version`,
    /// materialising it on first request.
    ///
    /// # Operation flow
    ///
    /// 1. Canonicalise the URL and locate the cache slot
    ///    `<root>/<host>/<org>/<repo>/`
    /// 2. Return immediately when `worktrees/<version>/` already exists
    /// 3. Otherwise, under the per-repository file lock, clone the bare
    ///    repository (first request) or fetch it (subsequent requests)
    /// 4. Create a detached worktree in a temp directory and rename it
    ///    into place, so a crash never leaves a half-populated entry
    ///
    /// # Concurrency behavior
    ///
    /// - **Same key**: concurrent calls for one
    ///   `(canonical url, version)` materialise exactly once; followers
    ///   await the first caller's result
    /// - **Different keys**: proceed in parallel, bounded by the global
    ///   git-subprocess semaphore
    /// - **Other processes**: excluded from bare-repository mutation by
    ///   the [`RepoLock`] file lock
    ///
    /// # Version handling
    ///
    /// Accepts tags, branches, commit SHAs, or `HEAD` (also used when
    /// `version` is empty). Aliases should be resolved through
    /// [`resolve_version_alias`](Self::resolve_version_alias) first.
    ///
    /// # Errors
    ///
    /// Network failures, authentication failures, and unknown refs
    /// surface here; the walker treats them as a failed descent and
    /// continues with other work.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use depscan_cli::repo::RepoManager;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let manager = RepoManager::new("/tmp/depscan-cache");
    /// let dir = manager
    ///     .get_worktree_path("https://github.com/org/repo", "v1.2.3")
    ///     .await?;
    /// println!("checked out at {}", dir.display());
    ///
    /// // A second request for the same key is a cache hit.
    /// let again = manager
    ///     .get_worktree_path("https://github.com/org/repo", "v1.2.3")
    ///     .await?;
    /// assert_eq!(dir, again);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_worktree_path(&self, url: &str, version: &str) -> Result<PathBuf> {
        let canonical = canonical_git_url(url);
        let version = if version.is_empty() { "HEAD" } else { version };
        let key = format!("{canonical}@{version}");

        let cell = self
            .cells
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| self.materialise(url, &canonical, version))
            .await
            .cloned()
    }

    async fn materialise(&self, url: &str, canonical: &str, version: &str) -> Result<PathBuf> {
        let (host, org, repo) = parse_git_url(canonical).ok_or_else(|| {
            DepscanError::GitCloneFailed {
                url: url.to_string(),
                reason: "URL does not name a host/org/repo repository".to_string(),
            }
        })?;

        let slot = self.cache_root.join(&host).join(&org).join(&repo);
        let bare_dir = slot.join("repo.git");
        let worktree_dir = slot.join("worktrees").join(version_dir_name(version));

        if worktree_dir.exists() {
            tracing::debug!("cache hit for {canonical}@{version}");
            self.record_entry(canonical, version, &worktree_dir);
            return Ok(worktree_dir);
        }

        tokio::fs::create_dir_all(&slot)
            .await
            .with_context(|| format!("failed to create cache slot {}", slot.display()))?;

        // Bare-repository mutation is serialised across processes.
        let lock_key = format!("{host}_{org}_{repo}");
        let _lock = RepoLock::acquire(&self.cache_root, &lock_key).await?;

        let bare = if bare_dir.exists() {
            let repo = GitRepo::new(&bare_dir);
            let _permit = git_semaphore()
                .acquire()
                .await
                .map_err(|e| anyhow::anyhow!("git semaphore closed: {e}"))?;
            let strategy = ExponentialBackoff::from_millis(200).factor(2).take(2);
            let fetched = Retry::spawn(strategy, || repo.fetch(self.cancel.clone())).await;
            if let Err(e) = fetched {
                // A stale cache may still satisfy the requested version.
                tracing::warn!("fetch failed for {canonical}: {e}");
            }
            repo
        } else {
            let _permit = git_semaphore()
                .acquire()
                .await
                .map_err(|e| anyhow::anyhow!("git semaphore closed: {e}"))?;
            tracing::info!("cloning {canonical} (bare) into cache");
            GitRepo::clone_bare(url, &bare_dir, self.shallow_depth, self.cancel.clone())
                .await
                .map_err(|e| DepscanError::GitCloneFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?
        };

        // Materialise into a temp directory and rename so a crash never
        // leaves a half-populated entry behind.
        let tmp_dir = slot
            .join("worktrees")
            .join(format!(".tmp-{}", Uuid::new_v4()));
        if let Some(parent) = tmp_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let reference = if version == "HEAD" { "HEAD" } else { version };
        {
            let _permit = git_semaphore()
                .acquire()
                .await
                .map_err(|e| anyhow::anyhow!("git semaphore closed: {e}"))?;
            bare.create_worktree(&tmp_dir, reference)
                .await
                .map_err(|e| DepscanError::GitCheckoutFailed {
                    reference: reference.to_string(),
                    reason: e.to_string(),
                })?;
        }

        match tokio::fs::rename(&tmp_dir, &worktree_dir).await {
            Ok(()) => {}
            Err(_) if worktree_dir.exists() => {
                // Another process won the race; ours is redundant.
                let _ = tokio::fs::remove_dir_all(&tmp_dir).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to move worktree into {}", worktree_dir.display())
                });
            }
        }

        self.record_entry(canonical, version, &worktree_dir);
        Ok(worktree_dir)
    }

    fn record_entry(&self, canonical: &str, version: &str, path: &Path) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(WorktreeEntry {
                canonical_url: canonical.to_string(),
                resolved_version: version.to_string(),
                local_path: path.to_path_buf(),
                cloned_at: Utc::now(),
                shallow: self.shallow_depth.is_some(),
            });
        }
    }

    /// Releases in-memory state and prunes stale worktree bookkeeping in
    /// the bare clones. On-disk cache entries are kept for the next
    /// scan.
    pub async fn close(&self) {
        let bare_repos: Vec<PathBuf> = self
            .worktrees()
            .iter()
            .filter_map(|entry| {
                entry
                    .local_path
                    .parent()
                    .and_then(Path::parent)
                    .map(|slot| slot.join("repo.git"))
            })
            .collect();

        let prunes = bare_repos
            .into_iter()
            .map(|dir| async move { GitRepo::new(dir).prune_worktrees().await });
        for result in futures::future::join_all(prunes).await {
            if let Err(e) = result {
                tracing::debug!("worktree prune failed: {e}");
            }
        }

        self.cells.clear();
        self.alias_cache.clear();
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Recursive size of the cache directory in bytes.
    #[must_use]
    pub fn cache_size(&self) -> u64 {
        walkdir::WalkDir::new(&self.cache_root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| entry.metadata().ok())
            .filter(std::fs::Metadata::is_file)
            .map(|meta| meta.len())
            .sum()
    }

    /// Removes the entire cache directory.
    ///
    /// # Errors
    ///
    /// Fails on filesystem errors other than the directory already being
    /// absent.
    pub async fn clean(&self) -> Result<()> {
        self.close().await;
        match tokio::fs::remove_dir_all(&self.cache_root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("failed to remove cache at {}", self.cache_root.display())
            }),
        }
    }
}

/// Directory name for a version: filesystem-hostile characters replaced,
/// with a short digest suffix whenever the name had to change so that
/// `feature/x` and `feature-x` never collide.
fn version_dir_name(version: &str) -> String {
    let sanitized: String = version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if sanitized == version {
        return sanitized;
    }
    let digest = Sha256::digest(version.as_bytes());
    format!("{sanitized}-{}", &hex::encode(digest)[..8])
}

/// Picks the highest semver-parsable tag, tolerating a leading `v`.
fn highest_release_tag(tags: &[String]) -> Option<String> {
    tags.iter()
        .filter_map(|tag| {
            let stripped = tag.strip_prefix('v').unwrap_or(tag);
            semver::Version::parse(stripped).ok().map(|v| (v, tag))
        })
        .filter(|(version, _)| version.pre.is_empty())
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, tag)| tag.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_root_prefers_explicit_dir() {
        let root = resolve_cache_root(Some(Path::new("/tmp/custom-cache"))).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/custom-cache"));
    }

    #[test]
    fn version_dir_names_are_path_safe_and_distinct() {
        assert_eq!(version_dir_name("v1.2.3"), "v1.2.3");
        let a = version_dir_name("feature/x");
        let b = version_dir_name("feature-x");
        assert!(a.starts_with("feature-x-"));
        assert_ne!(a, b);
    }

    #[test]
    fn highest_release_tag_ignores_prereleases() {
        let tags = vec![
            "v1.0.0".to_string(),
            "v2.0.0-rc.1".to_string(),
            "v1.9.3".to_string(),
            "not-a-version".to_string(),
        ];
        assert_eq!(highest_release_tag(&tags), Some("v1.9.3".to_string()));
        assert_eq!(highest_release_tag(&[]), None);
    }

    #[tokio::test]
    async fn concrete_versions_skip_remote_resolution() {
        let manager = RepoManager::new("/tmp/depscan-test-cache");
        // Must not attempt any network access for a concrete ref.
        let resolved = manager
            .resolve_version_alias("https://github.com/org/repo", "v1.2.3")
            .await;
        assert_eq!(resolved, "v1.2.3");
    }

    #[tokio::test]
    async fn unparseable_url_fails_materialisation() {
        let manager = RepoManager::new("/tmp/depscan-test-cache");
        let result = manager.get_worktree_path("not-a-repo", "v1").await;
        assert!(result.is_err());
    }
}
