//! File locking utilities for the repository cache.
//!
//! This module provides thread-safe and process-safe file locking for
//! cache slots to prevent corruption during concurrent cache
//! operations. Locks are automatically released when the lock object is
//! dropped.
//!
//! # Why file locks
//!
//! Two `depscan` processes pointed at the same cache directory must not
//! clone into the same slot at once, and a fetch must not run while
//! another process is mid-clone. In-process synchronisation (the
//! manager's per-key cells) cannot see across process boundaries;
//! OS-level file locks can. Each repository gets one lock file under
//! `<cache>/.locks/`, and holding the exclusive lock on it serialises
//! bare-repository mutation across every process sharing the cache.
//!
//! Worktree *reads* never take the lock: entries are immutable once
//! created, so readers cannot observe a torn state.
//!
//! # Example
//!
//! ```rust,no_run
//! use depscan_cli::repo::RepoLock;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache_dir = Path::new("/home/user/.cache/depscan/repositories");
//!
//! // Blocks until any other process releases the same repository.
//! let lock = RepoLock::acquire(cache_dir, "github.com/org/repo").await?;
//!
//! // ... clone or fetch under the lock ...
//!
//! drop(lock); // released here (or at end of scope)
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive, process-wide lock on one cached repository.
///
/// The underlying file handle is kept open for the lifetime of the
/// value; dropping it releases the OS lock.
pub struct RepoLock {
    _file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Acquires an exclusive lock for a repository in the cache
    /// directory.
    ///
    /// # Lock file management
    ///
    /// The method performs several setup operations:
    /// 1. Creates the `.locks/` directory inside the cache if needed
    /// 2. Sanitises `repo_key` into a filesystem-safe file name
    /// 3. Creates (or reopens) `<cache>/.locks/<key>.lock`
    /// 4. Acquires exclusive access via OS file locking and keeps the
    ///    handle open to maintain the lock
    ///
    /// # Async and blocking behavior
    ///
    /// If another process already holds the lock for the same key:
    /// - The OS-level wait happens inside `spawn_blocking`, so the
    ///   tokio runtime is never blocked
    /// - The spawned task waits until the other holder releases
    /// - There is no timeout; callers relying on bounded waits must
    ///   impose their own
    ///
    /// # Lock file location
    ///
    /// ```text
    /// <cache_dir>/.locks/<sanitised repo_key>.lock
    /// ```
    ///
    /// Examples:
    /// - `~/.cache/depscan/repositories/.locks/github.com_org_repo.lock`
    /// - `~/.cache/depscan/repositories/.locks/gitlab.com_team_tool.lock`
    ///
    /// # Parameters
    ///
    /// * `cache_dir` - Root cache directory path
    /// * `repo_key` - Unique identifier for the repository being locked
    ///
    /// # Returns
    ///
    /// A [`RepoLock`] holding the exclusive lock. The lock stays active
    /// until the returned value is dropped.
    ///
    /// # Errors
    ///
    /// - The `.locks/` directory cannot be created (permissions, disk
    ///   full)
    /// - The lock file cannot be created or opened
    /// - The file system does not support locking
    ///
    /// # Platform considerations
    ///
    /// - **Windows**: Win32 `LockFile` via [`fs4`]
    /// - **Unix**: POSIX `fcntl()` locking via [`fs4`]
    /// - **Network file systems**: behavior depends on the file
    ///   system's lock support
    ///
    /// # Examples
    ///
    /// Different keys never contend:
    ///
    /// ```rust,no_run
    /// use depscan_cli::repo::RepoLock;
    /// use std::path::Path;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let cache = Path::new("/tmp/depscan-cache");
    /// let a = RepoLock::acquire(cache, "github.com/org/alpha").await?;
    /// let b = RepoLock::acquire(cache, "github.com/org/beta").await?;
    /// assert_ne!(a.path(), b.path());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn acquire(cache_dir: &Path, repo_key: &str) -> Result<Self> {
        let locks_dir = cache_dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir)
            .await
            .with_context(|| format!("failed to create lock directory {}", locks_dir.display()))?;

        let sanitized: String = repo_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = locks_dir.join(format!("{sanitized}.lock"));

        let lock_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;
            file.lock_exclusive()
                .with_context(|| format!("failed to lock {}", lock_path.display()))?;
            Ok(file)
        })
        .await
        .context("lock acquisition task panicked")??;

        Ok(Self { _file: file, path })
    }

    /// The lock file backing this lock.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
