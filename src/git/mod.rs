//! Git operations for repository materialisation.
//!
//! Thin async wrapper over the system `git` command. The repository
//! manager drives everything through [`GitRepo`]: bare clones, fetches,
//! detached worktrees, and remote ref inspection. No working-tree
//! mutation ever happens here: worktrees are created once and treated
//! as read-only afterwards.

pub mod command_builder;

use crate::git::command_builder::GitCommand;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Handle to a local (usually bare) git repository.
///
/// All operations shell out to the system `git` binary through
/// [`command_builder::GitCommand`], so authentication (SSH agents,
/// credential helpers, HTTPS tokens) behaves exactly as on the user's
/// command line. The handle itself is cheap to clone and carries no
/// open resources.
///
/// # Examples
///
/// ```rust,no_run
/// use depscan_cli::git::GitRepo;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let bare = GitRepo::clone_bare(
///     "https://github.com/org/repo",
///     Path::new("/tmp/cache/repo.git"),
///     None, // full history
///     None, // no cancellation flag
/// )
/// .await?;
///
/// bare.create_worktree(Path::new("/tmp/cache/worktrees/v1.2.3"), "v1.2.3").await?;
/// let sha = bare.rev_parse("v1.2.3").await?;
/// println!("v1.2.3 is {sha}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// Wraps an existing repository directory.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Clones `url` as a bare repository into `target`.
    ///
    /// # Parameters
    ///
    /// * `url` - Remote repository URL (HTTPS, scp-style, or a local
    ///   path git accepts)
    /// * `target` - Directory the bare clone is created in
    /// * `shallow_depth` - Pass `Some(n)` to clone with `--depth n`;
    ///   `None` clones full history
    /// * `cancel` - Optional flag that kills the in-flight subprocess
    ///   when set
    ///
    /// # Errors
    ///
    /// Network failures, authentication failures, and existing
    /// non-empty targets all surface as
    /// [`crate::core::DepscanError`] values with git's stderr attached.
    pub async fn clone_bare(
        url: &str,
        target: &Path,
        shallow_depth: Option<u32>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<Self> {
        let mut cmd = GitCommand::clone_bare(url, target, shallow_depth);
        if let Some(flag) = cancel {
            cmd = cmd.cancel_flag(flag);
        }
        cmd.execute_success().await?;
        Ok(Self::new(target))
    }

    /// Fetches refs and tags from origin.
    ///
    /// # Errors
    ///
    /// Fails when the remote is unreachable or authentication is
    /// rejected.
    pub async fn fetch(&self, cancel: Option<Arc<AtomicBool>>) -> Result<()> {
        let mut cmd = GitCommand::fetch().current_dir(&self.path);
        if let Some(flag) = cancel {
            cmd = cmd.cancel_flag(flag);
        }
        cmd.execute_success().await
    }

    /// Creates a detached worktree at `path` checked out to `reference`.
    ///
    /// # Errors
    ///
    /// Fails when the reference does not exist in the repository.
    pub async fn create_worktree(&self, path: &Path, reference: &str) -> Result<()> {
        GitCommand::worktree_add(path, reference)
            .current_dir(&self.path)
            .execute_success()
            .await
    }

    /// Drops bookkeeping for worktrees whose directories are gone.
    ///
    /// # Errors
    ///
    /// Fails when the repository is corrupt or inaccessible.
    pub async fn prune_worktrees(&self) -> Result<()> {
        GitCommand::worktree_prune()
            .current_dir(&self.path)
            .execute_success()
            .await
    }

    /// Resolves a reference to its commit SHA.
    ///
    /// # Errors
    ///
    /// Fails when the reference is unknown.
    pub async fn rev_parse(&self, reference: &str) -> Result<String> {
        GitCommand::rev_parse(reference)
            .current_dir(&self.path)
            .execute_stdout()
            .await
    }

    /// Queries a remote's default branch via `ls-remote --symref`,
    /// without a local clone.
    ///
    /// # Errors
    ///
    /// Fails when the remote is unreachable.
    pub async fn remote_default_branch(url: &str) -> Result<Option<String>> {
        let stdout = GitCommand::ls_remote_symref(url).execute_stdout().await?;
        // First line: "ref: refs/heads/main\tHEAD"
        Ok(stdout.lines().find_map(|line| {
            line.strip_prefix("ref: refs/heads/")
                .and_then(|rest| rest.split_whitespace().next())
                .map(ToString::to_string)
        }))
    }

    /// Lists a remote's tags without a local clone.
    ///
    /// # Errors
    ///
    /// Fails when the remote is unreachable.
    pub async fn remote_tags(url: &str) -> Result<Vec<String>> {
        let stdout = GitCommand::ls_remote_tags(url).execute_stdout().await?;
        Ok(stdout
            .lines()
            .filter_map(|line| line.split("refs/tags/").nth(1))
            .map(ToString::to_string)
            .collect())
    }

    /// The repository directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Extracts `(host, org, repo)` from the URL shapes the locator accepts:
/// `https://host/org/repo[.git]`, `git@host:org/repo[.git]`, and bare
/// `host/org/repo`.
///
/// # Examples
///
/// ```rust
/// use depscan_cli::git::parse_git_url;
///
/// let parts = parse_git_url("git@github.com:org/repo.git").unwrap();
/// assert_eq!(parts, ("github.com".into(), "org".into(), "repo".into()));
///
/// assert!(parse_git_url("github.com/loner").is_none());
/// ```
#[must_use]
pub fn parse_git_url(url: &str) -> Option<(String, String, String)> {
    let rest = if let Some(rest) = url.strip_prefix("https://") {
        rest.to_string()
    } else if let Some(rest) = url.strip_prefix("http://") {
        rest.to_string()
    } else if let Some(rest) = url.strip_prefix("git@") {
        rest.replacen(':', "/", 1)
    } else {
        url.to_string()
    };

    let mut parts = rest.split('/').filter(|p| !p.is_empty());
    let host = parts.next()?;
    let org = parts.next()?;
    let repo = parts.next()?.trim_end_matches(".git");
    if host.is_empty() || org.is_empty() || repo.is_empty() {
        return None;
    }
    Some((host.to_string(), org.to_string(), repo.to_string()))
}

/// Normalises any accepted URL shape to `https://host/org/repo`.
///
/// Falls back to the input unchanged when the URL does not decompose.
///
/// # Examples
///
/// ```rust
/// use depscan_cli::git::canonical_git_url;
///
/// assert_eq!(
///     canonical_git_url("git@github.com:org/repo.git"),
///     "https://github.com/org/repo"
/// );
/// assert_eq!(
///     canonical_git_url("github.com/org/repo/sub/pkg"),
///     "https://github.com/org/repo"
/// );
/// ```
#[must_use]
pub fn canonical_git_url(url: &str) -> String {
    parse_git_url(url)
        .map(|(host, org, repo)| format!("https://{host}/{org}/{repo}"))
        .unwrap_or_else(|| url.trim_end_matches(".git").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_git_url_shapes() {
        let expect = Some((
            "github.com".to_string(),
            "org".to_string(),
            "repo".to_string(),
        ));
        assert_eq!(parse_git_url("https://github.com/org/repo"), expect);
        assert_eq!(parse_git_url("https://github.com/org/repo.git"), expect);
        assert_eq!(parse_git_url("git@github.com:org/repo.git"), expect);
        assert_eq!(parse_git_url("github.com/org/repo"), expect);
        assert_eq!(parse_git_url("github.com/loner"), None);
    }

    #[test]
    fn canonical_url_is_stable_across_shapes() {
        for url in [
            "https://github.com/org/repo",
            "https://github.com/org/repo.git",
            "git@github.com:org/repo",
            "github.com/org/repo",
        ] {
            assert_eq!(canonical_git_url(url), "https://github.com/org/repo");
        }
    }

    #[test]
    fn subpaths_fold_into_repo_root() {
        assert_eq!(
            canonical_git_url("github.com/org/repo/sub/pkg"),
            "https://github.com/org/repo"
        );
    }
}
