//! Type-safe git command builder.
//!
//! A fluent wrapper around `tokio::process::Command` that keeps every
//! git invocation consistent: same timeout handling, same stderr
//! capture, same typed errors. Uses the system git binary rather than
//! libgit2 so authentication (SSH agents, credential helpers, tokens)
//! behaves exactly as it does on the user's command line.

use crate::core::DepscanError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Locates the git binary once per process.
fn git_binary() -> Result<PathBuf> {
    which::which("git").map_err(|_| DepscanError::GitNotFound.into())
}

/// Builder for one git invocation.
///
/// Defaults: output captured, 5-minute timeout, inherited environment,
/// current process working directory.
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Option<Duration>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: Some(Duration::from_secs(300)),
            cancel_flag: None,
        }
    }
}

impl GitCommand {
    /// Creates an empty builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone a repository as a bare mirror of its refs.
    #[must_use]
    pub fn clone_bare(url: &str, target: &Path, shallow_depth: Option<u32>) -> Self {
        let mut cmd = Self::new().args(["clone", "--bare"]);
        if let Some(depth) = shallow_depth {
            cmd = cmd.arg("--depth").arg(depth.to_string());
        }
        cmd.arg(url).arg(target.display().to_string())
    }

    /// Fetch all refs from origin.
    #[must_use]
    pub fn fetch() -> Self {
        Self::new().args(["fetch", "--tags", "--force", "origin"])
    }

    /// Query the remote HEAD symref without cloning.
    #[must_use]
    pub fn ls_remote_symref(url: &str) -> Self {
        Self::new().args(["ls-remote", "--symref", url, "HEAD"])
    }

    /// List remote tags without cloning.
    #[must_use]
    pub fn ls_remote_tags(url: &str) -> Self {
        Self::new().args(["ls-remote", "--tags", "--refs", url])
    }

    /// Add a detached worktree at `path` checked out to `reference`.
    #[must_use]
    pub fn worktree_add(path: &Path, reference: &str) -> Self {
        Self::new().args(["worktree", "add", "--detach"]).arg(path.display().to_string()).arg(reference)
    }

    /// Prune stale worktree bookkeeping.
    #[must_use]
    pub fn worktree_prune() -> Self {
        Self::new().args(["worktree", "prune"])
    }

    /// Resolve a reference to a commit SHA.
    #[must_use]
    pub fn rev_parse(reference: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", reference])
    }

    /// Sets the working directory for the invocation.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Overrides the default 5-minute timeout.
    #[must_use]
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout_duration = Some(duration);
        self
    }

    /// Attaches a cancellation flag; when it flips the child process is
    /// killed and the command fails with [`DepscanError::Cancelled`].
    #[must_use]
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "git".to_string())
    }

    /// Runs the command and returns the raw output, failing on non-zero
    /// exit with captured stderr.
    ///
    /// # Errors
    ///
    /// [`DepscanError::GitNotFound`] when no git binary exists,
    /// [`DepscanError::GitCommandError`] on non-zero exit,
    /// [`DepscanError::Cancelled`] when the cancel flag fires.
    pub async fn execute(self) -> Result<Output> {
        let git = git_binary()?;
        let operation = self.operation();

        let mut command = Command::new(git);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Never fall into interactive credential prompts from a
            // background scan task.
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            command.env(key, value);
        }

        let run = async {
            let output_fut = command.output();
            match &self.cancel_flag {
                Some(flag) => {
                    let flag = Arc::clone(flag);
                    tokio::select! {
                        output = output_fut => output.map_err(anyhow::Error::from),
                        () = watch_cancellation(flag) => Err(DepscanError::Cancelled.into()),
                    }
                }
                None => output_fut.await.map_err(anyhow::Error::from),
            }
        };

        let output = match self.timeout_duration {
            Some(limit) => timeout(limit, run)
                .await
                .map_err(|_| DepscanError::GitCommandError {
                    operation: operation.clone(),
                    stderr: format!("timed out after {}s", limit.as_secs()),
                })??,
            None => run.await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DepscanError::GitCommandError { operation, stderr }.into());
        }
        Ok(output)
    }

    /// Runs the command, discarding output.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await.map(|_| ())
    }

    /// Runs the command and returns trimmed stdout.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute), plus invalid UTF-8 output.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        let stdout =
            String::from_utf8(output.stdout).context("git produced non-UTF-8 output")?;
        Ok(stdout.trim().to_string())
    }
}

async fn watch_cancellation(flag: Arc<AtomicBool>) {
    let mut interval = tokio::time::interval(Duration::from_millis(100));
    loop {
        interval.tick().await;
        if flag.load(Ordering::SeqCst) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_assemble_expected_args() {
        let cmd = GitCommand::clone_bare("https://example.com/r.git", Path::new("/tmp/r"), Some(1));
        assert_eq!(
            cmd.args,
            ["clone", "--bare", "--depth", "1", "https://example.com/r.git", "/tmp/r"]
        );

        let cmd = GitCommand::worktree_add(Path::new("/tmp/wt"), "v1.0.0");
        assert_eq!(cmd.args, ["worktree", "add", "--detach", "/tmp/wt", "v1.0.0"]);

        assert_eq!(GitCommand::fetch().operation(), "fetch");
    }

    #[tokio::test]
    async fn failed_command_carries_stderr() {
        let result = GitCommand::new()
            .args(["rev-parse", "--verify", "definitely-not-a-ref"])
            .current_dir(std::env::temp_dir())
            .execute()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn pre_cancelled_flag_aborts() {
        let flag = Arc::new(AtomicBool::new(true));
        let result = GitCommand::new()
            .args(["ls-remote", "https://invalid.invalid/repo.git"])
            .cancel_flag(flag)
            .timeout(Duration::from_secs(30))
            .execute()
            .await;
        assert!(result.is_err());
    }
}
