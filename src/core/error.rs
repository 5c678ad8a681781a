//! Error handling for depscan.
//!
//! Two layers cooperate here:
//! 1. [`DepscanError`]: strongly-typed failure modes for precise
//!    handling in code.
//! 2. [`ErrorContext`]: a display wrapper that adds a suggestion and
//!    details line for CLI users.
//!
//! The propagation policy is deliberately lopsided: a scan only fails
//! outright when the starting point cannot be enumerated at all (missing
//! root, failed top-level materialisation, empty registry). Everything
//! that goes wrong *inside* the walk (unparseable manifests, unreadable
//! files, repositories that refuse to clone) is logged at warn level
//! and degrades to an empty result for the affected branch, so scans of
//! large fleets finish with whatever could be gathered.
//!
//! # Examples
//!
//! ```rust,no_run
//! use depscan_cli::core::{DepscanError, ErrorContext};
//!
//! fn materialise() -> Result<(), DepscanError> {
//!     Err(DepscanError::GitNotFound)
//! }
//!
//! match materialise() {
//!     Ok(()) => println!("done"),
//!     Err(e) => {
//!         ErrorContext::new(e)
//!             .with_suggestion("install git and make sure it is in PATH")
//!             .display(); // colored output with the hint line
//!     }
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for depscan operations.
#[derive(Error, Debug)]
pub enum DepscanError {
    /// Git executable not found in PATH.
    #[error("git is not installed or not found in PATH")]
    GitNotFound,

    /// A git command returned a non-zero exit code.
    ///
    /// # Fields
    /// - `operation`: the git subcommand that failed (e.g. "clone", "fetch")
    /// - `stderr`: the error output from git
    #[error("git operation failed: {operation}")]
    GitCommandError {
        /// The git subcommand that failed.
        operation: String,
        /// Captured stderr from the git process.
        stderr: String,
    },

    /// Repository clone failed.
    #[error("failed to clone repository: {url}\n{reason}")]
    GitCloneFailed {
        /// The repository URL that failed to clone.
        url: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Worktree checkout of a specific reference failed.
    #[error("failed to check out reference '{reference}'")]
    GitCheckoutFailed {
        /// The git reference (branch, tag, or commit) that failed.
        reference: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A manifest file is syntactically invalid.
    #[error("invalid manifest syntax in {file}")]
    ManifestParseError {
        /// Path of the manifest that failed to parse.
        file: String,
        /// Specific reason for the parse failure.
        reason: String,
    },

    /// A scan job carries an ecosystem tag no registered scanner claims.
    #[error("no scanner registered for ecosystem tag '{tag}'")]
    UnknownScanner {
        /// The unrecognised tag.
        tag: String,
    },

    /// The scan starting point does not exist.
    #[error("scan root does not exist: {path}")]
    ScanRootNotFound {
        /// The missing path.
        path: String,
    },

    /// A `url//subdir` reference pointed at a subdirectory absent from
    /// the materialised worktree.
    #[error("subdirectory '{subdir}' not found in {url}")]
    SubdirectoryNotFound {
        /// The requested subtree.
        subdir: String,
        /// The repository it was expected in.
        url: String,
    },

    /// The scanner registry contains no scanners.
    #[error("scanner registry is empty; nothing can be scanned")]
    RegistryEmpty,

    /// Configuration problem (cache directory, CLI flag combination).
    #[error("configuration error: {message}")]
    ConfigError {
        /// Description of the problem.
        message: String,
    },

    /// The scan was cancelled while a subprocess was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Catch-all for errors without a dedicated variant.
    #[error("{message}")]
    Other {
        /// The error description.
        message: String,
    },
}

/// Wrapper that pairs an error with user-facing guidance.
///
/// The CLI prints this on exit; libraries just propagate the inner
/// error.
pub struct ErrorContext {
    /// The underlying error.
    pub error: anyhow::Error,
    /// One-line actionable suggestion.
    pub suggestion: Option<String>,
    /// Longer background for the curious.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wraps an error with no guidance attached.
    #[must_use]
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Attaches a suggestion line.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attaches a details line.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error to stderr with color when attached to a
    /// terminal.
    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.error);
        for cause in self.error.chain().skip(1) {
            eprintln!("  {} {cause}", "caused by:".dimmed());
        }
        if let Some(details) = &self.details {
            eprintln!("  {details}");
        }
        if let Some(suggestion) = &self.suggestion {
            eprintln!("{} {suggestion}", "hint:".yellow().bold());
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nhint: {suggestion}")?;
        }
        Ok(())
    }
}

/// Converts an error into an [`ErrorContext`] with a suggestion matched
/// to the failure mode.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let suggestion = match error.downcast_ref::<DepscanError>() {
        Some(DepscanError::GitNotFound) => {
            Some("install git from https://git-scm.com/ and make sure it is in PATH".to_string())
        }
        Some(DepscanError::GitCloneFailed { url, .. }) => Some(format!(
            "check that {url} is reachable and that you have access to it"
        )),
        Some(DepscanError::GitCheckoutFailed { reference, .. }) => Some(format!(
            "verify that '{reference}' exists in the repository (tag, branch, or commit)"
        )),
        Some(DepscanError::ScanRootNotFound { .. }) => {
            Some("pass an existing directory or a remote reference like github.com/org/repo".to_string())
        }
        Some(DepscanError::SubdirectoryNotFound { url, .. }) => Some(format!(
            "list the repository contents with: git ls-tree -r --name-only HEAD (in a clone of {url})"
        )),
        Some(DepscanError::UnknownScanner { tag }) => Some(format!(
            "known tags are go, pip, npm, docker, helm; '{tag}' is none of them"
        )),
        Some(DepscanError::ConfigError { .. }) => {
            Some("run with --help to see accepted flags and environment variables".to_string())
        }
        _ => None,
    };

    let mut ctx = ErrorContext::new(error);
    ctx.suggestion = suggestion;
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_command_error_formats_operation() {
        let err = DepscanError::GitCommandError {
            operation: "fetch".to_string(),
            stderr: "network unreachable".to_string(),
        };
        assert_eq!(err.to_string(), "git operation failed: fetch");
    }

    #[test]
    fn friendly_error_suggests_for_known_variants() {
        let ctx = user_friendly_error(DepscanError::GitNotFound.into());
        assert!(ctx.suggestion.unwrap().contains("git-scm.com"));

        let ctx = user_friendly_error(anyhow::anyhow!("opaque"));
        assert!(ctx.suggestion.is_none());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DepscanError = io.into();
        assert!(matches!(err, DepscanError::IoError(_)));
    }
}
