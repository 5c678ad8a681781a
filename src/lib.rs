//! depscan: multi-ecosystem dependency graph crawler.
//!
//! Given a starting point, either a local working tree or a remote
//! repository reference like `https://github.com/org/repo//chart@v2`, depscan
//! discovers every declared dependency, optionally follows transitive
//! dependencies through a git clone/worktree cache up to a configurable
//! depth, reconciles divergent versions into a conflict report, and
//! emits a flat list plus a tree keyed by parent.
//!
//! # Architecture
//!
//! - [`model`]: the normalised dependency record and the glob filter
//! - [`context`]: per-request scan context (depth, filter, cancellation)
//! - [`scanner`]: per-ecosystem manifest scanners and their registry
//! - [`locator`]: input path parsing (`url//subdir@version`)
//! - [`discovery`]: per-directory manifest to scan-job expansion
//! - [`repo`]: bare-clone/worktree cache and version-alias resolution
//! - [`git`]: async wrapper over the system git command
//! - [`walker`]: the concurrent, depth-bounded discovery engine
//! - [`tree`]: flat-list/tree aggregation and conflict detection
//! - [`cli`] / [`core`] / [`utils`]: command surface, errors, helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use depscan_cli::repo::RepoManager;
//! use depscan_cli::scanner::ScannerRegistry;
//! use depscan_cli::walker::{ScanOptions, Walker};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let walker = Walker::new(
//!     Arc::new(ScannerRegistry::builtin()),
//!     Arc::new(RepoManager::new("/tmp/depscan-cache")),
//! );
//! let (result, _tree) = walker
//!     .scan("./my-project", ScanOptions { max_depth: 1, ..Default::default() })
//!     .await?;
//! println!("{} dependencies", result.metadata.total_dependencies);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod context;
pub mod core;
pub mod discovery;
pub mod git;
pub mod locator;
pub mod model;
pub mod repo;
pub mod scanner;
pub mod tree;
pub mod utils;
pub mod walker;

// Fixture helpers, available to unit tests and integration tests alike.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
