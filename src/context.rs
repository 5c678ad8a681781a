//! Scan context carried through an entire walk.
//!
//! One [`ScanContext`] is created per top-level request and shared by
//! every task the walker spawns. It bundles the scan root, the depth
//! bound, the record filter, the indirect-dependency policy, and a
//! cancellation flag checked at each suspension point.
//!
//! Logging goes through `tracing`: events emitted while no subscriber is
//! installed are dropped, so library callers that configure nothing get
//! the required null-safe behaviour for free.

use crate::model::{Dependency, FilterSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared, immutable-after-construction state for one scan request.
///
/// Cloning is cheap (`Arc` internals); descending does not copy the
/// context, scan jobs carry their own depth instead.
///
/// # Examples
///
/// ```rust
/// use depscan_cli::context::ScanContext;
/// use depscan_cli::model::{Dependency, Ecosystem, FilterSet};
///
/// let ctx = ScanContext::new("/work/project", 1)
///     .with_filter(FilterSet::parse("github.com/*")?);
///
/// let dep = Dependency::new(Ecosystem::Go, "github.com/a/b", "v1.0.0", "go.mod:3");
/// assert!(ctx.matches(&dep));
///
/// // Cancellation is shared across clones.
/// let clone = ctx.clone();
/// ctx.cancel();
/// assert!(clone.is_cancelled());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Absolute path scanning started from.
    pub scan_root: PathBuf,
    /// Maximum BFS depth; 0 disables traversal entirely.
    pub max_depth: u32,
    /// Whether records declared indirect survive filtering.
    pub show_indirect: bool,
    filter: Arc<FilterSet>,
    cancelled: Arc<AtomicBool>,
}

impl ScanContext {
    /// Creates a context with no filter and indirect records suppressed.
    #[must_use]
    pub fn new(scan_root: impl Into<PathBuf>, max_depth: u32) -> Self {
        Self {
            scan_root: scan_root.into(),
            max_depth,
            show_indirect: false,
            filter: Arc::new(FilterSet::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the record filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterSet) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Sets the indirect-dependency policy.
    #[must_use]
    pub fn with_show_indirect(mut self, show: bool) -> Self {
        self.show_indirect = show;
        self
    }

    /// Shares an externally-held cancellation flag, letting the caller
    /// cancel a scan it no longer owns a handle to.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// The active record filter.
    #[must_use]
    pub fn filter(&self) -> &FilterSet {
        &self.filter
    }

    /// Single-record filter test: the glob filter plus the indirect
    /// policy.
    #[must_use]
    pub fn matches(&self, dep: &Dependency) -> bool {
        if dep.indirect && !self.show_indirect {
            return false;
        }
        dep.matches(&self.filter)
    }

    /// Removes records that fail [`matches`](Self::matches), preserving
    /// order.
    #[must_use]
    pub fn filter_deps(&self, deps: Vec<Dependency>) -> Vec<Dependency> {
        deps.into_iter().filter(|d| self.matches(d)).collect()
    }

    /// Signals cancellation. In-flight scans return empty results; the
    /// walk completes with whatever was gathered so far.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The raw cancellation flag, for components (like the repository
    /// manager) that need to abort in-flight subprocesses.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}
