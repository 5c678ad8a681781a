//! Ecosystem scanner capability and registry.
//!
//! A scanner turns one manifest family (`go.mod`, `package.json`,
//! `Dockerfile`, ...) into normalised [`Dependency`] records. Scanners
//! are pure: given a filename and its content they may not touch the
//! filesystem or the network, which keeps them trivially testable and
//! safe to run concurrently.
//!
//! The registry is an explicit value constructed once at startup
//! ([`ScannerRegistry::builtin`]) rather than a load-time global. After
//! construction it is read-only, so lookups need no locking.

use crate::context::ScanContext;
use crate::core::DepscanError;
use crate::model::{Dependency, Ecosystem};
use anyhow::Result;
use glob::Pattern;
use std::path::Path;
use std::sync::Arc;

mod docker;
mod gomod;
mod helm;
mod node;
mod python;

pub use docker::DockerScanner;
pub use gomod::GoModScanner;
pub use helm::HelmScanner;
pub use node::NodeScanner;
pub use python::PythonScanner;

/// Capability interface implemented by each ecosystem scanner.
pub trait Scanner: Send + Sync {
    /// The ecosystem tag this scanner owns. Registry lookup is by this
    /// tag's string form.
    fn ecosystem(&self) -> Ecosystem;

    /// Glob patterns for manifest filenames this scanner claims, matched
    /// non-recursively against the immediate contents of one directory.
    fn file_patterns(&self) -> &'static [&'static str];

    /// Parses one manifest into dependency records.
    ///
    /// `path` is used for source strings only; implementations must not
    /// read from it. Records come back with `depth == 0`; the walker
    /// stamps the real depth.
    ///
    /// # Errors
    ///
    /// Returns an error when the content is syntactically invalid for
    /// the manifest family. The walker logs it and treats the file as
    /// contributing zero records.
    fn scan_file(&self, ctx: &ScanContext, path: &Path, content: &str) -> Result<Vec<Dependency>>;
}

/// Process-wide map from ecosystem tag to scanner.
///
/// Registration order matters only for files claimed by more than one
/// scanner (first registered wins); files claimed by exactly one scanner
/// are order-independent.
///
/// # Examples
///
/// ```rust
/// use depscan_cli::context::ScanContext;
/// use depscan_cli::scanner::ScannerRegistry;
/// use std::path::Path;
///
/// let registry = ScannerRegistry::builtin();
/// let scanner = registry.scanner_for("go.mod").expect("go.mod is claimed");
///
/// // Scanners are pure: filename plus content in, records out.
/// let ctx = ScanContext::new("/work/project", 0);
/// let deps = scanner.scan_file(
///     &ctx,
///     Path::new("go.mod"),
///     "module m\nrequire github.com/a/b v1.2.3\n",
/// )?;
/// assert_eq!(deps[0].name, "github.com/a/b");
/// assert_eq!(deps[0].version, "v1.2.3");
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Clone)]
pub struct ScannerRegistry {
    scanners: Vec<Arc<dyn Scanner>>,
}

impl ScannerRegistry {
    /// An empty registry. Useful in tests; a scan against it fails with
    /// [`DepscanError::RegistryEmpty`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            scanners: Vec::new(),
        }
    }

    /// The registry with all built-in scanners registered.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GoModScanner));
        registry.register(Arc::new(PythonScanner));
        registry.register(Arc::new(NodeScanner::new()));
        registry.register(Arc::new(DockerScanner));
        registry.register(Arc::new(HelmScanner));
        registry
    }

    /// Adds a scanner. Intended for startup only; the walker assumes the
    /// registry no longer changes once scanning begins.
    pub fn register(&mut self, scanner: Arc<dyn Scanner>) {
        self.scanners.push(scanner);
    }

    /// Whether no scanner is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    /// All registered scanners in registration order.
    #[must_use]
    pub fn scanners(&self) -> &[Arc<dyn Scanner>] {
        &self.scanners
    }

    /// Looks up a scanner by ecosystem tag.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<dyn Scanner>> {
        self.scanners
            .iter()
            .find(|s| s.ecosystem().as_str() == tag)
            .cloned()
    }

    /// Like [`get`](Self::get) but produces a typed error carrying a
    /// nearest-tag suggestion for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`DepscanError::UnknownScanner`] when no scanner owns the
    /// tag.
    pub fn get_or_err(&self, tag: &str) -> Result<Arc<dyn Scanner>> {
        self.get(tag).ok_or_else(|| {
            if let Some(close) = self.closest_tag(tag) {
                tracing::warn!("unknown scanner tag '{tag}', did you mean '{close}'?");
            }
            DepscanError::UnknownScanner {
                tag: tag.to_string(),
            }
            .into()
        })
    }

    /// The registered tag closest to `tag`, when reasonably similar.
    #[must_use]
    pub fn closest_tag(&self, tag: &str) -> Option<String> {
        self.scanners
            .iter()
            .map(|s| s.ecosystem().as_str())
            .map(|known| (known, strsim::jaro_winkler(tag, known)))
            .filter(|(_, score)| *score > 0.8)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(known, _)| known.to_string())
    }

    /// The scanner claiming `file_name`, if any. First registered wins
    /// when patterns overlap.
    #[must_use]
    pub fn scanner_for(&self, file_name: &str) -> Option<Arc<dyn Scanner>> {
        self.scanners
            .iter()
            .find(|s| {
                s.file_patterns().iter().any(|p| {
                    Pattern::new(p).is_ok_and(|pattern| pattern.matches(file_name))
                })
            })
            .cloned()
    }
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registers_all_ecosystems() {
        let registry = ScannerRegistry::builtin();
        for tag in ["go", "pip", "npm", "docker", "helm"] {
            assert!(registry.get(tag).is_some(), "missing scanner for {tag}");
        }
        assert!(registry.get("cargo").is_none());
    }

    #[test]
    fn files_route_to_their_scanner() {
        let registry = ScannerRegistry::builtin();
        let cases = [
            ("go.mod", "go"),
            ("go.sum", "go"),
            ("requirements-dev.txt", "pip"),
            ("pyproject.toml", "pip"),
            ("package.json", "npm"),
            ("pnpm-lock.yaml", "npm"),
            ("Dockerfile", "docker"),
            ("Dockerfile.prod", "docker"),
            ("docker-compose.yml", "docker"),
            ("Chart.yaml", "helm"),
            ("values-staging.yaml", "helm"),
        ];
        for (file, tag) in cases {
            let scanner = registry.scanner_for(file).unwrap_or_else(|| {
                panic!("no scanner claimed {file}");
            });
            assert_eq!(scanner.ecosystem().as_str(), tag, "{file}");
        }
        assert!(registry.scanner_for("README.md").is_none());
    }

    #[test]
    fn unknown_tag_suggests_neighbor() {
        let registry = ScannerRegistry::builtin();
        assert_eq!(registry.closest_tag("dokker"), Some("docker".to_string()));
        assert!(registry.get_or_err("dokker").is_err());
    }
}
