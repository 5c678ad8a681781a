//! Input path parsing and local/remote classification.
//!
//! A scan starts from either a local directory or a remote reference of
//! the form `url[//subdir][@version]`:
//!
//! - `https://github.com/org/repo//chart/sub@v1.2.3`
//! - `git@host:org/repo@HEAD`
//! - `github.com/org/repo` (bare host form)
//! - `./local/dir`, `/abs/path`
//!
//! The version is split off at the *last* `@`, guarding against the `@`
//! inside scp-style prefixes (`git@host:...`) and userinfo segments.
//! The subdirectory separator is the first `//` that appears *after* the
//! protocol separator, so `https://` never matches itself.
//!
//! # Example
//!
//! ```rust
//! use depscan_cli::locator::ScanLocator;
//!
//! let loc = ScanLocator::parse("https://github.com/org/repo//chart@v2");
//! assert!(loc.is_remote);
//! assert_eq!(loc.git_url, "https://github.com/org/repo");
//! assert_eq!(loc.subdirectory, "chart");
//! assert_eq!(loc.version, "v2");
//!
//! let loc = ScanLocator::parse("./local/dir");
//! assert!(!loc.is_remote);
//! assert_eq!(loc.effective_version(), "");
//! ```

use std::fmt;

/// A classified scan starting point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLocator {
    /// Repository URL with subdirectory and version stripped. For local
    /// inputs this holds the path as given.
    pub git_url: String,
    /// Declared version, empty when none was given. Callers default to
    /// `HEAD` for remote references.
    pub version: String,
    /// Subtree restriction inside the repository, empty for whole-repo
    /// scans.
    pub subdirectory: String,
    /// Whether the input names a remote repository.
    pub is_remote: bool,
}

impl ScanLocator {
    /// Parses an input path. Parsing never fails; unrecognised inputs
    /// classify as local paths.
    ///
    /// # Algorithm
    ///
    /// 1. Split the version off at the last `@`, unless the suffix
    ///    contains `/` or `:` (then the `@` belongs to userinfo, as in
    ///    `git@host:org/repo`)
    /// 2. Split the subdirectory off at the first `//` located after
    ///    any `://` protocol separator
    /// 3. Classify as remote when the URL starts with `https://` or
    ///    `git@`, or mentions a known forge host without being a
    ///    filesystem path
    ///
    /// # Examples
    ///
    /// ```rust
    /// use depscan_cli::locator::ScanLocator;
    ///
    /// // scp-style reference with an explicit version
    /// let loc = ScanLocator::parse("git@host:org/repo@HEAD");
    /// assert_eq!(loc.git_url, "git@host:org/repo");
    /// assert_eq!(loc.version, "HEAD");
    ///
    /// // the userinfo '@' alone is not a version separator
    /// let loc = ScanLocator::parse("git@github.com:org/repo");
    /// assert_eq!(loc.version, "");
    /// assert_eq!(loc.effective_version(), "HEAD");
    ///
    /// // bare host form counts as remote
    /// assert!(ScanLocator::parse("github.com/org/repo").is_remote);
    ///
    /// // paths that merely mention a host stay local
    /// assert!(!ScanLocator::parse("./mirrors/github.com/org/repo").is_remote);
    /// ```
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let (candidate, version) = split_version(input);
        let (git_url, subdirectory) = split_subdirectory(candidate);
        let is_remote = classify_remote(&git_url);

        Self {
            git_url,
            version: version.to_string(),
            subdirectory,
            is_remote,
        }
    }

    /// The version to use when materialising, applying the remote
    /// default.
    #[must_use]
    pub fn effective_version(&self) -> &str {
        if self.version.is_empty() && self.is_remote {
            "HEAD"
        } else {
            &self.version
        }
    }
}

impl fmt::Display for ScanLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.git_url)?;
        if !self.subdirectory.is_empty() {
            write!(f, "//{}", self.subdirectory)?;
        }
        if !self.version.is_empty() {
            write!(f, "@{}", self.version)?;
        }
        Ok(())
    }
}

/// Splits `s` into `(candidate_url, version)` at the last `@`.
///
/// The suffix counts as a version only when it contains neither `/` nor
/// `:`. An `@` followed by host/path characters is userinfo (an
/// email-like prefix), as in `git@host:org/repo`.
fn split_version(s: &str) -> (&str, &str) {
    if let Some(idx) = s.rfind('@') {
        let (prefix, suffix) = (&s[..idx], &s[idx + 1..]);
        if !suffix.is_empty() && !suffix.contains('/') && !suffix.contains(':') && !prefix.is_empty()
        {
            return (prefix, suffix);
        }
    }
    (s, "")
}

/// Splits a candidate URL into `(git_url, subdirectory)` at the first
/// `//` located after any `://` protocol separator.
fn split_subdirectory(s: &str) -> (String, String) {
    let search_from = s.find("://").map_or(0, |i| i + 3);
    if let Some(rel) = s[search_from..].find("//") {
        let idx = search_from + rel;
        return (s[..idx].to_string(), s[idx + 2..].to_string());
    }
    (s.to_string(), String::new())
}

fn classify_remote(url: &str) -> bool {
    if crate::utils::is_local_path(url) {
        return false;
    }
    if url.starts_with("https://") || url.starts_with("git@") {
        return true;
    }
    ["github.com", "gitlab.com", "bitbucket.org"]
        .iter()
        .any(|host| url.contains(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_with_subdir_and_version() {
        let loc = ScanLocator::parse("https://github.com/org/repo//chart/sub@v1.2.3");
        assert_eq!(loc.git_url, "https://github.com/org/repo");
        assert_eq!(loc.subdirectory, "chart/sub");
        assert_eq!(loc.version, "v1.2.3");
        assert!(loc.is_remote);
    }

    #[test]
    fn scp_style_with_version() {
        let loc = ScanLocator::parse("git@host:org/repo@HEAD");
        assert_eq!(loc.git_url, "git@host:org/repo");
        assert_eq!(loc.version, "HEAD");
        assert!(loc.is_remote);
    }

    #[test]
    fn scp_style_without_version_keeps_userinfo_at() {
        let loc = ScanLocator::parse("git@github.com:org/repo");
        assert_eq!(loc.git_url, "git@github.com:org/repo");
        assert_eq!(loc.version, "");
        assert_eq!(loc.effective_version(), "HEAD");
        assert!(loc.is_remote);
    }

    #[test]
    fn bare_host_form_is_remote() {
        let loc = ScanLocator::parse("github.com/org/repo");
        assert!(loc.is_remote);
        assert_eq!(loc.git_url, "github.com/org/repo");
    }

    #[test]
    fn local_paths_are_not_remote() {
        for input in ["./local/dir", "/abs/path", "../up/one", "plain-dir"] {
            let loc = ScanLocator::parse(input);
            assert!(!loc.is_remote, "{input} misclassified as remote");
            assert_eq!(loc.effective_version(), "");
        }
    }

    #[test]
    fn relative_path_mentioning_host_stays_local() {
        let loc = ScanLocator::parse("./mirrors/github.com/org/repo");
        assert!(!loc.is_remote);
    }

    #[test]
    fn trailing_at_means_no_version() {
        let loc = ScanLocator::parse("https://github.com/org/repo@");
        assert_eq!(loc.git_url, "https://github.com/org/repo");
        assert_eq!(loc.version, "");
    }

    #[test]
    fn protocol_separator_is_not_a_subdirectory() {
        let loc = ScanLocator::parse("https://github.com/org/repo");
        assert_eq!(loc.subdirectory, "");
        assert_eq!(loc.git_url, "https://github.com/org/repo");
    }

    #[test]
    fn display_round_trips() {
        let input = "https://github.com/org/repo//chart@v2";
        assert_eq!(ScanLocator::parse(input).to_string(), input);
    }
}
