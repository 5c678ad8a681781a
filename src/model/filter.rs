//! Glob-based record filtering.
//!
//! A filter expression is a space-separated list of glob patterns. A
//! leading `!` negates a pattern. A record matches when at least one
//! positive pattern accepts it (or no positive patterns exist) and no
//! negative pattern rejects it. Patterns are tested against both the
//! record name and its git URL.

use anyhow::{Context, Result};
use glob::Pattern;

/// A parsed filter expression.
///
/// The empty expression matches everything, which keeps "no filter" and
/// "filter that happens to be empty" indistinguishable for callers.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    positives: Vec<Pattern>,
    negatives: Vec<Pattern>,
    raw: String,
}

impl FilterSet {
    /// Parses a space-separated filter expression.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use depscan_cli::model::FilterSet;
    ///
    /// let filter = FilterSet::parse("github.com/* !*test*")?;
    /// assert!(filter.matches_record("github.com/org/lib", ""));
    /// assert!(!filter.matches_record("github.com/org/test-lib", ""));
    /// assert!(!filter.matches_record("example.com/other", ""));
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when any component is not a valid glob pattern.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut positives = Vec::new();
        let mut negatives = Vec::new();

        for token in expr.split_whitespace() {
            if let Some(negated) = token.strip_prefix('!') {
                if negated.is_empty() {
                    continue;
                }
                negatives.push(
                    Pattern::new(negated)
                        .with_context(|| format!("invalid filter pattern: !{negated}"))?,
                );
            } else {
                positives.push(
                    Pattern::new(token)
                        .with_context(|| format!("invalid filter pattern: {token}"))?,
                );
            }
        }

        Ok(Self {
            positives,
            negatives,
            raw: expr.trim().to_string(),
        })
    }

    /// Whether the expression contains no patterns at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positives.is_empty() && self.negatives.is_empty()
    }

    /// The original expression text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Tests a record's `name` and `git` fields; the first field to match
    /// a pattern wins.
    #[must_use]
    pub fn matches_record(&self, name: &str, git: &str) -> bool {
        if self.is_empty() {
            return true;
        }

        let hit = |p: &Pattern| p.matches(name) || (!git.is_empty() && p.matches(git));

        if self.negatives.iter().any(hit) {
            return false;
        }
        if self.positives.is_empty() {
            return true;
        }
        self.positives.iter().any(hit)
    }
}
