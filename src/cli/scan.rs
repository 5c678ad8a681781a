//! The `scan` command.

use crate::model::FilterSet;
use crate::repo::{RepoManager, resolve_cache_root};
use crate::scanner::ScannerRegistry;
use crate::tree::{DependencyTree, ScanResult};
use crate::walker::{ScanOptions, Walker};
use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Output rendering for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented tree plus a conflict summary.
    Tree,
    /// The stable JSON wire schema.
    Json,
}

/// Arguments for `depscan scan`.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory or remote reference (`url[//subdir][@version]`).
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: String,

    /// Follow transitive dependencies up to this depth (0 = root only).
    #[arg(long, short = 'd', default_value_t = 0)]
    pub max_depth: u32,

    /// Space-separated glob filter; `!` negates (e.g. "github.com/* !*test*").
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Include dependencies declared as indirect.
    #[arg(long)]
    pub show_indirect: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Tree)]
    pub format: OutputFormat,

    /// Repository cache directory (overrides DEPSCAN_CACHE_DIR).
    #[arg(long, env = "DEPSCAN_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum concurrent scan tasks.
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Clone repositories shallowly with this depth.
    #[arg(long)]
    pub shallow: Option<u32>,
}

impl ScanArgs {
    /// Runs the scan and renders the result.
    ///
    /// # Errors
    ///
    /// Fails when the starting point cannot be enumerated or the filter
    /// expression is invalid.
    pub async fn execute(self, quiet: bool) -> Result<()> {
        let filter = match &self.filter {
            Some(expr) => FilterSet::parse(expr)?,
            None => FilterSet::default(),
        };

        let cache_root = resolve_cache_root(self.cache_dir.as_deref())?;
        let repos = Arc::new(RepoManager::new(cache_root).with_shallow_depth(self.shallow));
        let registry = Arc::new(ScannerRegistry::builtin());
        let walker = Walker::new(registry, Arc::clone(&repos));

        let spinner = if quiet || !console_is_interactive() {
            None
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_message(format!("scanning {}", self.path));
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        };

        let options = ScanOptions {
            max_depth: self.max_depth,
            filter,
            show_indirect: self.show_indirect,
            max_parallel: self.max_parallel,
            cancel: None,
        };
        let scan_outcome = walker.scan(&self.path, options).await;

        if let Some(bar) = spinner {
            bar.finish_and_clear();
        }
        repos.close().await;

        let (result, tree) = scan_outcome?;
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            OutputFormat::Tree => print_tree(&result, &tree),
        }
        Ok(())
    }
}

fn console_is_interactive() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

fn print_tree(result: &ScanResult, tree: &DependencyTree) {
    let conflicted: HashSet<&str> = result
        .conflicts
        .iter()
        .map(|c| c.dependency_name.as_str())
        .collect();

    fn print_node(
        tree: &DependencyTree,
        conflicted: &HashSet<&str>,
        name: &str,
        version: &str,
        kind: &str,
        indent: usize,
        on_path: &mut Vec<String>,
    ) {
        let pad = "  ".repeat(indent);
        let marker = if conflicted.contains(name) {
            " !".yellow().bold().to_string()
        } else {
            String::new()
        };
        println!("{pad}{} {} {}{marker}", name.bold(), version.dimmed(), format!("({kind})").cyan());

        if on_path.iter().any(|seen| seen == name) {
            return; // cycle guard for display only
        }
        on_path.push(name.to_string());
        if let Some(children) = tree.children.get(name) {
            for child in children {
                print_node(
                    tree,
                    conflicted,
                    &child.name,
                    &child.version,
                    child.ecosystem.as_str(),
                    indent + 1,
                    on_path,
                );
            }
        }
        on_path.pop();
    }

    let roots = tree
        .children
        .get(crate::model::ROOT_PARENT)
        .cloned()
        .unwrap_or_default();
    let mut printed = HashSet::new();
    for dep in &roots {
        if !printed.insert(dep.key()) {
            continue;
        }
        let mut on_path = Vec::new();
        print_node(
            tree,
            &conflicted,
            &dep.name,
            &dep.version,
            dep.ecosystem.as_str(),
            0,
            &mut on_path,
        );
    }

    println!();
    let meta = &result.metadata;
    println!(
        "{} dependencies, {} repositories, max depth {}",
        meta.total_dependencies, meta.repositories_found, meta.max_depth
    );

    if !result.conflicts.is_empty() {
        println!();
        println!("{}", "version conflicts:".yellow().bold());
        for conflict in &result.conflicts {
            let versions: Vec<&str> =
                conflict.versions.iter().map(|v| v.version.as_str()).collect();
            println!(
                "  {} {} {}",
                "!".yellow().bold(),
                conflict.dependency_name,
                versions.join(" vs ").dimmed()
            );
        }
    }
}
