//! Command-line interface for depscan.
//!
//! Each command is implemented in its own module with its own argument
//! struct and execution logic, keeping the commands independently
//! testable.
//!
//! # Available commands
//!
//! ## Scanning
//! - `scan` - crawl a local tree or remote reference for dependencies
//!
//! ## System management
//! - `cache dir` - print the repository cache location
//! - `cache size` - print the cache's on-disk size
//! - `cache clean` - remove every cached repository
//!
//! # Usage patterns
//!
//! ## Basic workflow
//! ```bash
//! # Scan the current directory, direct dependencies only
//! depscan scan
//!
//! # Follow transitive dependencies two levels deep
//! depscan scan ./my-service --max-depth 2
//!
//! # Scan a chart subtree of a remote repository at a tag
//! depscan scan 'https://github.com/org/repo//chart@v2.1.0'
//! ```
//!
//! ## Filtering and output
//! ```bash
//! # Only report (and traverse) matching dependencies
//! depscan scan . --max-depth 1 --filter 'github.com/* !*test*'
//!
//! # Machine-readable output on stdout
//! depscan scan . --format json
//! ```
//!
//! ## Cache maintenance
//! ```bash
//! depscan cache dir
//! depscan cache size
//! depscan cache clean
//! ```
//!
//! # Global options
//!
//! All commands support:
//! - `--verbose` - enable debug logging (same as `RUST_LOG=debug`)
//! - `--quiet` - suppress progress output
//!
//! An explicit `RUST_LOG` always wins over `--verbose`; with neither,
//! logging is off entirely. The tracing subscriber is installed by
//! `main`, never by this module, so library users keep full control
//! over their own logging setup.

mod cache;
mod scan;

pub use cache::CacheArgs;
pub use scan::{OutputFormat, ScanArgs};

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Multi-ecosystem dependency graph crawler.
#[derive(Parser)]
#[command(name = "depscan", version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (same as RUST_LOG=debug).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Suppress progress output.
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory or remote repository for dependencies.
    Scan(ScanArgs),
    /// Manage the repository cache.
    Cache(CacheArgs),
}

impl Cli {
    /// Runs the selected command.
    ///
    /// # Errors
    ///
    /// Propagates command failures for `main` to render.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Scan(args) => args.execute(self.quiet).await,
            Commands::Cache(args) => args.execute().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_args_parse() {
        let cli = Cli::parse_from([
            "depscan", "scan", "./proj", "--max-depth", "2", "--filter", "*bitnami*",
            "--format", "json",
        ]);
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.path, "./proj");
                assert_eq!(args.max_depth, 2);
                assert_eq!(args.filter.as_deref(), Some("*bitnami*"));
            }
            Commands::Cache(_) => panic!("expected scan"),
        }
    }
}
