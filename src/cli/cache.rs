//! The `cache` command.

use crate::repo::{RepoManager, resolve_cache_root};
use crate::utils::format_bytes;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Arguments for `depscan cache`.
#[derive(Debug, Args)]
pub struct CacheArgs {
    /// Repository cache directory (overrides DEPSCAN_CACHE_DIR).
    #[arg(long, env = "DEPSCAN_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Print the cache directory.
    Dir,
    /// Print the cache size on disk.
    Size,
    /// Remove every cached repository.
    Clean,
}

impl CacheArgs {
    /// Runs the selected cache operation.
    ///
    /// # Errors
    ///
    /// Fails when the cache root cannot be resolved or removed.
    pub async fn execute(self) -> Result<()> {
        let root = resolve_cache_root(self.cache_dir.as_deref())?;
        let manager = RepoManager::new(&root);
        match self.command {
            CacheCommand::Dir => println!("{}", root.display()),
            CacheCommand::Size => println!("{}", format_bytes(manager.cache_size())),
            CacheCommand::Clean => {
                manager.clean().await?;
                println!("removed {}", root.display());
            }
        }
        Ok(())
    }
}
