//! CLI for the pget parallel fetcher.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pget_core::config::{self, FetchConfig};
use std::path::{Path, PathBuf};

use commands::{run_checksum, run_config, run_get, GetArgs};

/// Top-level CLI for pget.
#[derive(Debug, Parser)]
#[command(name = "pget")]
#[command(about = "pget: fetch many URLs in parallel under one deadline", long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of ~/.config/pget/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch URLs concurrently and save each body into a directory.
    Get {
        /// Direct HTTP/HTTPS URLs to fetch.
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Maximum fetches in flight at once (overrides config).
        #[arg(short, long, value_name = "N")]
        parallel: Option<usize>,

        /// Deadline for the whole batch in seconds (overrides config).
        /// Fetches not started by then are skipped; started ones finish.
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<f64>,

        /// Directory to save into (default: current directory).
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print the SHA-256 of each saved file.
        #[arg(long)]
        sha256: bool,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: String,
    },

    /// Print the effective configuration.
    Config,
}

fn load_config(explicit: Option<&Path>) -> Result<FetchConfig> {
    match explicit {
        Some(path) => config::load_from_path(path),
        None => config::load_or_init(),
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = load_config(cli.config.as_deref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                urls,
                parallel,
                timeout,
                output_dir,
                sha256,
            } => {
                let output_dir = match output_dir {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                let args = GetArgs {
                    urls,
                    parallel,
                    timeout,
                    output_dir,
                    sha256,
                };
                run_get(&cfg, args).await?;
            }
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
            CliCommand::Config => run_config(&cfg, cli.config.as_deref())?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
