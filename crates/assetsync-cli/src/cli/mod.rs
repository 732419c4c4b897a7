//! CLI for the assetsync hot-update engine.

mod commands;

use anyhow::Result;
use assetsync_core::config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_check, run_checksum, run_diff, run_status, run_update, UpdateArgs};

/// Top-level CLI for assetsync.
#[derive(Debug, Parser)]
#[command(name = "assetsync")]
#[command(about = "assetsync: incremental updater for versioned asset bundles", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Check whether a newer version is published. Downloads no assets.
    Check {
        /// Manifest shipped with the application.
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,
        /// Directory holding installed assets.
        #[arg(long, value_name = "DIR")]
        storage: PathBuf,
    },

    /// Download and install the newest published version.
    Update {
        /// Manifest shipped with the application.
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,
        /// Directory holding installed assets.
        #[arg(long, value_name = "DIR")]
        storage: PathBuf,
        /// Override the configured number of simultaneous transfers.
        #[arg(long, value_name = "N")]
        max_concurrent: Option<usize>,
        /// Check each received asset against its manifest MD5.
        #[arg(long)]
        verify: bool,
        /// Retry failed assets up to N times before giving up.
        #[arg(long, default_value = "0", value_name = "N")]
        retries: u32,
    },

    /// Print which assets were added, modified or deleted between two manifests.
    Diff {
        /// Older manifest file.
        from: PathBuf,
        /// Newer manifest file.
        to: PathBuf,
    },

    /// Show the installed version and any interrupted update.
    Status {
        /// Directory holding installed assets.
        #[arg(long, value_name = "DIR")]
        storage: PathBuf,
    },

    /// Compute MD5 and SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Check { manifest, storage } => run_check(&cfg, &manifest, &storage).await?,
            CliCommand::Update {
                manifest,
                storage,
                max_concurrent,
                verify,
                retries,
            } => {
                let args = UpdateArgs {
                    manifest,
                    storage,
                    max_concurrent,
                    verify,
                    retries,
                };
                run_update(&cfg, &args).await?;
            }
            CliCommand::Diff { from, to } => run_diff(&from, &to)?,
            CliCommand::Status { storage } => run_status(&cfg, &storage)?,
            CliCommand::Checksum { path } => run_checksum(&path)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
