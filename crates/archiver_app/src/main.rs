mod config;
mod git;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use archiver_core::LineScanExtractor;
use archiver_engine::{Archiver, SnapshotRepository, SnapshotStore, Synchronizer};
use archiver_logging::{archiver_error, archiver_info};
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::git::GitCli;
use crate::logging::LogDestination;

/// Commit downloaded snapshots into a git history and archive their external links.
#[derive(Parser)]
#[clap(name = "snapshot-archiver", version)]
struct Cli {
    /// Path to the RON config file
    #[clap(long, default_value = "config.ron")]
    config: PathBuf,

    /// Log per-link and per-file detail
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commit every snapshot newer than the latest commit
    Commit,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    let destination = match &config.log_file {
        Some(path) => LogDestination::Both(path),
        None => LogDestination::Terminal,
    };
    logging::initialize(destination, archiver_logging::level_for(cli.verbose));

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = match cli.command {
        Commands::Commit => runtime.block_on(commit(&config)),
    };
    if let Err(err) = &result {
        archiver_error!("{err:#}");
    }
    result
}

async fn commit(config: &AppConfig) -> Result<()> {
    let git = GitCli::new(&config.git);
    let repository =
        SnapshotRepository::open(&config.project, git.repository(), config.git.page_order)
            .context("failed to load the committed snapshot")?;
    let archiver = if config.external_link.enabled {
        Some(
            Archiver::new(config.external_link.clone(), git.repository())
                .context("invalid external_link settings")?,
        )
    } else {
        None
    };
    let store = SnapshotStore::new(config.snapshot_directory.clone());
    let start = config.start_timestamp()?;

    let mut sync = Synchronizer::new(
        &config.project,
        repository,
        archiver,
        Box::new(LineScanExtractor),
        git,
    );
    let committed = sync.commit_snapshots(&store, start).await?;
    archiver_info!("committed {} snapshots", committed.len());
    Ok(())
}
