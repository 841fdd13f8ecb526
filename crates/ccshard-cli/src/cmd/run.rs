//! Run subcommand - process a snapshot from a start index onward

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::{QualityFlags, Session, finish_run};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Snapshot identifier, e.g. CC-MAIN-2024-10
    pub snapshot: String,

    /// First manifest index to process
    #[arg(default_value_t = 0)]
    pub start_index: usize,

    /// Number of concurrent fetch workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    #[command(flatten)]
    pub quality: QualityFlags,
}

pub fn run(args: RunArgs, session: &Session) -> Result<ExitCode> {
    let quality = args.quality.resolve(&session.config);
    let mut config = session.run_config(&args.snapshot, args.workers, quality)?;
    config.start_index = args.start_index;

    let coordinator = session.coordinator(config)?;
    let config = coordinator.config();
    log::info!("Running {}", config.snapshot_id);
    log::info!("  Root: {}", config.root.display());
    log::info!("  Start index: {}", config.start_index);
    log::info!("  Workers: {}", config.concurrency);
    log::info!("  Quality: {}", if config.quality.is_some() { "on" } else { "off" });

    let summary = coordinator.run()?;
    Ok(finish_run("Run", &summary, &session.shutdown))
}
