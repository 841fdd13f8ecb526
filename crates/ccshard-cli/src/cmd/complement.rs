//! Complement subcommand - fill in shard indices missing from a previous run

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::{QualityFlags, Session, finish_run};

#[derive(Args, Debug)]
pub struct ComplementArgs {
    /// Snapshot identifier, e.g. CC-MAIN-2024-10
    pub snapshot: String,

    #[command(flatten)]
    pub quality: QualityFlags,
}

pub fn run(args: ComplementArgs, session: &Session) -> Result<ExitCode> {
    let quality = args.quality.resolve(&session.config);
    // missing indices are processed one at a time
    let config = session.run_config(&args.snapshot, Some(1), quality)?;

    let coordinator = session.coordinator(config)?;
    let config = coordinator.config();
    log::info!("Complementing {}", config.snapshot_id);
    log::info!("  Output: {}", config.writer().dir().display());

    let summary = coordinator.complement()?;
    if summary.total_shards == 0 {
        session
            .progress
            .println("Nothing to do: every shard has an output file.");
        return Ok(ExitCode::SUCCESS);
    }
    Ok(finish_run("Complement", &summary, &session.shutdown))
}
