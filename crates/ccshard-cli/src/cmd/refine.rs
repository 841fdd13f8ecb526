//! Refine subcommand - re-filter finished shard files into a new directory

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use ccshard_commoncrawl::{Layout, QualityPolicy, ShardWriter, refine};
use ccshard_core::fmt_num;

use super::{Session, print_summary};

#[derive(Args, Debug)]
pub struct RefineArgs {
    /// Snapshot whose shard files are refined
    pub snapshot: String,

    /// Output directory (default: <root>/data/<snapshot>-refined)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Only deduplicate, skip the quality heuristics
    #[arg(long)]
    pub dedupe_only: bool,
}

pub fn run(args: RefineArgs, session: &Session) -> Result<ExitCode> {
    let layout = Layout::new(&session.config.paths.root);
    let prefix = &session.config.language.prefix;
    let input = ShardWriter::new(layout.data_dir(&args.snapshot), prefix);
    let output_dir = args
        .output
        .unwrap_or_else(|| layout.data_dir(&format!("{}-refined", args.snapshot)));
    let output = ShardWriter::new(output_dir, prefix);
    let workers = session.config.worker_count(args.workers)?;

    // refine always applies the heuristics unless asked not to
    let policy: Option<QualityPolicy> =
        (!args.dedupe_only).then(|| session.config.quality.policy.clone());

    log::info!("Refining {}", args.snapshot);
    log::info!("  Input: {}", input.dir().display());
    log::info!("  Output: {}", output.dir().display());

    let summary = refine(&input, &output, policy.as_ref(), workers, &session.progress)
        .with_context(|| format!("Failed to refine {}", input.dir().display()))?;

    let t = &summary.totals;
    print_summary(
        "Refine",
        &[
            (
                "Files",
                format!(
                    "{} refined, {} already present ({} failed)",
                    fmt_num(summary.files_refined),
                    fmt_num(summary.files_skipped),
                    summary.failed_indices.len()
                ),
            ),
            (
                "Records",
                format!("{} -> {}", fmt_num(t.records_in), fmt_num(t.records_out)),
            ),
            (
                "Removed",
                format!(
                    "{} quality, {} duplicates",
                    fmt_num(t.quality_rejected),
                    fmt_num(t.duplicates_removed)
                ),
            ),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );

    if !summary.failed_indices.is_empty() {
        anyhow::bail!("Some shard files failed to refine");
    }
    Ok(ExitCode::SUCCESS)
}
