//! Merge subcommand - concatenate shard files into fixed-size groups

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use ccshard_commoncrawl::{Layout, ManifestStore, ShardWriter, merge};
use ccshard_core::fmt_num;

use super::{Session, print_summary};

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Snapshot whose shard files are merged
    pub snapshot: String,

    /// Shard files per merged file
    #[arg(short, long, default_value_t = 100)]
    pub group_size: usize,

    /// Read from this directory instead of <root>/data/<snapshot>
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory (default: <root>/data/<snapshot>-merged-<group-size>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: MergeArgs, session: &Session) -> Result<ExitCode> {
    let layout = Layout::new(&session.config.paths.root);
    let prefix = &session.config.language.prefix;

    // Group boundaries come from the manifest length, not from what is on disk
    let store = ManifestStore::new(layout.clone(), Arc::new(session.http_source()?));
    let manifest = store.load(&args.snapshot)?;

    let input_dir = args
        .input
        .unwrap_or_else(|| layout.data_dir(&args.snapshot));
    let output_dir = args.output.unwrap_or_else(|| {
        layout.data_dir(&format!("{}-merged-{}", args.snapshot, args.group_size))
    });
    let input = ShardWriter::new(input_dir, prefix);
    let output = ShardWriter::new(output_dir, prefix);

    log::info!("Merging {} in groups of {}", args.snapshot, args.group_size);
    log::info!("  Input: {}", input.dir().display());
    log::info!("  Output: {}", output.dir().display());

    let summary = merge(&input, &output, args.group_size, manifest.len())
        .with_context(|| format!("Failed to merge {}", input.dir().display()))?;

    print_summary(
        "Merge",
        &[
            (
                "Groups",
                format!(
                    "{} written, {} incomplete",
                    fmt_num(summary.groups_written),
                    summary.groups_incomplete.len()
                ),
            ),
            ("Records", fmt_num(summary.records_written)),
        ],
    );

    if !summary.groups_incomplete.is_empty() {
        log::warn!("Run complement first to finish the incomplete groups");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
