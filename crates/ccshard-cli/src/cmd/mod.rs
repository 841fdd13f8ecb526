pub mod complement;
pub mod merge;
pub mod refine;
pub mod run;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use ccshard_commoncrawl::{Coordinator, QualityPolicy, RunConfig, RunSummary, ScriptClassifier};
use ccshard_core::{BackoffPolicy, HttpConfig, HttpSource, SharedProgress, Shutdown, fmt_num};

use crate::config::Config;

/// Resolved settings shared by every subcommand
pub struct Session {
    pub config: Config,
    pub http: HttpConfig,
    pub backoff: BackoffPolicy,
    pub progress: SharedProgress,
    pub shutdown: Shutdown,
}

impl Session {
    /// Run configuration for `snapshot_id`, ready for a [`Coordinator`]
    pub fn run_config(
        &self,
        snapshot_id: &str,
        workers: Option<usize>,
        quality: Option<QualityPolicy>,
    ) -> Result<RunConfig> {
        let mut run = RunConfig::new(
            &self.config.paths.root,
            snapshot_id,
            self.config.worker_count(workers)?,
        );
        run.target = self.config.target();
        run.prefix = self.config.language.prefix.clone();
        run.quality = quality;
        run.backoff = self.backoff;
        run.shutdown = self.shutdown.clone();
        run.progress = self.progress.clone();
        Ok(run)
    }

    pub fn http_source(&self) -> Result<HttpSource> {
        HttpSource::new(self.http.clone()).context("Failed to build HTTP client")
    }

    pub fn coordinator(&self, run: RunConfig) -> Result<Coordinator> {
        let source = self.http_source()?;
        Ok(Coordinator::new(
            run,
            Arc::new(source),
            Arc::new(ScriptClassifier),
        ))
    }
}

/// `--quality` / `--no-quality`, overriding `[quality] enabled`
#[derive(Args, Debug, Clone, Copy)]
pub struct QualityFlags {
    /// Apply the quality heuristics
    #[arg(long, overrides_with = "no_quality")]
    pub quality: bool,

    /// Skip the quality heuristics
    #[arg(long, overrides_with = "quality")]
    pub no_quality: bool,
}

impl QualityFlags {
    pub fn resolve(self, config: &Config) -> Option<QualityPolicy> {
        let flag = match (self.quality, self.no_quality) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        config.quality(flag)
    }
}

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

/// Print the pass summary and map it to the process exit code
pub fn finish_run(title: &str, summary: &RunSummary, shutdown: &Shutdown) -> ExitCode {
    let f = &summary.filter;
    print_summary(
        title,
        &[
            (
                "Shards",
                format!(
                    "{}/{} ({} failed, {} retried)",
                    fmt_num(summary.completed_shards),
                    fmt_num(summary.total_shards),
                    summary.failed_shards,
                    summary.retried_shards
                ),
            ),
            (
                "Records",
                format!(
                    "{} kept from {} scanned",
                    fmt_num(summary.records_kept),
                    fmt_num(summary.records_scanned)
                ),
            ),
            (
                "Rejected",
                format!(
                    "{} language, {} quality, {} duplicates",
                    fmt_num(f.language_rejected),
                    fmt_num(f.quality_rejected),
                    fmt_num(summary.duplicates_removed)
                ),
            ),
            (
                "Skipped",
                format!(
                    "{} undecodable, {} malformed",
                    fmt_num(f.decode_errors),
                    fmt_num(f.malformed)
                ),
            ),
            (
                "Downloaded",
                format!("{:.1} MiB", summary.bytes_downloaded as f64 / (1024.0 * 1024.0)),
            ),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );

    if shutdown.is_requested() {
        log::warn!(
            "Interrupted with {} shards unfinished; run complement to finish",
            summary.unfinished_shards()
        );
        return ExitCode::from(130);
    }
    if summary.failed_shards > 0 {
        log::error!(
            "{} shards failed: {:?}",
            summary.failed_shards,
            summary.failed_indices
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
