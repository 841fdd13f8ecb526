//! Pipeline orchestration: manifest, worker pool, per-index jobs, summary

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use ccshard_core::{RemoteSource, Semaphore, WorkQueue, fmt_num};

use crate::classify::LanguageClassifier;
use crate::config::RunConfig;
use crate::error::ShardError;
use crate::fetch::Fetcher;
use crate::filter::{FilterStats, RecordFilter};
use crate::manifest::{Manifest, ManifestError, ManifestStore};
use crate::worker::{ShardPipeline, ShardStats, process_index};
use crate::writer::ShardWriter;

/// Drives `run` and `complement` for one snapshot
pub struct Coordinator {
    config: RunConfig,
    source: Arc<dyn RemoteSource>,
    classifier: Arc<dyn LanguageClassifier>,
}

impl Coordinator {
    pub fn new(
        config: RunConfig,
        source: Arc<dyn RemoteSource>,
        classifier: Arc<dyn LanguageClassifier>,
    ) -> Self {
        Self {
            config,
            source,
            classifier,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Process every index from `start_index` to the end of the manifest.
    ///
    /// Only a manifest failure is returned as an error; per-index failures
    /// are counted in the summary.
    pub fn run(&self) -> Result<RunSummary, ManifestError> {
        let start = Instant::now();
        let (manifest, writer) = self.prepare()?;

        let first = self.config.start_index.min(manifest.len());
        if self.config.start_index > manifest.len() {
            log::warn!(
                "Start index {} is past the end of the manifest ({} shards)",
                self.config.start_index,
                manifest.len()
            );
        }
        let queue = WorkQueue::range(first..manifest.len());
        if queue.total() == 0 {
            log::warn!("No shards to process");
            return Ok(RunSummary::empty());
        }
        log::info!(
            "Processing {} shards of {} ({first}..{}) with {} workers",
            fmt_num(queue.total()),
            manifest.snapshot_id(),
            manifest.len(),
            self.config.concurrency
        );

        let tally = self.run_parallel(&manifest, &writer, &queue);
        let summary = tally.into_summary(queue.total(), start.elapsed());
        summary.log();
        Ok(summary)
    }

    /// Load the manifest and clear stale tmp files from the output directory
    pub(crate) fn prepare(&self) -> Result<(Manifest, ShardWriter), ManifestError> {
        let store = ManifestStore::new(self.config.layout(), Arc::clone(&self.source));
        let manifest = store.load(&self.config.snapshot_id)?;
        let writer = self.config.writer();
        match writer.cleanup_tmp() {
            Ok(0) => {}
            Ok(n) => log::info!("Removed {n} stale tmp files"),
            Err(e) => log::warn!("Could not clean {}: {e}", writer.dir().display()),
        }
        Ok((manifest, writer))
    }

    fn fetcher(&self) -> Fetcher {
        Fetcher::new(Arc::clone(&self.source), self.config.backoff)
    }

    fn record_filter(&self) -> RecordFilter<'_> {
        RecordFilter::new(
            &self.config.target,
            &*self.classifier,
            self.config.quality.as_ref(),
        )
    }

    /// `concurrency` fetch workers; each hands its bytes to a parse job in
    /// the same scope and goes on fetching. At most `concurrency` parse jobs
    /// hold shard bytes at once.
    fn run_parallel(&self, manifest: &Manifest, writer: &ShardWriter, queue: &WorkQueue) -> Tally {
        let workers = self.config.concurrency.max(1);
        // fetch workers + parse jobs, so a blocked fetcher never starves parsing
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers * 2)
            .thread_name(|i| format!("ccshard-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!("Thread pool unavailable ({e}), processing sequentially");
                return self.run_sequential(manifest, writer, queue);
            }
        };

        let fetcher = self.fetcher();
        let pipeline = ShardPipeline::new(self.record_filter(), writer);
        let slots = Semaphore::new(workers);
        let tally = Tally::default();
        let progress = &self.config.progress;
        let shutdown = &self.config.shutdown;
        let overall = progress.overall_bar(queue.total());

        pool.scope(|s| {
            for _ in 0..workers {
                s.spawn(|s| {
                    while !shutdown.is_requested() {
                        let Some(idx) = queue.claim() else { break };
                        let Some(locator) = manifest.get(idx) else { continue };

                        let pb = progress.shard_bar(&format!("shard_{idx:05}"));
                        let fetched = fetcher.fetch(idx, locator, &pb);
                        let permit = slots.acquire();
                        pb.set_message("parsing...");

                        let (pipeline, tally, overall) = (&pipeline, &tally, &overall);
                        s.spawn(move |_| {
                            let _permit = permit;
                            let result = pipeline.parse_isolated(idx, fetched);
                            pb.finish_and_clear();
                            tally.record(idx, result);
                            overall.inc(1);
                        });
                    }
                });
            }
        });

        overall.finish_and_clear();
        if shutdown.is_requested() {
            log::warn!(
                "Stopped early: {} shards left unclaimed",
                fmt_num(queue.remaining())
            );
        }
        tally
    }

    /// One index at a time on the calling thread
    pub(crate) fn run_sequential(
        &self,
        manifest: &Manifest,
        writer: &ShardWriter,
        queue: &WorkQueue,
    ) -> Tally {
        let fetcher = self.fetcher();
        let pipeline = ShardPipeline::new(self.record_filter(), writer);
        let tally = Tally::default();
        let overall = self.config.progress.overall_bar(queue.total());

        while !self.config.shutdown.is_requested() {
            let Some(idx) = queue.claim() else { break };
            let Some(locator) = manifest.get(idx) else { continue };
            let pb = self.config.progress.shard_bar(&format!("shard_{idx:05}"));
            let result = process_index(idx, locator, &fetcher, &pipeline, &pb);
            pb.finish_and_clear();
            tally.record(idx, result);
            overall.inc(1);
        }

        overall.finish_and_clear();
        tally
    }
}

/// Results collected from concurrent parse jobs
#[derive(Default)]
pub(crate) struct Tally {
    stats: Mutex<Vec<ShardStats>>,
    failed: Mutex<Vec<usize>>,
}

impl Tally {
    pub(crate) fn record(&self, idx: usize, result: Result<ShardStats, ShardError>) {
        match result {
            Ok(stats) => {
                stats.log();
                self.stats
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(stats);
            }
            Err(e) => {
                log::error!("shard_{idx:05}: {e}");
                self.failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(idx);
            }
        }
    }

    pub(crate) fn into_summary(self, total_shards: usize, elapsed: Duration) -> RunSummary {
        let stats = self.stats.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut failed = self.failed.into_inner().unwrap_or_else(PoisonError::into_inner);
        failed.sort_unstable();
        RunSummary::from_shards(total_shards, &stats, failed, elapsed)
    }
}

/// Summary of a `run` or `complement` pass
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Indices queued for this pass
    pub total_shards: usize,
    pub completed_shards: usize,
    pub failed_shards: usize,
    /// Completed shards that needed more than one download attempt
    pub retried_shards: usize,
    pub records_scanned: usize,
    /// Records written after deduplication
    pub records_kept: usize,
    pub duplicates_removed: usize,
    pub bytes_downloaded: u64,
    /// Filter counters summed over completed shards
    pub filter: FilterStats,
    pub failed_indices: Vec<usize>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_shards(
        total_shards: usize,
        shards: &[ShardStats],
        failed_indices: Vec<usize>,
        elapsed: Duration,
    ) -> Self {
        let mut filter = FilterStats::default();
        for s in shards {
            filter.merge(&s.filter);
        }
        Self {
            total_shards,
            completed_shards: shards.len(),
            failed_shards: failed_indices.len(),
            retried_shards: shards.iter().filter(|s| s.was_retried()).count(),
            records_scanned: filter.scanned,
            records_kept: shards.iter().map(|s| s.records_written).sum(),
            duplicates_removed: shards.iter().map(|s| s.duplicates_removed).sum(),
            bytes_downloaded: shards.iter().map(|s| s.bytes_downloaded).sum(),
            filter,
            failed_indices,
            elapsed,
        }
    }

    /// Queued indices neither completed nor failed (shutdown)
    pub fn unfinished_shards(&self) -> usize {
        self.total_shards
            .saturating_sub(self.completed_shards + self.failed_shards)
    }

    pub fn log(&self) {
        log::info!("=== Pipeline Summary ===");
        log::info!(
            "Shards: {}/{} completed ({} failed, {} retried, {} unfinished)",
            fmt_num(self.completed_shards),
            fmt_num(self.total_shards),
            self.failed_shards,
            self.retried_shards,
            self.unfinished_shards()
        );
        log::info!(
            "Records: {} kept from {} scanned ({} duplicates removed)",
            fmt_num(self.records_kept),
            fmt_num(self.records_scanned),
            fmt_num(self.duplicates_removed)
        );
        log::info!(
            "Downloaded {:.1} MiB in {:.1}s",
            self.bytes_downloaded as f64 / (1024.0 * 1024.0),
            self.elapsed.as_secs_f64()
        );
        if !self.failed_indices.is_empty() {
            log::warn!(
                "Failed indices (rerun complement to repair): {:?}",
                self.failed_indices
            );
        }
    }
}
