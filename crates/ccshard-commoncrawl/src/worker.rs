//! Per-index pipeline: fetched bytes -> filter -> dedupe -> write

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::dedup::dedupe_counted;
use crate::error::ShardError;
use crate::fetch::{FetchedShard, Fetcher};
use crate::filter::{FilterStats, RecordFilter};
use crate::writer::ShardWriter;

/// Statistics from processing a single shard index
#[derive(Debug, Clone)]
pub struct ShardStats {
    pub shard_idx: usize,
    pub bytes_downloaded: u64,
    pub attempts: u32,
    pub download_time: Duration,
    pub filter: FilterStats,
    pub duplicates_removed: usize,
    pub records_written: usize,
    pub parse_time: Duration,
}

impl ShardStats {
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    pub fn log(&self) {
        log::info!(
            "shard_{:05}: {} records from {} scanned ({} duplicates) in {:.1}s + {:.1}s",
            self.shard_idx,
            self.records_written,
            self.filter.scanned,
            self.duplicates_removed,
            self.download_time.as_secs_f64(),
            self.parse_time.as_secs_f64()
        );
    }
}

/// Filter + writer pair shared by every parse job of a run
#[derive(Clone, Copy)]
pub struct ShardPipeline<'a> {
    filter: RecordFilter<'a>,
    writer: &'a ShardWriter,
}

impl<'a> ShardPipeline<'a> {
    pub fn new(filter: RecordFilter<'a>, writer: &'a ShardWriter) -> Self {
        Self { filter, writer }
    }

    /// Turn fetched bytes into the output file of `idx`
    pub fn parse(&self, idx: usize, fetched: FetchedShard) -> Result<ShardStats, ShardError> {
        let start = Instant::now();
        let FetchedShard {
            bytes,
            attempts,
            elapsed: download_time,
        } = fetched;
        let bytes_downloaded = bytes.len() as u64;

        let filtered = self.filter.filter(&bytes).map_err(ShardError::Archive)?;
        drop(bytes);

        let (records, duplicates_removed) = dedupe_counted(filtered.records);
        self.writer
            .write(idx, &records)
            .map_err(ShardError::Write)?;

        Ok(ShardStats {
            shard_idx: idx,
            bytes_downloaded,
            attempts,
            download_time,
            filter: filtered.stats,
            duplicates_removed,
            records_written: records.len(),
            parse_time: start.elapsed(),
        })
    }

    /// [`parse`](Self::parse), with a panic reported as [`ShardError::Panicked`]
    pub fn parse_isolated(&self, idx: usize, fetched: FetchedShard) -> Result<ShardStats, ShardError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.parse(idx, fetched)))
            .unwrap_or_else(|payload| Err(ShardError::from_panic(&*payload)))
    }
}

/// Fetch then parse one index on the calling thread
pub fn process_index(
    idx: usize,
    locator: &str,
    fetcher: &Fetcher,
    pipeline: &ShardPipeline<'_>,
    pb: &ProgressBar,
) -> Result<ShardStats, ShardError> {
    let fetched = fetcher.fetch(idx, locator, pb);
    pb.set_message("parsing...");
    pipeline.parse_isolated(idx, fetched)
}
