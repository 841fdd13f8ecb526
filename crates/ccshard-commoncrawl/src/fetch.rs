//! Shard download with unbounded exponential backoff

use std::sync::Arc;
use std::time::{Duration, Instant};

use ccshard_core::{BackoffPolicy, RemoteSource, retry_forever};
use indicatif::ProgressBar;

/// Raw gzip bytes of one shard plus download accounting
#[derive(Debug)]
pub struct FetchedShard {
    pub bytes: Vec<u8>,
    /// 1 when the first attempt succeeded
    pub attempts: u32,
    pub elapsed: Duration,
}

impl FetchedShard {
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Downloads shards, retrying until the source delivers.
///
/// Every failure resets the source's connection pool before the next attempt.
pub struct Fetcher {
    source: Arc<dyn RemoteSource>,
    backoff: BackoffPolicy,
}

impl Fetcher {
    pub fn new(source: Arc<dyn RemoteSource>, backoff: BackoffPolicy) -> Self {
        Self { source, backoff }
    }

    /// Fetch the shard at `locator`. Blocks until it succeeds; never fails.
    pub fn fetch(&self, idx: usize, locator: &str, pb: &ProgressBar) -> FetchedShard {
        let start = Instant::now();
        let label = format!("shard_{idx:05} ({locator})");
        pb.set_message("downloading...");

        let fetched = retry_forever(
            &label,
            self.backoff,
            pb,
            || self.source.get(locator, pb),
            || self.source.reset(),
        );

        let elapsed = start.elapsed();
        log::debug!(
            "shard_{idx:05}: downloaded {} bytes in {:.1}s ({} attempts)",
            fetched.value.len(),
            elapsed.as_secs_f64(),
            fetched.attempts
        );
        if fetched.attempts > 1 {
            log::info!(
                "shard_{idx:05}: succeeded after {} attempts",
                fetched.attempts
            );
        }
        FetchedShard {
            bytes: fetched.value,
            attempts: fetched.attempts,
            elapsed,
        }
    }
}
