//! Complement pass: process every manifest index without an output file

use std::time::Instant;

use ccshard_core::{WorkQueue, fmt_num};
use rustc_hash::FxHashSet;

use crate::manifest::{Manifest, ManifestError};
use crate::runner::{Coordinator, RunSummary};

/// Queue of manifest indices missing from `done`, ascending
pub fn missing_indices(manifest: &Manifest, done: &FxHashSet<usize>) -> WorkQueue {
    WorkQueue::filtered(0..manifest.len(), |idx| !done.contains(&idx))
}

impl Coordinator {
    /// Repair pass over the whole manifest, one index at a time.
    ///
    /// The output directory is listed once up front. A directory that
    /// already holds every index causes no fetches.
    pub fn complement(&self) -> Result<RunSummary, ManifestError> {
        let start = Instant::now();
        let (manifest, writer) = self.prepare()?;
        let done = writer.completed_indices()?;

        let queue = missing_indices(&manifest, &done);
        if queue.total() == 0 {
            log::info!("All {} shards present, nothing to complement", fmt_num(manifest.len()));
            return Ok(RunSummary::empty());
        }
        log::info!(
            "Complementing {} of {} shards",
            fmt_num(queue.total()),
            fmt_num(manifest.len())
        );
        log::debug!("Missing indices: {:?}", queue.indices());

        let tally = self.run_sequential(&manifest, &writer, &queue);
        let summary = tally.into_summary(queue.total(), start.elapsed());
        summary.log();
        Ok(summary)
    }
}
