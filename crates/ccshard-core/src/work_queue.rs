//! Lock-free queue of shard indices shared by parallel workers

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pending shard indices with at-most-once delivery.
///
/// Workers call [`claim()`](WorkQueue::claim) to atomically take the next
/// index. An index leaves the queue when claimed, not when finished: a worker
/// that dies mid-shard does not hand it back. Missing outputs are picked up by
/// the next complement pass instead.
#[derive(Debug)]
pub struct WorkQueue {
    indices: Vec<usize>,
    cursor: AtomicUsize,
}

impl WorkQueue {
    /// Queue every index in `range`, in order
    pub fn range(range: Range<usize>) -> Self {
        Self::from_indices(range.collect())
    }

    /// Queue only the indices in `range` that pass `keep` (resume support)
    pub fn filtered(range: Range<usize>, keep: impl Fn(usize) -> bool) -> Self {
        let indices: Vec<usize> = range.filter(|&i| keep(i)).collect();
        log::debug!("{} shard indices in work queue", indices.len());
        Self::from_indices(indices)
    }

    fn from_indices(indices: Vec<usize>) -> Self {
        Self {
            indices,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next index, `None` once drained (lock-free)
    pub fn claim(&self) -> Option<usize> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.indices.get(i).copied()
    }

    /// Number of indices queued at construction
    pub fn total(&self) -> usize {
        self.indices.len()
    }

    /// Indices not yet claimed
    pub fn remaining(&self) -> usize {
        self.indices
            .len()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }

    /// All queued indices, claimed or not
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn range_claims_in_order() {
        let q = WorkQueue::range(3..6);
        assert_eq!(q.total(), 3);
        assert_eq!(q.claim(), Some(3));
        assert_eq!(q.claim(), Some(4));
        assert_eq!(q.remaining(), 1);
        assert_eq!(q.claim(), Some(5));
        assert_eq!(q.claim(), None);
        assert_eq!(q.remaining(), 0);
    }

    #[test]
    fn filtered_skips_completed() {
        let done = [1usize, 2];
        let q = WorkQueue::filtered(0..5, |i| !done.contains(&i));
        assert_eq!(q.indices(), &[0, 3, 4]);
    }

    #[test]
    fn empty_range() {
        let q = WorkQueue::range(10..10);
        assert_eq!(q.total(), 0);
        assert_eq!(q.claim(), None);
    }

    #[test]
    fn concurrent_claims_are_unique() {
        let q = WorkQueue::range(0..1000);
        let seen = Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    while let Some(i) = q.claim() {
                        seen.lock().unwrap().push(i);
                    }
                });
            }
        });
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 1000);
        assert_eq!(seen.into_iter().collect::<HashSet<_>>().len(), 1000);
    }
}
