//! Exact-content deduplication within one shard

use crate::record::Record;

/// Drop records whose `content` equals an earlier record's content.
///
/// First occurrence wins; survivor order is archive order. Idempotent.
pub fn dedupe(records: Vec<Record>) -> Vec<Record> {
    dedupe_counted(records).0
}

/// [`dedupe`] plus the number of records removed.
///
/// Quadratic over the shard: shards hold at most a few thousand
/// target-language records. Length equality is only a pre-check.
pub fn dedupe_counted(records: Vec<Record>) -> (Vec<Record>, usize) {
    let total = records.len();
    let mut kept: Vec<Record> = Vec::with_capacity(total);
    for record in records {
        let duplicate = kept
            .iter()
            .any(|k| k.content.len() == record.content.len() && k.content == record.content);
        if !duplicate {
            kept.push(record);
        }
    }
    let removed = total - kept.len();
    (kept, removed)
}
