//! Post-processing of finished shard files: quality refinement and merging

use std::io;
use std::time::{Duration, Instant};

use ccshard_core::{ProgressContext, fmt_num};
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

use crate::dedup::dedupe_counted;
use crate::quality::QualityPolicy;
use crate::record::Record;
use crate::writer::ShardWriter;

/// Per-file result of [`refine`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefineStats {
    pub records_in: usize,
    pub quality_rejected: usize,
    pub duplicates_removed: usize,
    pub records_out: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RefineSummary {
    pub files_refined: usize,
    /// Output already present, left untouched
    pub files_skipped: usize,
    pub failed_indices: Vec<usize>,
    pub totals: RefineStats,
    pub elapsed: Duration,
}

impl RefineSummary {
    pub fn log(&self) {
        log::info!("=== Refine Summary ===");
        log::info!(
            "Files: {} refined, {} already present, {} failed",
            fmt_num(self.files_refined),
            fmt_num(self.files_skipped),
            self.failed_indices.len()
        );
        log::info!(
            "Records: {} -> {} ({} below quality, {} duplicates) in {:.1}s",
            fmt_num(self.totals.records_in),
            fmt_num(self.totals.records_out),
            fmt_num(self.totals.quality_rejected),
            fmt_num(self.totals.duplicates_removed),
            self.elapsed.as_secs_f64()
        );
        if !self.failed_indices.is_empty() {
            log::warn!("Failed indices: {:?}", self.failed_indices);
        }
    }
}

/// Quality-filter and dedupe one in-memory shard
pub fn refine_records(
    records: Vec<Record>,
    policy: Option<&QualityPolicy>,
) -> (Vec<Record>, RefineStats) {
    let records_in = records.len();
    let passed: Vec<Record> = match policy {
        Some(policy) => records
            .into_iter()
            .filter(|r| policy.accepts(&r.content))
            .collect(),
        None => records,
    };
    let quality_rejected = records_in - passed.len();
    let (kept, duplicates_removed) = dedupe_counted(passed);
    let stats = RefineStats {
        records_in,
        quality_rejected,
        duplicates_removed,
        records_out: kept.len(),
    };
    (kept, stats)
}

fn refine_one(
    idx: usize,
    input: &ShardWriter,
    output: &ShardWriter,
    policy: Option<&QualityPolicy>,
) -> io::Result<RefineStats> {
    let (kept, stats) = refine_records(input.read(idx)?, policy);
    output.write(idx, &kept)?;
    log::debug!(
        "shard_{idx:05}: refined {} -> {} records",
        stats.records_in,
        stats.records_out
    );
    Ok(stats)
}

enum Outcome {
    Refined(RefineStats),
    Skipped,
    Failed(usize),
}

/// Refine every shard file of `input` into `output` on `workers` threads.
///
/// Indices whose output file already exists are skipped, so an interrupted
/// refine can simply be rerun.
pub fn refine(
    input: &ShardWriter,
    output: &ShardWriter,
    policy: Option<&QualityPolicy>,
    workers: usize,
    progress: &ProgressContext,
) -> io::Result<RefineSummary> {
    let start = Instant::now();
    if input.dir() == output.dir() && input.prefix() == output.prefix() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refine output would overwrite its input",
        ));
    }
    std::fs::create_dir_all(output.dir())?;
    output.cleanup_tmp()?;

    let mut indices: Vec<usize> = input.completed_indices()?.into_iter().collect();
    indices.sort_unstable();
    log::info!(
        "Refining {} shard files from {} into {}",
        fmt_num(indices.len()),
        input.dir().display(),
        output.dir().display()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(io::Error::other)?;
    let pb = progress.overall_bar(indices.len());

    let outcomes: Vec<Outcome> = pool.install(|| {
        indices
            .par_iter()
            .progress_with(pb.clone())
            .map(|&idx| {
                if output.exists(idx) {
                    return Outcome::Skipped;
                }
                match refine_one(idx, input, output, policy) {
                    Ok(stats) => Outcome::Refined(stats),
                    Err(e) => {
                        log::error!("shard_{idx:05}: refine failed: {e}");
                        Outcome::Failed(idx)
                    }
                }
            })
            .collect()
    });
    pb.finish_and_clear();

    let mut summary = RefineSummary::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Refined(s) => {
                summary.files_refined += 1;
                summary.totals.records_in += s.records_in;
                summary.totals.quality_rejected += s.quality_rejected;
                summary.totals.duplicates_removed += s.duplicates_removed;
                summary.totals.records_out += s.records_out;
            }
            Outcome::Skipped => summary.files_skipped += 1,
            Outcome::Failed(idx) => summary.failed_indices.push(idx),
        }
    }
    summary.elapsed = start.elapsed();
    summary.log();
    Ok(summary)
}

/// Result of [`merge`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub groups_written: usize,
    /// Groups not written, with the member indices that were missing
    pub groups_incomplete: Vec<(usize, Vec<usize>)>,
    pub records_written: usize,
}

impl MergeSummary {
    pub fn log(&self) {
        log::info!(
            "Merged {} groups ({} records), {} incomplete",
            fmt_num(self.groups_written),
            fmt_num(self.records_written),
            self.groups_incomplete.len()
        );
        for (group, missing) in &self.groups_incomplete {
            log::warn!("group {group:05} skipped, missing shards {missing:?}");
        }
    }
}

/// Concatenate consecutive runs of `group_size` shard files into one file each.
///
/// Group `g` covers indices `g*group_size .. (g+1)*group_size`, clipped to
/// `total_shards`, and is written as index `g` of `output`. A group with any
/// member missing is not written.
pub fn merge(
    input: &ShardWriter,
    output: &ShardWriter,
    group_size: usize,
    total_shards: usize,
) -> io::Result<MergeSummary> {
    if group_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "group size must be at least 1",
        ));
    }
    if input.dir() == output.dir() && input.prefix() == output.prefix() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "merge output would overwrite its input",
        ));
    }
    std::fs::create_dir_all(output.dir())?;
    output.cleanup_tmp()?;
    let done = input.completed_indices()?;

    let mut summary = MergeSummary::default();
    for group in 0..total_shards.div_ceil(group_size) {
        let first = group * group_size;
        let members = first..(first + group_size).min(total_shards);
        let missing: Vec<usize> = members.clone().filter(|i| !done.contains(i)).collect();
        if !missing.is_empty() {
            summary.groups_incomplete.push((group, missing));
            continue;
        }

        let mut records: Vec<Record> = Vec::new();
        for idx in members {
            records.extend(input.read(idx)?);
        }
        output.write(group, &records)?;
        log::debug!("group {group:05}: {} records", records.len());
        summary.groups_written += 1;
        summary.records_written += records.len();
    }
    summary.log();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rec(content: &str) -> Record {
        Record {
            uri: None,
            date: None,
            id: None,
            refer: None,
            sha1: None,
            lang: Some("kor".into()),
            len: content.len() as u64,
            content: content.into(),
        }
    }

    fn good(tag: &str) -> String {
        format!("{tag}{}", "가".repeat(300))
    }

    #[test]
    fn refine_records_applies_policy_then_dedupe() {
        let policy = QualityPolicy::korean();
        let records = vec![rec(&good("a")), rec("짧음"), rec(&good("a")), rec(&good("b"))];
        let (kept, stats) = refine_records(records, Some(&policy));
        assert_eq!(kept.len(), 2);
        assert_eq!(
            stats,
            RefineStats {
                records_in: 4,
                quality_rejected: 1,
                duplicates_removed: 1,
                records_out: 2,
            }
        );
    }

    #[test]
    fn refine_without_policy_only_dedupes() {
        let (kept, stats) = refine_records(vec![rec("x"), rec("x")], None);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.quality_rejected, 0);
    }

    #[test]
    fn refine_directory() {
        let dir = TempDir::new().unwrap();
        let input = ShardWriter::new(dir.path().join("raw"), "cc-kor");
        let output = ShardWriter::new(dir.path().join("refined"), "cc-kor");
        std::fs::create_dir_all(input.dir()).unwrap();
        input.write(0, &[rec(&good("a")), rec("짧음")]).unwrap();
        input.write(3, &[rec(&good("b")), rec(&good("b"))]).unwrap();

        let policy = QualityPolicy::korean();
        let progress = ProgressContext::hidden();
        let summary = refine(&input, &output, Some(&policy), 2, &progress).unwrap();
        assert_eq!(summary.files_refined, 2);
        assert_eq!(summary.totals.records_out, 2);
        assert_eq!(output.read(0).unwrap().len(), 1);
        assert_eq!(output.read(3).unwrap().len(), 1);

        // second pass leaves existing outputs alone
        let again = refine(&input, &output, Some(&policy), 2, &progress).unwrap();
        assert_eq!(again.files_refined, 0);
        assert_eq!(again.files_skipped, 2);
    }

    #[test]
    fn refine_refuses_in_place() {
        let dir = TempDir::new().unwrap();
        let w = ShardWriter::new(dir.path(), "cc-kor");
        let progress = ProgressContext::hidden();
        assert!(refine(&w, &w, None, 1, &progress).is_err());
    }

    #[test]
    fn merge_groups_and_reports_gaps() {
        let dir = TempDir::new().unwrap();
        let input = ShardWriter::new(dir.path().join("raw"), "cc-kor");
        let output = ShardWriter::new(dir.path().join("merged"), "cc-kor");
        std::fs::create_dir_all(input.dir()).unwrap();
        for idx in [0, 1, 2, 4] {
            input.write(idx, &[rec(&format!("doc {idx}"))]).unwrap();
        }

        // groups: [0,1] [2,3] [4]
        let summary = merge(&input, &output, 2, 5).unwrap();
        assert_eq!(summary.groups_written, 2);
        assert_eq!(summary.groups_incomplete, vec![(1, vec![3])]);
        assert_eq!(summary.records_written, 3);

        let first: Vec<String> = output.read(0).unwrap().into_iter().map(|r| r.content).collect();
        assert_eq!(first, ["doc 0", "doc 1"]);
        assert!(!output.exists(1));
        assert_eq!(output.read(2).unwrap().len(), 1);
    }

    #[test]
    fn merge_rejects_zero_group() {
        let dir = TempDir::new().unwrap();
        let input = ShardWriter::new(dir.path().join("a"), "cc-kor");
        let output = ShardWriter::new(dir.path().join("b"), "cc-kor");
        assert!(merge(&input, &output, 0, 10).is_err());
    }
}
