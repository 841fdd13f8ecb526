//! End-to-end pipeline tests over an in-memory remote source
//!
//! Network tests are marked #[ignore].
//! Run with: cargo test -p ccshard-commoncrawl --test pipeline -- --ignored

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ccshard_commoncrawl::{
    Coordinator, ManifestError, QualityPolicy, RunConfig, ScriptClassifier, ShardWriter,
};
use ccshard_core::{BackoffPolicy, HttpConfig, HttpSource, RemoteSource, StreamError};
use flate2::Compression;
use flate2::write::GzEncoder;
use indicatif::ProgressBar;
use tempfile::TempDir;

const SNAPSHOT: &str = "CC-TEST-2024-01";

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// WET shard: one gzip member per record, like Common Crawl
fn wet_shard(records: &[(&str, &str)]) -> Vec<u8> {
    let mut out = gzip(b"WARC/1.0\r\nWARC-Type: warcinfo\r\nContent-Length: 4\r\n\r\ninfo\r\n\r\n");
    for (i, (lang, body)) in records.iter().enumerate() {
        let record = format!(
            "WARC/1.0\r\nWARC-Type: conversion\r\nWARC-Target-URI: https://example.kr/{i}\r\n\
             WARC-Date: 2024-02-20T10:00:00Z\r\nWARC-Record-ID: <urn:uuid:{i}>\r\n\
             WARC-Identified-Content-Language: {lang}\r\nContent-Length: {}\r\n\r\n{body}\r\n\r\n",
            body.len()
        );
        out.extend(gzip(record.as_bytes()));
    }
    out
}

fn locator(idx: usize) -> String {
    format!("crawl-data/{SNAPSHOT}/segments/0/wet/shard-{idx:05}.warc.wet.gz")
}

/// Serves fixed objects; can fail a path a number of times first
#[derive(Default)]
struct MemorySource {
    objects: HashMap<String, Vec<u8>>,
    failures: Mutex<HashMap<String, u32>>,
    requested: Mutex<Vec<String>>,
    resets: Mutex<usize>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemorySource {
    /// Manifest of `shards.len()` locators plus the shard objects
    fn snapshot(shards: Vec<Vec<u8>>) -> Self {
        let mut objects = HashMap::new();
        let mut manifest = String::new();
        for (idx, bytes) in shards.into_iter().enumerate() {
            manifest.push_str(&locator(idx));
            manifest.push('\n');
            objects.insert(locator(idx), bytes);
        }
        objects.insert(
            format!("crawl-data/{SNAPSHOT}/wet.paths.gz"),
            gzip(manifest.as_bytes()),
        );
        Self {
            objects,
            ..Self::default()
        }
    }

    fn fail(self, path: String, times: u32) -> Self {
        self.failures.lock().unwrap().insert(path, times);
        self
    }

    /// Hold every `get` for `delay` so concurrent calls overlap
    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    fn requests_for(&self, path: &str) -> usize {
        self.requested().iter().filter(|p| *p == path).count()
    }
}

impl RemoteSource for MemorySource {
    fn get(&self, path: &str, _pb: &ProgressBar) -> Result<Vec<u8>, StreamError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let result = self.serve(path);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn reset(&self) {
        *self.resets.lock().unwrap() += 1;
    }
}

impl MemorySource {
    fn serve(&self, path: &str) -> Result<Vec<u8>, StreamError> {
        self.requested.lock().unwrap().push(path.to_string());
        if let Some(left) = self.failures.lock().unwrap().get_mut(path) {
            if *left > 0 {
                *left -= 1;
                return Err(StreamError::Http {
                    status: Some(503),
                    message: "Slow Down".into(),
                });
            }
        }
        self.objects.get(path).cloned().ok_or(StreamError::Http {
            status: Some(404),
            message: "Not Found".into(),
        })
    }
}

fn korean(tag: usize) -> String {
    format!("한국어 문서 번호 {tag} 입니다. 오늘은 날씨가 좋습니다.")
}

fn simple_shard(idx: usize) -> Vec<u8> {
    let doc = korean(idx);
    wet_shard(&[("kor", &doc), ("eng", "An English page")])
}

fn config(dir: &TempDir, concurrency: usize) -> RunConfig {
    let mut config = RunConfig::new(dir.path(), SNAPSHOT, concurrency);
    config.backoff = BackoffPolicy::new(Duration::from_millis(1));
    config
}

fn coordinator(config: RunConfig, source: &Arc<MemorySource>) -> Coordinator {
    Coordinator::new(config, source.clone(), Arc::new(ScriptClassifier))
}

#[test]
fn run_then_complement_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::snapshot((0..6).map(simple_shard).collect()));
    let cfg = config(&dir, 3);
    let writer = cfg.writer();

    let summary = coordinator(cfg.clone(), &source).run().unwrap();
    assert_eq!(summary.total_shards, 6);
    assert_eq!(summary.completed_shards, 6);
    assert_eq!(summary.failed_shards, 0);
    assert_eq!(summary.records_kept, 6);
    for idx in 0..6 {
        let records = writer.read(idx).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, korean(idx));
    }
    assert_eq!(writer.completed_indices().unwrap().len(), 6);

    let before = source.requested().len();
    let again = coordinator(cfg.clone(), &source).complement().unwrap();
    assert_eq!(again.total_shards, 0);
    let twice = coordinator(cfg, &source).complement().unwrap();
    assert_eq!(twice.total_shards, 0);
    assert_eq!(source.requested().len(), before);
}

#[test]
fn every_index_fetched_exactly_once() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::snapshot((0..20).map(simple_shard).collect()));
    coordinator(config(&dir, 4), &source).run().unwrap();
    for idx in 0..20 {
        assert_eq!(source.requests_for(&locator(idx)), 1, "index {idx}");
    }
}

#[test]
fn failing_shard_is_retried_with_backoff() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(
        MemorySource::snapshot((0..3).map(simple_shard).collect()).fail(locator(1), 2),
    );
    let mut cfg = config(&dir, 2);
    let unit = Duration::from_millis(20);
    cfg.backoff = BackoffPolicy::new(unit);
    let writer = cfg.writer();

    let start = Instant::now();
    let summary = coordinator(cfg, &source).run().unwrap();
    assert!(start.elapsed() >= unit * 3, "slept 1 + 2 units");

    assert_eq!(summary.completed_shards, 3);
    assert_eq!(summary.retried_shards, 1);
    assert_eq!(source.requests_for(&locator(1)), 3);
    assert_eq!(*source.resets.lock().unwrap(), 2);
    for idx in 0..3 {
        assert!(writer.exists(idx));
    }
}

#[test]
fn shard_keeps_only_unique_target_language_records() {
    let dir = TempDir::new().unwrap();
    let doc = korean(1);
    let shard = wet_shard(&[
        ("kor", &doc),
        ("eng", "Plain English text"),
        ("jpn", "日本語の文章です"),
        ("kor", &doc),
        ("kor,eng", "English body despite the header"),
    ]);
    let source = Arc::new(MemorySource::snapshot(vec![shard]));
    let cfg = config(&dir, 1);
    let writer = cfg.writer();

    let summary = coordinator(cfg, &source).run().unwrap();
    assert_eq!(summary.records_scanned, 6, "warcinfo + 5 conversions");
    assert_eq!(summary.duplicates_removed, 1);
    assert_eq!(summary.records_kept, 1);

    let records = writer.read(0).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, doc);
    assert_eq!(records[0].uri.as_deref(), Some("https://example.kr/0"));
    assert_eq!(records[0].lang.as_deref(), Some("kor"));
    assert_eq!(records[0].len, doc.len() as u64);
}

#[test]
fn complement_fetches_only_the_missing_index() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::snapshot((0..10).map(simple_shard).collect()));
    let cfg = config(&dir, 2);
    let writer = cfg.writer();

    coordinator(cfg.clone(), &source).run().unwrap();
    std::fs::remove_file(writer.path(7)).unwrap();
    let untouched: Vec<_> = (0..10)
        .filter(|&i| i != 7)
        .map(|i| std::fs::metadata(writer.path(i)).unwrap().modified().unwrap())
        .collect();
    let before = source.requested().len();

    let summary = coordinator(cfg, &source).complement().unwrap();
    assert_eq!(summary.total_shards, 1);
    assert_eq!(summary.completed_shards, 1);
    assert_eq!(source.requested()[before..], [locator(7)]);
    assert!(writer.exists(7));

    let after: Vec<_> = (0..10)
        .filter(|&i| i != 7)
        .map(|i| std::fs::metadata(writer.path(i)).unwrap().modified().unwrap())
        .collect();
    assert_eq!(untouched, after);
}

#[test]
fn run_starts_at_start_index() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::snapshot((0..5).map(simple_shard).collect()));
    let mut cfg = config(&dir, 2);
    cfg.start_index = 3;
    let writer = cfg.writer();

    let summary = coordinator(cfg, &source).run().unwrap();
    assert_eq!(summary.total_shards, 2);
    let mut done: Vec<_> = writer.completed_indices().unwrap().into_iter().collect();
    done.sort_unstable();
    assert_eq!(done, [3, 4]);
}

#[test]
fn corrupt_shard_fails_alone() {
    let dir = TempDir::new().unwrap();
    let shards = vec![simple_shard(0), b"<html>oops</html>".to_vec(), simple_shard(2)];
    let source = Arc::new(MemorySource::snapshot(shards));
    let cfg = config(&dir, 2);
    let writer = cfg.writer();

    let summary = coordinator(cfg, &source).run().unwrap();
    assert_eq!(summary.completed_shards, 2);
    assert_eq!(summary.failed_shards, 1);
    assert_eq!(summary.failed_indices, [1]);
    assert!(writer.exists(0));
    assert!(!writer.exists(1));
    assert!(writer.exists(2));
}

#[test]
fn manifest_unavailable_is_fatal() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    let err = coordinator(config(&dir, 2), &source).run().unwrap_err();
    assert!(matches!(err, ManifestError::Unavailable { .. }));
    assert_eq!(source.requested(), [format!("crawl-data/{SNAPSHOT}/wet.paths.gz")]);
}

#[test]
fn stale_tmp_files_are_removed() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::snapshot(vec![simple_shard(0)]));
    let cfg = config(&dir, 1);
    let data_dir = dir.path().join("data").join(SNAPSHOT);
    std::fs::create_dir_all(&data_dir).unwrap();
    let stale = data_dir.join("cc-kor-00000.json.tmp");
    std::fs::write(&stale, "[{\"trunc").unwrap();

    coordinator(cfg, &source).run().unwrap();
    assert!(!stale.exists());
    assert!(data_dir.join("cc-kor-00000.json").exists());
}

#[test]
fn shutdown_before_start_claims_nothing() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::snapshot((0..4).map(simple_shard).collect()));
    let cfg = config(&dir, 2);
    cfg.shutdown.request();

    let summary = coordinator(cfg, &source).run().unwrap();
    assert_eq!(summary.completed_shards, 0);
    assert_eq!(summary.unfinished_shards(), 4);
    assert_eq!(source.requested().len(), 1, "manifest only");
}

#[test]
fn quality_policy_filters_during_run() {
    let dir = TempDir::new().unwrap();
    let long = "가".repeat(300);
    let source = Arc::new(MemorySource::snapshot(vec![wet_shard(&[
        ("kor", &long),
        ("kor", "너무 짧은 문서"),
    ])]));
    let mut cfg = config(&dir, 1);
    cfg.quality = Some(QualityPolicy::korean());
    let writer = cfg.writer();

    let summary = coordinator(cfg, &source).run().unwrap();
    assert_eq!(summary.filter.quality_rejected, 1);
    let records = writer.read(0).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, long);
}

#[test]
fn custom_prefix_names_output_files() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::snapshot(vec![simple_shard(0)]));
    let mut cfg = config(&dir, 1);
    cfg.prefix = "cc-ko-test".into();

    let coord = coordinator(cfg, &source);
    assert_eq!(coord.config().prefix, "cc-ko-test");
    coord.run().unwrap();
    let writer = ShardWriter::new(dir.path().join("data").join(SNAPSHOT), "cc-ko-test");
    assert!(writer.path(0).ends_with("cc-ko-test-00000.json"));
    assert!(writer.exists(0));
}

#[test]
fn fetches_never_exceed_concurrency() {
    for workers in [1, 3] {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(
            MemorySource::snapshot((0..30).map(simple_shard).collect())
                .slow(Duration::from_millis(5)),
        );
        let cfg = config(&dir, workers);
        let writer = cfg.writer();

        let summary = coordinator(cfg, &source).run().unwrap();
        assert_eq!(summary.completed_shards, 30, "workers={workers}");
        assert_eq!(summary.failed_shards, 0);
        assert!((0..30).all(|idx| writer.exists(idx)));

        let peak = source.peak_in_flight();
        assert!(
            (1..=workers).contains(&peak),
            "{peak} fetches in flight with {workers} workers"
        );
    }
}

/// Fetch a real snapshot manifest from Common Crawl
/// Run with: cargo test -p ccshard-commoncrawl --test pipeline -- --ignored real_manifest
#[test]
#[ignore]
fn real_manifest() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(HttpSource::new(HttpConfig::default()).unwrap());
    let store = ccshard_commoncrawl::ManifestStore::new(
        ccshard_commoncrawl::Layout::new(dir.path()),
        source,
    );
    let manifest = store.load("CC-MAIN-2024-10").expect("manifest should load");
    assert!(manifest.len() > 10_000, "got {} shards", manifest.len());
    assert!(manifest.get(0).unwrap().ends_with(".warc.wet.gz"));
}

/// Process the last shard of a real snapshot end to end
/// Run with: cargo test -p ccshard-commoncrawl --test pipeline -- --ignored real_last_shard
#[test]
#[ignore]
fn real_last_shard() {
    let dir = TempDir::new().unwrap();
    let source: Arc<dyn RemoteSource> = Arc::new(HttpSource::new(HttpConfig::default()).unwrap());
    let store = ccshard_commoncrawl::ManifestStore::new(
        ccshard_commoncrawl::Layout::new(dir.path()),
        source.clone(),
    );
    let total = store.load("CC-MAIN-2024-10").unwrap().len();

    let mut cfg = RunConfig::new(dir.path(), "CC-MAIN-2024-10", 1);
    cfg.start_index = total - 1;
    let writer = cfg.writer();
    let summary = Coordinator::new(cfg, source, Arc::new(ScriptClassifier))
        .run()
        .unwrap();
    assert_eq!(summary.completed_shards, 1);
    assert!(writer.exists(total - 1));
    assert!(summary.records_scanned > 1_000);
}
