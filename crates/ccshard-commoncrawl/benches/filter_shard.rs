use std::io::Write;

use ccshard_commoncrawl::{
    LanguageTarget, QualityPolicy, RecordFilter, ScriptClassifier, dedupe, open_shard,
};
use flate2::Compression;
use flate2::write::GzEncoder;

/// Synthetic WET shard: `n` records, every third one Korean
fn synthetic_shard(n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..n {
        let (lang, body) = if i % 3 == 0 {
            (
                "kor",
                format!("{i}번째 문서입니다. {}", "오늘은 날씨가 좋습니다. ".repeat(40)),
            )
        } else {
            ("eng", format!("document {i}. {}", "The weather is nice. ".repeat(40)))
        };
        let record = format!(
            "WARC/1.0\r\nWARC-Type: conversion\r\nWARC-Target-URI: https://example.com/{i}\r\n\
             WARC-Identified-Content-Language: {lang}\r\nContent-Length: {}\r\n\r\n{body}\r\n\r\n",
            body.len()
        );
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(record.as_bytes()).unwrap();
        out.extend(enc.finish().unwrap());
    }
    out
}

#[divan::bench]
fn read_records(bencher: divan::Bencher) {
    let shard = synthetic_shard(3_000);
    bencher.bench(|| open_shard(&shard).filter_map(Result::ok).count());
}

#[divan::bench(args = [false, true])]
fn filter(bencher: divan::Bencher, quality: bool) {
    let shard = synthetic_shard(3_000);
    let target = LanguageTarget::korean();
    let policy = QualityPolicy::korean();
    let filter = RecordFilter::new(&target, &ScriptClassifier, quality.then_some(&policy));
    bencher.bench(|| filter.filter(&shard).unwrap().records.len());
}

#[divan::bench]
fn dedupe_shard(bencher: divan::Bencher) {
    let shard = synthetic_shard(3_000);
    let target = LanguageTarget::korean();
    let records = RecordFilter::new(&target, &ScriptClassifier, None)
        .filter(&shard)
        .unwrap()
        .records;
    bencher
        .with_inputs(|| records.clone())
        .bench_values(|records| dedupe(records).len());
}

fn main() {
    divan::main();
}
