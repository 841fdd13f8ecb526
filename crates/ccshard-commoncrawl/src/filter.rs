//! Per-shard record filtering: header pre-filter, classifier check, quality policy

use std::cell::Cell;
use std::io::{self, BufRead};

use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveRecord, WarcError, WarcHeaders, WarcReader, open_shard};
use crate::classify::LanguageClassifier;
use crate::quality::QualityPolicy;
use crate::record::Record;

/// Language a run extracts, as seen by the crawler header and by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTarget {
    /// Substring of `WARC-Identified-Content-Language`, e.g. `kor`
    pub header_code: String,
    /// Classifier label the top prediction must equal, e.g. `__label__ko`
    pub model_label: String,
}

impl LanguageTarget {
    pub fn new(header_code: impl Into<String>, model_label: impl Into<String>) -> Self {
        Self {
            header_code: header_code.into(),
            model_label: model_label.into(),
        }
    }

    pub fn korean() -> Self {
        Self::new("kor", "__label__ko")
    }

    /// Cheap pre-filter on the crawler's language guess. Absent header never matches.
    pub fn header_matches(&self, headers: &WarcHeaders) -> bool {
        headers
            .identified_language()
            .is_some_and(|langs| langs.contains(self.header_code.as_str()))
    }
}

impl Default for LanguageTarget {
    fn default() -> Self {
        Self::korean()
    }
}

/// Counters for one filtered shard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Well-formed records seen, before any filtering
    pub scanned: usize,
    /// Records passing the language header check
    pub pre_filtered: usize,
    /// Payloads that are not valid UTF-8
    pub decode_errors: usize,
    /// Records with broken framing, skipped by the reader
    pub malformed: usize,
    pub language_rejected: usize,
    pub quality_rejected: usize,
    pub kept: usize,
}

impl FilterStats {
    pub fn merge(&mut self, other: &Self) {
        self.scanned += other.scanned;
        self.pre_filtered += other.pre_filtered;
        self.decode_errors += other.decode_errors;
        self.malformed += other.malformed;
        self.language_rejected += other.language_rejected;
        self.quality_rejected += other.quality_rejected;
        self.kept += other.kept;
    }
}

/// Output of [`RecordFilter::filter`]: kept records in archive order
#[derive(Debug, Default)]
pub struct FilteredShard {
    pub records: Vec<Record>,
    pub stats: FilterStats,
}

/// Stateless filter; the same bytes always yield the same records.
#[derive(Clone, Copy)]
pub struct RecordFilter<'a> {
    target: &'a LanguageTarget,
    classifier: &'a dyn LanguageClassifier,
    quality: Option<&'a QualityPolicy>,
}

impl<'a> RecordFilter<'a> {
    pub fn new(
        target: &'a LanguageTarget,
        classifier: &'a dyn LanguageClassifier,
        quality: Option<&'a QualityPolicy>,
    ) -> Self {
        Self {
            target,
            classifier,
            quality,
        }
    }

    /// Filter a gzip-compressed shard held in memory.
    ///
    /// Fails only when the stream itself cannot be decompressed or read.
    pub fn filter(&self, raw: &[u8]) -> io::Result<FilteredShard> {
        self.filter_reader(open_shard(raw))
    }

    /// Filter an already-decompressed WARC stream
    pub fn filter_stream<R: BufRead>(&self, reader: R) -> io::Result<FilteredShard> {
        self.filter_reader(WarcReader::new(reader))
    }

    fn filter_reader<R: BufRead>(&self, reader: WarcReader<R>) -> io::Result<FilteredShard> {
        let scanned = Cell::new(0usize);
        let records = reader.with_filter(|headers: &WarcHeaders| {
            scanned.set(scanned.get() + 1);
            self.target.header_matches(headers)
        });

        let mut out = FilteredShard::default();
        for item in records {
            match item {
                Ok(record) => {
                    out.stats.pre_filtered += 1;
                    if let Some(kept) = self.judge(record, &mut out.stats) {
                        out.records.push(kept);
                    }
                }
                Err(WarcError::Malformed(reason)) => {
                    log::debug!("skipping record: {reason}");
                    out.stats.malformed += 1;
                }
                Err(WarcError::Io(e)) => return Err(e),
            }
        }
        out.stats.scanned = scanned.get();
        out.stats.kept = out.records.len();
        Ok(out)
    }

    /// Decode, classify and quality-check one pre-filtered record
    fn judge(&self, record: ArchiveRecord, stats: &mut FilterStats) -> Option<Record> {
        let ArchiveRecord { headers, payload } = record;
        let content = match String::from_utf8(payload) {
            Ok(s) => s,
            Err(e) => {
                log::debug!(
                    "undecodable payload in {}: {e}",
                    headers.record_id().unwrap_or("<no id>")
                );
                stats.decode_errors += 1;
                return None;
            }
        };

        let flattened = content.replace('\n', " ");
        let label = self.classifier.top_label(&flattened);
        if label.as_deref() != Some(self.target.model_label.as_str()) {
            stats.language_rejected += 1;
            return None;
        }

        if let Some(policy) = self.quality {
            if let Err(why) = policy.check(&content) {
                log::trace!("quality reject: {why}");
                stats.quality_rejected += 1;
                return None;
            }
        }

        Some(Record::from_headers(&headers, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Prediction, ScriptClassifier};
    use std::io::Cursor;
    use std::sync::Mutex;

    fn warc(records: &[(Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, (lang, body)) in records.iter().enumerate() {
            out.extend_from_slice(b"WARC/1.0\r\nWARC-Type: conversion\r\n");
            out.extend_from_slice(format!("WARC-Target-URI: https://example.kr/{i}\r\n").as_bytes());
            if let Some(lang) = lang {
                out.extend_from_slice(
                    format!("WARC-Identified-Content-Language: {lang}\r\n").as_bytes(),
                );
            }
            out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\r\n\r\n");
        }
        out
    }

    /// Records every text it is asked about, always answers `label`
    struct Recording {
        label: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl LanguageClassifier for Recording {
        fn predict(&self, text: &str) -> Vec<Prediction> {
            self.seen.lock().unwrap().push(text.to_string());
            vec![Prediction {
                label: self.label.to_string(),
                confidence: 1.0,
            }]
        }
    }

    #[test]
    fn header_substring_match() {
        let target = LanguageTarget::korean();
        let with = |v: &str| {
            WarcHeaders::new(
                "WARC/1.0",
                vec![("WARC-Identified-Content-Language".into(), v.into())],
            )
        };
        assert!(target.header_matches(&with("kor")));
        assert!(target.header_matches(&with("eng,kor")));
        assert!(!target.header_matches(&with("jpn,eng")));
        assert!(!target.header_matches(&WarcHeaders::default()));
    }

    #[test]
    fn keeps_only_target_language() {
        let input = warc(&[
            (Some("kor"), "오늘은 날씨가 맑습니다".as_bytes()),
            (Some("eng"), &b"plain english page"[..]),
            (Some("kor,eng"), &b"header says korean but text is english"[..]),
            (None, "헤더 없음".as_bytes()),
        ]);
        let target = LanguageTarget::korean();
        let out = RecordFilter::new(&target, &ScriptClassifier, None)
            .filter_stream(Cursor::new(input))
            .unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].uri.as_deref(), Some("https://example.kr/0"));
        assert_eq!(out.records[0].content, "오늘은 날씨가 맑습니다");
        assert_eq!(
            out.stats,
            FilterStats {
                scanned: 4,
                pre_filtered: 2,
                decode_errors: 0,
                malformed: 0,
                language_rejected: 1,
                quality_rejected: 0,
                kept: 1,
            }
        );
    }

    #[test]
    fn classifier_sees_newlines_as_spaces() {
        let input = warc(&[(Some("kor"), "첫째 줄\n둘째 줄\n".as_bytes())]);
        let target = LanguageTarget::korean();
        let classifier = Recording {
            label: "__label__ko",
            seen: Mutex::new(Vec::new()),
        };
        let out = RecordFilter::new(&target, &classifier, None)
            .filter_stream(Cursor::new(input))
            .unwrap();
        assert_eq!(*classifier.seen.lock().unwrap(), ["첫째 줄 둘째 줄 "]);
        // stored content keeps its newlines
        assert_eq!(out.records[0].content, "첫째 줄\n둘째 줄\n");
    }

    #[test]
    fn invalid_utf8_is_counted_and_skipped() {
        let input = warc(&[
            (Some("kor"), &[0xff, 0xfe, 0xfd][..]),
            (Some("kor"), "정상 문서".as_bytes()),
        ]);
        let target = LanguageTarget::korean();
        let out = RecordFilter::new(&target, &ScriptClassifier, None)
            .filter_stream(Cursor::new(input))
            .unwrap();
        assert_eq!(out.stats.decode_errors, 1);
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn quality_policy_applies_after_classifier() {
        let long = "가".repeat(256);
        let short = "가".repeat(255);
        let input = warc(&[
            (Some("kor"), long.as_bytes()),
            (Some("kor"), short.as_bytes()),
        ]);
        let target = LanguageTarget::korean();
        let policy = QualityPolicy::korean();

        let out = RecordFilter::new(&target, &ScriptClassifier, Some(&policy))
            .filter_stream(Cursor::new(input.clone()))
            .unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].content.chars().count(), 256);
        assert_eq!(out.stats.quality_rejected, 1);

        let without = RecordFilter::new(&target, &ScriptClassifier, None)
            .filter_stream(Cursor::new(input))
            .unwrap();
        assert_eq!(without.records.len(), 2);
    }

    #[test]
    fn malformed_record_does_not_fail_shard() {
        let mut input = warc(&[(Some("kor"), "첫 문서".as_bytes())]);
        input.extend_from_slice(b"WARC/1.0\r\nthis is not a header\r\n\r\n");
        input.extend(warc(&[(Some("kor"), "둘째 문서".as_bytes())]));
        let target = LanguageTarget::korean();
        let out = RecordFilter::new(&target, &ScriptClassifier, None)
            .filter_stream(Cursor::new(input))
            .unwrap();
        assert_eq!(out.stats.malformed, 1);
        assert_eq!(out.records.len(), 2);
    }

    #[test]
    fn filter_is_pure() {
        let input = warc(&[
            (Some("kor"), "한국어 문서 하나".as_bytes()),
            (Some("kor"), "한국어 문서 둘".as_bytes()),
        ]);
        let target = LanguageTarget::korean();
        let filter = RecordFilter::new(&target, &ScriptClassifier, None);
        let a = filter.filter_stream(Cursor::new(input.clone())).unwrap();
        let b = filter.filter_stream(Cursor::new(input)).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn corrupt_gzip_fails_shard() {
        let target = LanguageTarget::korean();
        let filter = RecordFilter::new(&target, &ScriptClassifier, None);
        assert!(filter.filter(b"not gzip at all").is_err());
    }
}
