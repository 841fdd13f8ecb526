//! Streaming WARC/WET record reader
//!
//! Record layout:
//!
//! ```text
//! WARC/1.0\r\n
//! WARC-Type: conversion\r\n
//! Content-Length: 1234\r\n
//! \r\n
//! <1234 bytes of block>\r\n
//! \r\n
//! ```
//!
//! A missing or unparsable `Content-Length` reads as an empty block. A broken
//! header line is reported once and the reader skips ahead to the next `WARC/`
//! version line; a truncated block ends iteration.

use std::io::{self, BufRead, Read};

use ccshard_core::{GzipSliceReader, open_gzip_slice};

/// Largest up-front allocation for one block, whatever the header claims
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Header block of one archive record. Name lookup is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarcHeaders {
    version: String,
    fields: Vec<(String, String)>,
}

impl WarcHeaders {
    pub fn new(version: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            version: version.into(),
            fields,
        }
    }

    /// Version line, e.g. `WARC/1.0`
    pub fn version(&self) -> &str {
        &self.version
    }

    /// First value of header `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.get("WARC-Target-URI")
    }

    pub fn date(&self) -> Option<&str> {
        self.get("WARC-Date")
    }

    pub fn record_id(&self) -> Option<&str> {
        self.get("WARC-Record-ID")
    }

    pub fn refers_to(&self) -> Option<&str> {
        self.get("WARC-Refers-To")
    }

    pub fn block_digest(&self) -> Option<&str> {
        self.get("WARC-Block-Digest")
    }

    /// Languages detected by the crawler, e.g. `kor,eng`
    pub fn identified_language(&self) -> Option<&str> {
        self.get("WARC-Identified-Content-Language")
    }

    /// Declared block length; `0` when absent or unparsable
    pub fn content_length(&self) -> u64 {
        self.get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// One archive record: headers plus the raw block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub headers: WarcHeaders,
    pub payload: Vec<u8>,
}

/// Errors surfaced while iterating a WARC stream
#[derive(Debug)]
pub enum WarcError {
    /// One record is unreadable; iteration continues with the next one
    Malformed(String),
    /// The underlying stream failed (corrupt gzip, ...); iteration ends
    Io(io::Error),
}

impl std::fmt::Display for WarcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed record: {reason}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for WarcError {}

type AcceptAll = fn(&WarcHeaders) -> bool;

fn accept_all(_: &WarcHeaders) -> bool {
    true
}

/// Lazy, forward-only iterator over the records of a decompressed WARC stream.
///
/// An optional header predicate ([`with_filter`](WarcReader::with_filter))
/// lets callers skip blocks without materializing them.
pub struct WarcReader<R, F = AcceptAll> {
    reader: R,
    filter: F,
    line: Vec<u8>,
    done: bool,
}

impl<R: BufRead> WarcReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            filter: accept_all,
            line: Vec::with_capacity(256),
            done: false,
        }
    }
}

impl<R: BufRead, F> WarcReader<R, F> {
    /// Only materialize records whose headers pass `filter`
    pub fn with_filter<G: FnMut(&WarcHeaders) -> bool>(self, filter: G) -> WarcReader<R, G> {
        WarcReader {
            reader: self.reader,
            filter,
            line: self.line,
            done: self.done,
        }
    }

    /// Read one line into `self.line`, `false` at EOF
    fn read_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        Ok(self.reader.read_until(b'\n', &mut self.line)? > 0)
    }

    fn trimmed_line(&self) -> &[u8] {
        self.line.trim_ascii_end()
    }

    /// Skip forward to the next `WARC/x.y` version line
    fn next_version_line(&mut self) -> io::Result<Option<String>> {
        let mut skipped = 0usize;
        while self.read_line()? {
            let line = self.trimmed_line();
            if line.starts_with(b"WARC/") {
                if skipped > 0 {
                    log::debug!("resynced after skipping {skipped} non-empty lines");
                }
                return Ok(Some(String::from_utf8_lossy(line).into_owned()));
            }
            if !line.is_empty() {
                skipped += 1;
            }
        }
        Ok(None)
    }

    /// Header lines up to the blank separator line
    fn read_header_fields(&mut self) -> Result<Vec<(String, String)>, WarcError> {
        let mut fields: Vec<(String, String)> = Vec::with_capacity(16);
        loop {
            if !self.read_line().map_err(WarcError::Io)? {
                self.done = true;
                return Err(WarcError::Malformed("stream ended inside header".into()));
            }
            let line = String::from_utf8_lossy(self.trimmed_line()).into_owned();
            if line.is_empty() {
                return Ok(fields);
            }
            if line.starts_with(&[' ', '\t'][..]) {
                // folded continuation of the previous header value
                match fields.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None => return Err(WarcError::Malformed(format!("orphan continuation: {line}"))),
                }
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => fields.push((name.trim().to_string(), value.trim().to_string())),
                None => return Err(WarcError::Malformed(format!("bad header line: {line}"))),
            }
        }
    }
}

impl<R: BufRead, F: FnMut(&WarcHeaders) -> bool> Iterator for WarcReader<R, F> {
    type Item = Result<ArchiveRecord, WarcError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let version = match self.next_version_line() {
                Ok(Some(v)) => v,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(WarcError::Io(e)));
                }
            };

            let fields = match self.read_header_fields() {
                Ok(fields) => fields,
                Err(WarcError::Io(e)) => {
                    self.done = true;
                    return Some(Err(WarcError::Io(e)));
                }
                Err(e) => return Some(Err(e)),
            };
            let headers = WarcHeaders::new(version, fields);
            let block_len = headers.content_length();

            let mut block = (&mut self.reader).take(block_len);
            if (self.filter)(&headers) {
                let mut payload = Vec::with_capacity(block_len.min(MAX_PREALLOC) as usize);
                if let Err(e) = block.read_to_end(&mut payload) {
                    self.done = true;
                    return Some(Err(WarcError::Io(e)));
                }
                if (payload.len() as u64) < block_len {
                    self.done = true;
                    return Some(Err(WarcError::Malformed(format!(
                        "block truncated: {} of {block_len} bytes",
                        payload.len()
                    ))));
                }
                return Some(Ok(ArchiveRecord { headers, payload }));
            }

            match io::copy(&mut block, &mut io::sink()) {
                Ok(n) if n == block_len => {}
                Ok(n) => {
                    self.done = true;
                    return Some(Err(WarcError::Malformed(format!(
                        "block truncated: {n} of {block_len} bytes"
                    ))));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(WarcError::Io(e)));
                }
            }
        }
    }
}

/// Records of a gzip-compressed WET/WARC shard held in memory
pub fn open_shard(bytes: &[u8]) -> WarcReader<GzipSliceReader<'_>> {
    WarcReader::new(open_gzip_slice(bytes))
}
