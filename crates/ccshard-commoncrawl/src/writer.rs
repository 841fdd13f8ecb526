//! One JSON file per shard index: `<dir>/<prefix>-<idx:05>.json`

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use ccshard_core::{cleanup_tmp_files, write_json_atomic};
use rustc_hash::FxHashSet;

use crate::record::Record;

/// Default filename prefix for Korean extraction runs
pub const DEFAULT_PREFIX: &str = "cc-kor";

/// Persists shard results. Existence of a final file means the index is done.
#[derive(Debug, Clone)]
pub struct ShardWriter {
    dir: PathBuf,
    prefix: String,
}

impl ShardWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn file_name(&self, idx: usize) -> String {
        format!("{}-{idx:05}.json", self.prefix)
    }

    pub fn path(&self, idx: usize) -> PathBuf {
        self.dir.join(self.file_name(idx))
    }

    /// Write all records of `idx` as one JSON array, replacing any previous file.
    pub fn write(&self, idx: usize, records: &[Record]) -> io::Result<PathBuf> {
        let path = self.path(idx);
        write_json_atomic(&path, records)?;
        Ok(path)
    }

    pub fn exists(&self, idx: usize) -> bool {
        self.path(idx).is_file()
    }

    pub fn read(&self, idx: usize) -> io::Result<Vec<Record>> {
        read_records(&self.path(idx))
    }

    /// Indices with a final output file, from one directory listing
    pub fn completed_indices(&self) -> io::Result<FxHashSet<usize>> {
        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        let prefix = glob::Pattern::escape(&self.prefix);
        let pattern = format!("{dir}/{prefix}-*.json");

        let entries = glob::glob(&pattern).map_err(io::Error::other)?;
        let done = entries
            .filter_map(Result::ok)
            .filter_map(|path| self.index_of(&path))
            .collect();
        Ok(done)
    }

    /// Shard index encoded in an output filename of this writer
    pub fn index_of(&self, path: &Path) -> Option<usize> {
        let stem = path.file_name()?.to_str()?.strip_suffix(".json")?;
        let digits = stem.strip_prefix(self.prefix.as_str())?.strip_prefix('-')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Remove `.tmp` leftovers of an interrupted run
    pub fn cleanup_tmp(&self) -> io::Result<usize> {
        cleanup_tmp_files(&self.dir)
    }
}

/// Load a shard file written by [`ShardWriter::write`]
pub fn read_records(path: &Path) -> io::Result<Vec<Record>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
