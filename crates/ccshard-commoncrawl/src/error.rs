//! Per-index failure of the shard pipeline

use std::io;

/// Failure to turn one fetched shard into its output file.
///
/// Never fatal for a run: the index is logged, counted and left for the next
/// complement pass.
#[derive(Debug)]
pub enum ShardError {
    /// Shard bytes could not be decompressed or read
    Archive(io::Error),
    /// Output file could not be written
    Write(io::Error),
    /// The parse job panicked
    Panicked(String),
}

impl std::fmt::Display for ShardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Archive(e) => write!(f, "archive: {e}"),
            Self::Write(e) => write!(f, "write: {e}"),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

impl std::error::Error for ShardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Archive(e) | Self::Write(e) => Some(e),
            Self::Panicked(_) => None,
        }
    }
}

impl ShardError {
    /// Build from a `catch_unwind` payload
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(msg)
    }
}
