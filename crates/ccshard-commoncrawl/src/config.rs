//! Run configuration for the shard pipeline

use std::path::PathBuf;
use std::sync::Arc;

use ccshard_core::{BackoffPolicy, ProgressContext, SharedProgress, Shutdown};

use crate::filter::LanguageTarget;
use crate::manifest::Layout;
use crate::quality::QualityPolicy;
use crate::writer::{DEFAULT_PREFIX, ShardWriter};

/// Everything one `run` or `complement` needs, passed explicitly.
#[derive(Clone)]
pub struct RunConfig {
    /// Holds `manifests/` and `data/`
    pub root: PathBuf,
    /// e.g. `CC-MAIN-2024-10`
    pub snapshot_id: String,
    /// First manifest index of a fresh run
    pub start_index: usize,
    /// Concurrent fetch workers; also the bound on in-flight parse jobs
    pub concurrency: usize,
    pub target: LanguageTarget,
    /// Output filename prefix
    pub prefix: String,
    /// `None` disables the quality heuristics
    pub quality: Option<QualityPolicy>,
    pub backoff: BackoffPolicy,
    pub shutdown: Shutdown,
    pub progress: SharedProgress,
}

impl RunConfig {
    /// Korean extraction defaults for `snapshot_id` under `root`
    pub fn new(root: impl Into<PathBuf>, snapshot_id: impl Into<String>, concurrency: usize) -> Self {
        Self {
            root: root.into(),
            snapshot_id: snapshot_id.into(),
            start_index: 0,
            concurrency,
            target: LanguageTarget::korean(),
            prefix: DEFAULT_PREFIX.to_string(),
            quality: None,
            backoff: BackoffPolicy::default(),
            shutdown: Shutdown::new(),
            progress: Arc::new(ProgressContext::hidden()),
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }

    pub fn writer(&self) -> ShardWriter {
        ShardWriter::new(self.layout().data_dir(&self.snapshot_id), &self.prefix)
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("root", &self.root)
            .field("snapshot_id", &self.snapshot_id)
            .field("start_index", &self.start_index)
            .field("concurrency", &self.concurrency)
            .field("target", &self.target)
            .field("prefix", &self.prefix)
            .field("quality", &self.quality.is_some())
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
