//! Snapshot manifests: the ordered list of WET shard locators
//!
//! Cached at `<root>/manifests/<snapshot>.paths`, one locator per line. A
//! missing cache is filled from `crawl-data/<snapshot>/wet.paths.gz`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ccshard_core::{RemoteSource, StreamError, gunzip, write_bytes_atomic};
use indicatif::ProgressBar;

/// On-disk layout under one root directory
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn manifest_path(&self, snapshot_id: &str) -> PathBuf {
        self.manifests_dir().join(format!("{snapshot_id}.paths"))
    }

    /// Output directory for one snapshot's shard files
    pub fn data_dir(&self, snapshot_id: &str) -> PathBuf {
        self.root.join("data").join(snapshot_id)
    }
}

/// Remote locator of a snapshot's compressed manifest
pub fn remote_manifest_path(snapshot_id: &str) -> String {
    format!("crawl-data/{snapshot_id}/wet.paths.gz")
}

/// Failure to obtain a manifest. Always fatal for the run.
#[derive(Debug)]
pub enum ManifestError {
    /// Remote fetch failed (transport error or non-success status)
    Unavailable {
        snapshot_id: String,
        source: StreamError,
    },
    /// Downloaded manifest is not valid gzip
    Corrupt {
        snapshot_id: String,
        source: io::Error,
    },
    /// Local cache or data directory
    Io(io::Error),
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable {
                snapshot_id,
                source,
            } => write!(f, "manifest for {snapshot_id} unavailable: {source}"),
            Self::Corrupt {
                snapshot_id,
                source,
            } => write!(f, "manifest for {snapshot_id} is corrupt: {source}"),
            Self::Io(e) => write!(f, "manifest IO: {e}"),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable { source, .. } => Some(source),
            Self::Corrupt { source, .. } => Some(source),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for ManifestError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Immutable, ordered shard list of one snapshot. Position is the shard index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    snapshot_id: String,
    locators: Vec<String>,
}

impl Manifest {
    pub fn new(snapshot_id: impl Into<String>, locators: Vec<String>) -> Self {
        Self {
            snapshot_id: snapshot_id.into(),
            locators,
        }
    }

    /// Parse manifest text: one locator per line, blank lines skipped
    pub fn parse(snapshot_id: impl Into<String>, text: &str) -> Self {
        let locators = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(snapshot_id, locators)
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    pub fn len(&self) -> usize {
        self.locators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.locators.get(idx).map(String::as_str)
    }

    pub fn locators(&self) -> &[String] {
        &self.locators
    }
}

/// Loads manifests from the local cache, downloading them once when missing
pub struct ManifestStore {
    layout: Layout,
    source: Arc<dyn RemoteSource>,
}

impl ManifestStore {
    pub fn new(layout: Layout, source: Arc<dyn RemoteSource>) -> Self {
        Self { layout, source }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Load the manifest of `snapshot_id` and make sure its data dir exists.
    ///
    /// The remote manifest is tried once; there is no retry at this level.
    pub fn load(&self, snapshot_id: &str) -> Result<Manifest, ManifestError> {
        let path = self.layout.manifest_path(snapshot_id);
        if !path.is_file() {
            self.download(snapshot_id, &path)?;
        }

        fs::create_dir_all(self.layout.data_dir(snapshot_id))?;

        let text = fs::read_to_string(&path)?;
        let manifest = Manifest::parse(snapshot_id, &text);
        log::info!(
            "Loaded manifest {snapshot_id}: {} shards",
            manifest.len()
        );
        Ok(manifest)
    }

    fn download(&self, snapshot_id: &str, path: &Path) -> Result<(), ManifestError> {
        let locator = remote_manifest_path(snapshot_id);
        log::info!("Fetching manifest {locator}...");

        let compressed = self
            .source
            .get(&locator, &ProgressBar::hidden())
            .map_err(|source| ManifestError::Unavailable {
                snapshot_id: snapshot_id.to_string(),
                source,
            })?;
        let text = gunzip(&compressed).map_err(|source| ManifestError::Corrupt {
            snapshot_id: snapshot_id.to_string(),
            source,
        })?;

        fs::create_dir_all(self.layout.manifests_dir())?;
        write_bytes_atomic(path, &text)?;
        log::info!("Saved manifest to {}", path.display());
        Ok(())
    }
}
