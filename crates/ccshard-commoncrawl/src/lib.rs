//! ccshard Common Crawl - target-language extraction from WET shards
//!
//! For every shard of a snapshot manifest: download it (retrying forever),
//! keep records whose crawler language header and classifier agree on the
//! target language, optionally apply quality heuristics, drop exact duplicates
//! and write the survivors to one JSON file per shard index.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ccshard_commoncrawl::{Coordinator, RunConfig, ScriptClassifier};
//! use ccshard_core::{HttpConfig, HttpSource};
//!
//! let source = HttpSource::new(HttpConfig::default()).expect("http client");
//! let config = RunConfig::new("./cc", "CC-MAIN-2024-10", 8);
//! let coordinator = Coordinator::new(config, Arc::new(source), Arc::new(ScriptClassifier));
//!
//! let summary = coordinator.run().expect("manifest unavailable");
//! println!("Kept {} records", summary.records_kept);
//! ```

pub mod archive;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod manifest;
pub mod quality;
pub mod record;
pub mod refine;
pub mod resume;
pub mod runner;
pub mod worker;
pub mod writer;

// Re-exports for convenience
pub use archive::{ArchiveRecord, WarcError, WarcHeaders, WarcReader, open_shard};
pub use classify::{LanguageClassifier, Prediction, ScriptClassifier};
pub use config::RunConfig;
pub use dedup::{dedupe, dedupe_counted};
pub use error::ShardError;
pub use fetch::{FetchedShard, Fetcher};
pub use filter::{FilterStats, FilteredShard, LanguageTarget, RecordFilter};
pub use manifest::{Layout, Manifest, ManifestError, ManifestStore};
pub use quality::{MarkerGroup, QualityPolicy, Rejection, ScriptRange};
pub use record::Record;
pub use refine::{MergeSummary, RefineStats, RefineSummary, merge, refine};
pub use runner::{Coordinator, RunSummary};
pub use worker::{ShardPipeline, ShardStats, process_index};
pub use writer::{DEFAULT_PREFIX, ShardWriter};
