//! ccshard Core - Common infrastructure for shard download pipelines
//!
//! Remote byte sources, unbounded backoff retry, the shared work queue,
//! atomic output files, shutdown, logging and progress reporting.

pub mod logging;
pub mod progress;
pub mod retry;
pub mod semaphore;
pub mod shutdown;
pub mod sink;
pub mod stream;
pub mod work_queue;

// Re-exports for convenience
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{BackoffPolicy, Retried, retry_forever};
pub use semaphore::{Semaphore, SemaphoreGuard};
pub use shutdown::Shutdown;
pub use sink::{cleanup_tmp_files, write_bytes_atomic, write_json_atomic};
pub use stream::{
    GzipSliceReader, HttpConfig, HttpSource, RemoteSource, SHARED_RUNTIME, StreamError, gunzip,
    open_gzip_slice,
};
pub use work_queue::WorkQueue;
