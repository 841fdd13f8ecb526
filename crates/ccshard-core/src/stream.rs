//! HTTP access to the remote shard source.
//!
//! Uses async reqwest internally with `tokio::time::timeout` per body chunk for
//! stall detection, but presents a blocking interface for rayon workers.

use std::io::{self, BufReader, Read};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use futures_util::StreamExt;
use indicatif::ProgressBar;

use crate::progress::upgrade_to_bar;

/// Common Crawl public HTTP endpoint
pub const DEFAULT_BASE_URL: &str = "https://data.commoncrawl.org/";

/// Browser-like agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Error types for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error (read stall, truncated body)
    Io(io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            Self::Io(_) => None,
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// HTTP settings shared by every request of a run
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Prefix joined with locators
    pub base_url: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// No body bytes for this long = stalled connection
    pub read_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Anything that can hand out the raw bytes behind a locator.
///
/// `HttpSource` is the production implementation; tests plug in
/// in-memory sources.
pub trait RemoteSource: Send + Sync {
    /// Download the object at `path` (relative to the source's base).
    fn get(&self, path: &str, pb: &ProgressBar) -> Result<Vec<u8>, StreamError>;

    /// Drop pooled connections so the next `get` starts a fresh session.
    fn reset(&self) {}
}

/// Remote source over HTTP(S) with a pooled reqwest client
pub struct HttpSource {
    config: HttpConfig,
    client: Mutex<reqwest::Client>,
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

fn build_client(config: &HttpConfig) -> Result<reqwest::Client, StreamError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.as_str())
        .pool_max_idle_per_host(8)
        .build()
        .map_err(|e| StreamError::from_reqwest(&e))
}

impl HttpSource {
    pub fn new(config: HttpConfig) -> Result<Self, StreamError> {
        let client = build_client(&config)?;
        Ok(Self {
            config,
            client: Mutex::new(client),
        })
    }

    /// Full URL for a locator
    pub fn url(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }

    fn client(&self) -> reqwest::Client {
        // reqwest::Client is an Arc internally; cloning is cheap
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RemoteSource for HttpSource {
    fn get(&self, path: &str, pb: &ProgressBar) -> Result<Vec<u8>, StreamError> {
        let url = self.url(path);
        let client = self.client();
        let read_timeout = self.config.read_timeout;

        SHARED_RUNTIME.handle().block_on(async {
            let response = client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StreamError::from_reqwest(&e))?;

            let total = response.content_length();
            if let Some(total) = total {
                upgrade_to_bar(pb, total);
            }
            let capacity = total.and_then(|t| usize::try_from(t).ok()).unwrap_or(0);
            let mut body = Vec::with_capacity(capacity);

            let mut chunks = response.bytes_stream();
            loop {
                match tokio::time::timeout(read_timeout, chunks.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        body.extend_from_slice(&chunk);
                        pb.set_position(body.len() as u64);
                    }
                    Ok(Some(Err(e))) => return Err(StreamError::from_reqwest(&e)),
                    Ok(None) => break,
                    Err(_) => {
                        return Err(StreamError::Io(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("read timeout ({}s with no data)", read_timeout.as_secs()),
                        )));
                    }
                }
            }

            if let Some(total) = total {
                if (body.len() as u64) < total {
                    return Err(StreamError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("body truncated: {} of {total} bytes", body.len()),
                    )));
                }
            }
            Ok(body)
        })
    }

    fn reset(&self) {
        match build_client(&self.config) {
            Ok(fresh) => *self.client.lock().unwrap_or_else(PoisonError::into_inner) = fresh,
            Err(e) => log::warn!("Keeping old HTTP client, rebuild failed: {e}"),
        }
    }
}

/// Join a base URL and a relative locator with exactly one `/` between them
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Buffer size for the gzip reader over an in-memory shard (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Buffered reader over gzip bytes already in memory
pub type GzipSliceReader<'a> = BufReader<MultiGzDecoder<&'a [u8]>>;

/// Wrap in-memory gzip bytes in a buffered decoder.
///
/// Multi-member aware: WET shards are one gzip member per record.
pub fn open_gzip_slice(bytes: &[u8]) -> GzipSliceReader<'_> {
    BufReader::with_capacity(GZIP_BUF_SIZE, MultiGzDecoder::new(bytes))
}

/// Fully decompress in-memory gzip bytes
pub fn gunzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    MultiGzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}
