//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ccshard_commoncrawl::{DEFAULT_PREFIX, LanguageTarget, QualityPolicy};
use ccshard_core::{BackoffPolicy, HttpConfig, stream};
use serde::Deserialize;

/// Global configuration for ccshard
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub http: HttpSection,
    pub workers: WorkersConfig,
    pub language: LanguageConfig,
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Holds `manifests/` and `data/`
    pub root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./cc"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub base_url: String,
    pub user_agent: String,
    /// Seconds without body bytes before a download counts as stalled
    pub read_timeout: u64,
    pub connect_timeout: u64,
    /// First retry delay; doubles on every failure
    pub backoff_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            base_url: stream::DEFAULT_BASE_URL.to_string(),
            user_agent: stream::DEFAULT_USER_AGENT.to_string(),
            read_timeout: 30,
            connect_timeout: 30,
            backoff_ms: 1000,
        }
    }
}

/// No default worker count: runs must state their concurrency
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    pub header_code: String,
    pub model_label: String,
    /// Output filename prefix
    pub prefix: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        let target = LanguageTarget::korean();
        Self {
            header_code: target.header_code,
            model_label: target.model_label,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Apply the heuristics during `run`/`complement`
    pub enabled: bool,
    #[serde(flatten)]
    pub policy: QualityPolicy,
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./ccshard.toml (current directory)
    /// 2. ~/.config/ccshard/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("ccshard.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "ccshard") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// HTTP settings, `read_timeout` (seconds) overriding the file
    pub fn http_config(&self, read_timeout: Option<u64>) -> HttpConfig {
        HttpConfig {
            base_url: self.http.base_url.clone(),
            user_agent: self.http.user_agent.clone(),
            connect_timeout: Duration::from_secs(self.http.connect_timeout),
            read_timeout: Duration::from_secs(read_timeout.unwrap_or(self.http.read_timeout)),
        }
    }

    pub fn backoff(&self, backoff_ms: Option<u64>) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(
            backoff_ms.unwrap_or(self.http.backoff_ms),
        ))
    }

    pub fn target(&self) -> LanguageTarget {
        LanguageTarget::new(&self.language.header_code, &self.language.model_label)
    }

    /// Quality policy for a run; `flag` overrides `[quality] enabled`
    pub fn quality(&self, flag: Option<bool>) -> Option<QualityPolicy> {
        flag.unwrap_or(self.quality.enabled)
            .then(|| self.quality.policy.clone())
    }

    /// Worker count from the command line, else from `[workers] count`
    pub fn worker_count(&self, flag: Option<usize>) -> Result<usize> {
        let count = flag
            .or(self.workers.count)
            .context("worker count required: pass --workers or set [workers] count")?;
        anyhow::ensure!(count > 0, "worker count must be at least 1");
        Ok(count)
    }
}
