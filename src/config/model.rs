// src/config/model.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::SessionSettings;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [engine]
/// event_warn_threshold = 50000
///
/// [channel]
/// delay_ms = 2000
/// rate_limit_backoff_ms = 60000
///
/// [http]
/// timeout_secs = 30
/// user_agent = "crawlflow/0.1"
///
/// [pipeline]
/// data_dir = "data"
/// confidence_threshold = 0.6
/// poll_interval_secs = 30
/// max_batch_bytes = 20000000
/// skip_text_patterns = ["^RT @"]
/// skip_media_patterns = ["video\\.twimg\\.com"]
/// ```
///
/// All sections are optional and have defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`) or
/// [`Default`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub channel: ChannelConfig,
    pub http: HttpConfig,
    pub pipeline: PipelineConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            engine: raw.engine,
            channel: raw.channel,
            http: raw.http,
            pipeline: raw.pipeline,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            event_warn_threshold: self.engine.event_warn_threshold,
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Buffered events per stream after which a warning is logged once.
    #[serde(default = "default_event_warn_threshold")]
    pub event_warn_threshold: usize,
}

fn default_event_warn_threshold() -> usize {
    crate::engine::DEFAULT_EVENT_WARN_THRESHOLD
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_warn_threshold: default_event_warn_threshold(),
        }
    }
}

/// `[channel]` section: pacing of calls to a rate-limited upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
}

fn default_delay_ms() -> u64 {
    2_000
}

fn default_rate_limit_backoff_ms() -> u64 {
    60_000
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
        }
    }
}

/// `[http]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("crawlflow/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// `[pipeline]` section: the classification pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Root of all pipeline files; see [`DataPaths`].
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Minimum confidence for a positive result to be materialized.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Hard upper bound on the encoded size of one submitted batch.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    /// Items whose text matches any of these are never collected.
    #[serde(default = "default_skip_text_patterns")]
    pub skip_text_patterns: Vec<String>,

    /// Media URLs matching any of these are never collected.
    #[serde(default = "default_skip_media_patterns")]
    pub skip_media_patterns: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_batch_bytes() -> usize {
    20_000_000
}

fn default_skip_text_patterns() -> Vec<String> {
    vec!["^RT @".to_string()]
}

fn default_skip_media_patterns() -> Vec<String> {
    vec![r"video\.twimg\.com".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            confidence_threshold: default_confidence_threshold(),
            poll_interval_secs: default_poll_interval_secs(),
            max_batch_bytes: default_max_batch_bytes(),
            skip_text_patterns: default_skip_text_patterns(),
            skip_media_patterns: default_skip_media_patterns(),
        }
    }
}

impl PipelineConfig {
    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir)
    }
}

/// File layout under `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// One JSON source record per account.
    pub raw_tweets_dir: PathBuf,
    /// Normalized artifacts awaiting classification; removed after a run.
    pub image_cache_dir: PathBuf,
    pub checkpoint: PathBuf,
    /// Materialized positive results.
    pub booth_info_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        let find_info = data_dir.join("find-info");
        Self {
            raw_tweets_dir: find_info.join("raw-tweets"),
            image_cache_dir: find_info.join(".image-cache"),
            checkpoint: find_info.join(".analyze-checkpoint.json"),
            booth_info_dir: data_dir.join("booth-info"),
        }
    }
}
