// src/fetch.rs

//! Byte fetching and validated JSON decoding.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::model::HttpConfig;
use crate::errors::{CrawlflowError, PropertyMismatch, Result, ValidationError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

/// Something that can turn a URL into bytes.
///
/// Non-success statuses are errors, never bodies.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError>;
}

/// [`Fetcher`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| CrawlflowError::ConfigError(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(cfg: &HttpConfig) -> Result<Self> {
        Self::new(Duration::from_secs(cfg.timeout_secs), &cfg.user_agent)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        debug!(url = %url, "GET");

        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source: Box::new(e),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}

/// Fetch `url` and decode it as `T`.
pub async fn fetch_json<T: DeserializeOwned>(fetcher: &dyn Fetcher, url: &str) -> anyhow::Result<T> {
    let bytes = fetcher.fetch(url).await?;
    decode_validated(&bytes).map_err(surface_validation)
}

/// Fetch `url` and decode it as a list of `T`, validating each element.
pub async fn fetch_json_list<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    url: &str,
) -> anyhow::Result<Vec<T>> {
    let bytes = fetcher.fetch(url).await?;
    decode_list_validated(&bytes).map_err(surface_validation)
}

/// Keep a validation failure downcastable as [`ValidationError`] once it is
/// inside an `anyhow::Error`.
fn surface_validation(err: CrawlflowError) -> anyhow::Error {
    match err {
        CrawlflowError::Validation(validation) => validation.into(),
        other => other.into(),
    }
}

/// Decode a JSON document into `T`.
///
/// Syntax errors are [`CrawlflowError::JsonError`]; a well-formed document of
/// the wrong shape is a [`ValidationError`] reported at `(root)`.
pub fn decode_validated<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let value: Value = serde_json::from_slice(bytes)?;
    serde_json::from_value(value).map_err(|e| {
        ValidationError {
            target: short_type_name::<T>(),
            mismatches: vec![PropertyMismatch {
                path: "(root)".to_string(),
                messages: vec![e.to_string()],
            }],
        }
        .into()
    })
}

/// Decode a JSON array into `Vec<T>`, collecting every bad element.
pub fn decode_list_validated<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let value: Value = serde_json::from_slice(bytes)?;
    let target = format!("[{}]", short_type_name::<T>());

    let Value::Array(items) = value else {
        return Err(ValidationError {
            target,
            mismatches: vec![PropertyMismatch {
                path: "(root)".to_string(),
                messages: vec![format!("expected an array, found {}", json_kind(&value))],
            }],
        }
        .into());
    };

    let mut decoded = Vec::with_capacity(items.len());
    let mut mismatches = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(record) => decoded.push(record),
            Err(e) => mismatches.push(PropertyMismatch {
                path: format!("[{index}]"),
                messages: vec![e.to_string()],
            }),
        }
    }

    if mismatches.is_empty() {
        Ok(decoded)
    } else {
        Err(ValidationError { target, mismatches }.into())
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    if full.contains('<') {
        return full.to_string();
    }
    full.rsplit("::").next().unwrap_or(full).to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
