// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::TaskName;

#[derive(Error, Debug)]
pub enum CrawlflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Task name '{0}' is already used in this session")]
    DuplicateTask(TaskName),

    #[error("Request '{key}' encodes to {size} bytes, above the batch limit of {max} bytes")]
    PayloadTooLarge { key: String, size: usize, max: usize },

    #[error("Rate-limited channel closed before the request completed")]
    ChannelClosed,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One location in a decoded document that did not match the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMismatch {
    /// `(root)` or an index path such as `[3]`.
    pub path: String,
    pub messages: Vec<String>,
}

/// A collaborator response failed schema validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed for {target} ({})", issue_label(.mismatches))]
pub struct ValidationError {
    /// Type name the document was decoded into.
    pub target: String,
    pub mismatches: Vec<PropertyMismatch>,
}

impl ValidationError {
    pub fn issue_count(&self) -> usize {
        count_issues(&self.mismatches)
    }
}

fn count_issues(mismatches: &[PropertyMismatch]) -> usize {
    mismatches.iter().map(|m| m.messages.len()).sum()
}

fn issue_label(mismatches: &[PropertyMismatch]) -> String {
    match count_issues(mismatches) {
        1 => "1 issue".to_string(),
        n => format!("{n} issues"),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CrawlflowError>;
