// src/pipeline/checkpoint.rs

//! Persisted progress of the classification pipeline.
//!
//! The file is pretty-printed JSON with sorted keys (maps are `BTreeMap`s).
//! A missing file is an empty checkpoint; `pending_batches` may be absent
//! in files written before batches were tracked.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;

/// Verdict for one media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_booth_info: bool,
    pub confidence: f64,
    pub reason: String,
}

impl ClassificationResult {
    /// Positive and at least as confident as `threshold`.
    pub fn qualifies(&self, threshold: f64) -> bool {
        self.is_booth_info && self.confidence >= threshold
    }
}

/// What the pipeline needs to correlate one batch result with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub media_url: String,
    pub username: String,
}

/// A batch that was submitted but whose results were not merged yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBatch {
    pub batch_name: String,
    /// RFC 3339 submission time, kept verbatim so rewrites do not churn it.
    pub created_at: String,
    /// Request key to correlating metadata.
    pub request_keys: BTreeMap<String, RequestMeta>,
}

impl PendingBatch {
    /// Submission time in the layout new batches are written with
    /// (`2025-03-01T12:00:00.000Z`).
    pub fn timestamp(at: DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Parsed submission time; `None` if the stored text is not RFC 3339.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Source name to the fingerprint it had when fully processed.
    pub users_processed: BTreeMap<String, String>,
    /// Media URL to its classification.
    #[serde(default)]
    pub classified_images: BTreeMap<String, ClassificationResult>,
    #[serde(default)]
    pub pending_batches: Vec<PendingBatch>,
}

impl Checkpoint {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no checkpoint yet; starting empty");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the checkpoint, replacing the previous file atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');

        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        debug!(
            path = %path.display(),
            processed = self.users_processed.len(),
            classified = self.classified_images.len(),
            pending = self.pending_batches.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    pub fn is_processed(&self, source: &str, fingerprint: &str) -> bool {
        self.users_processed
            .get(source)
            .is_some_and(|seen| seen == fingerprint)
    }

    pub fn is_classified(&self, media_url: &str) -> bool {
        self.classified_images.contains_key(media_url)
    }

    pub fn has_pending_batches(&self) -> bool {
        !self.pending_batches.is_empty()
    }
}
