// src/pipeline/batch.rs

//! Batch classification collaborator and result parsing.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::pipeline::checkpoint::ClassificationResult;

/// Lifecycle of a submitted batch as reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl BatchState {
    /// The batch will not change any more.
    pub fn is_done(self) -> bool {
        matches!(
            self,
            BatchState::Succeeded | BatchState::Failed | BatchState::Cancelled | BatchState::Expired
        )
    }
}

/// One item to classify. Its JSON encoding is what counts against the batch
/// size bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRequest {
    /// Correlation key; the media URL.
    pub key: String,
    pub png_base64: String,
    /// Text of the item the media was attached to, as weak context.
    pub context_text: String,
}

impl ClassificationRequest {
    pub fn encoded_len(&self) -> crate::errors::Result<usize> {
        Ok(serde_json::to_string(self)?.len())
    }
}

/// Raw model output for one request of a finished batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResponse {
    pub key: String,
    /// `None` when the model returned nothing for this key.
    pub text: Option<String>,
}

#[async_trait]
pub trait BatchClassifier: Send + Sync {
    /// Submit one chunk and return the batch name used to track it.
    async fn submit(
        &self,
        requests: &[ClassificationRequest],
        display_name: &str,
    ) -> anyhow::Result<String>;

    async fn status(&self, batch_name: &str) -> anyhow::Result<BatchState>;

    /// Per-request outputs of a succeeded batch.
    async fn results(&self, batch_name: &str) -> anyhow::Result<Vec<BatchResponse>>;
}

const NO_REASON: &str = "No reason returned by model";

/// Parse one model response.
///
/// Returns `None` when the text is not a JSON object.
pub fn parse_classification(text: &str) -> Option<ClassificationResult> {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(text) else {
        return None;
    };

    let flag = fields.get("is_booth_info").and_then(Value::as_bool);
    let raw_confidence = fields
        .get("confidence")
        .and_then(Value::as_f64)
        .or_else(|| fields.get("booth_info_score").and_then(Value::as_f64))
        .or_else(|| flag.map(|b| if b { 1.0 } else { 0.0 }));

    let confidence = match raw_confidence {
        Some(c) if !c.is_nan() => c.clamp(0.0, 1.0),
        _ => 0.0,
    };

    let reason = fields
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(NO_REASON)
        .to_string();

    Some(ClassificationResult {
        is_booth_info: flag.unwrap_or(confidence >= 0.5),
        confidence,
        reason,
    })
}

/// Parse every response of a batch, skipping (and logging) malformed ones.
pub fn read_results(batch_name: &str, responses: Vec<BatchResponse>) -> Vec<(String, ClassificationResult)> {
    let mut parsed = Vec::with_capacity(responses.len());
    for response in responses {
        let Some(text) = response.text.as_deref() else {
            warn!(batch = %batch_name, key = %response.key, "empty result entry; skipping");
            continue;
        };
        match parse_classification(text) {
            Some(result) => parsed.push((response.key, result)),
            None => warn!(batch = %batch_name, key = %response.key, "malformed result entry; skipping"),
        }
    }
    parsed
}
