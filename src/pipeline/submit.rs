// src/pipeline/submit.rs

//! Submit phase: encode collected items, chunk them and submit each chunk.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use tracing::{info, warn};

use crate::engine::Scope;
use crate::pipeline::CrawlContext;
use crate::pipeline::batch::{BatchClassifier, ClassificationRequest};
use crate::pipeline::checkpoint::{Checkpoint, PendingBatch, RequestMeta};
use crate::pipeline::chunk::{chunk_requests, fits_alone};
use crate::pipeline::collect::CollectedImage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub batches: usize,
    pub requests: usize,
    /// Items too large to fit in any batch; they stay unclassified.
    pub oversized: usize,
}

/// Submit every collected item, recording each batch in the checkpoint (and
/// saving it) right after the batch is accepted.
pub async fn submit(
    scope: &mut Scope<CrawlContext>,
    checkpoint: &mut Checkpoint,
    collected: &[CollectedImage],
    classifier: &Arc<dyn BatchClassifier>,
) -> anyhow::Result<SubmitReport> {
    let mut report = SubmitReport::default();

    let requests = scope
        .work_with(format!("Encoding {} images", collected.len()), |w| async move {
            let cache = w.context().settings.image_cache();
            let mut requests = Vec::with_capacity(collected.len());
            for image in collected {
                let png = cache.read(&image.media_url)?;
                requests.push(ClassificationRequest {
                    key: image.media_url.clone(),
                    png_base64: STANDARD.encode(png),
                    context_text: image.item_text.clone(),
                });
            }
            anyhow::Ok(requests)
        })
        .await?;

    let max_bytes = scope.context().settings.max_batch_bytes;
    let mut submittable = Vec::with_capacity(requests.len());
    for request in requests {
        if fits_alone(&request, max_bytes)? {
            submittable.push(request);
        } else {
            warn!(url = %request.key, max_bytes, "media item too large for any batch; leaving it unclassified");
            report.oversized += 1;
        }
    }

    let sources: HashMap<&str, &str> = collected
        .iter()
        .map(|image| (image.media_url.as_str(), image.source.as_str()))
        .collect();

    let chunks = chunk_requests(submittable, max_bytes)?;
    let total = chunks.len();

    for (index, chunk) in chunks.into_iter().enumerate() {
        let display_name = format!("analyze-info-{}-{}", index + 1, Utc::now().timestamp_millis());
        let description = format!(
            "Submitting batch {}/{total} ({} images)",
            index + 1,
            chunk.len()
        );

        let requests = chunk.as_slice();
        let display_name = display_name.as_str();
        let batch_name = scope
            .work_with(description, |_| async move {
                classifier.submit(requests, display_name).await
            })
            .await?;

        let request_keys: BTreeMap<String, RequestMeta> = chunk
            .iter()
            .map(|request| {
                let username = sources.get(request.key.as_str()).copied().unwrap_or_default();
                (
                    request.key.clone(),
                    RequestMeta {
                        media_url: request.key.clone(),
                        username: username.to_string(),
                    },
                )
            })
            .collect();

        report.requests += chunk.len();
        report.batches += 1;
        checkpoint.pending_batches.push(PendingBatch {
            batch_name,
            created_at: PendingBatch::timestamp(Utc::now()),
            request_keys,
        });

        save_checkpoint(scope, checkpoint).await?;
    }

    info!(
        batches = report.batches,
        requests = report.requests,
        oversized = report.oversized,
        "submit finished"
    );
    Ok(report)
}

/// Persist `checkpoint` as its own work unit.
pub(crate) async fn save_checkpoint(
    scope: &mut Scope<CrawlContext>,
    checkpoint: &Checkpoint,
) -> anyhow::Result<()> {
    scope
        .work(|w| async move {
            w.description("Saving checkpoint");
            checkpoint.save(&w.context().settings.paths.checkpoint)?;
            anyhow::Ok(())
        })
        .await
}
