// src/pipeline/poll.rs

//! Poll phase: wait for outstanding batches, merge their results and
//! materialize qualifying artifacts.

use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::Scope;
use crate::pipeline::CrawlContext;
use crate::pipeline::batch::{BatchClassifier, BatchState, read_results};
use crate::pipeline::checkpoint::{Checkpoint, ClassificationResult, PendingBatch};
use crate::pipeline::submit::save_checkpoint;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub rounds: usize,
    pub batches_succeeded: usize,
    /// Failed, cancelled or expired batches; their items retry next run.
    pub batches_dropped: usize,
    pub classified: usize,
    pub materialized: usize,
}

/// Poll until the checkpoint has no pending batch left.
///
/// Each round sleeps the configured interval, queries every batch once and
/// then rewrites the checkpoint.
pub async fn poll_until_settled(
    scope: &mut Scope<CrawlContext>,
    checkpoint: &mut Checkpoint,
    classifier: &Arc<dyn BatchClassifier>,
) -> anyhow::Result<PollReport> {
    let mut report = PollReport::default();

    while checkpoint.has_pending_batches() {
        let outstanding = checkpoint.pending_batches.len();
        let interval = scope.context().settings.poll_interval;
        scope
            .work_with(
                format!(
                    "Waiting for {outstanding} batch(es) (polling every {}s)",
                    interval.as_secs()
                ),
                |_| async move {
                    tokio::time::sleep(interval).await;
                    anyhow::Ok(())
                },
            )
            .await?;

        let mut remaining = Vec::new();
        for batch in checkpoint.pending_batches.clone() {
            let name = batch.batch_name.as_str();
            let state = scope
                .work_with(format!("Polling {}", short_name(name)), |_| async move {
                    classifier.status(name).await
                })
                .await?;

            if !state.is_done() {
                remaining.push(batch);
                continue;
            }

            if state != BatchState::Succeeded {
                scope
                    .work_with(
                        format!(
                            "Batch {} ended as {state:?}; its items will retry next run",
                            short_name(name)
                        ),
                        |_| async { anyhow::Ok(()) },
                    )
                    .await?;
                warn!(batch = %name, ?state, "dropping unsuccessful batch");
                report.batches_dropped += 1;
                continue;
            }

            merge_batch(scope, checkpoint, classifier, &batch, &mut report).await?;
            report.batches_succeeded += 1;
        }

        checkpoint.pending_batches = remaining;
        report.rounds += 1;
        save_checkpoint(scope, checkpoint).await?;
    }

    info!(
        rounds = report.rounds,
        succeeded = report.batches_succeeded,
        dropped = report.batches_dropped,
        classified = report.classified,
        materialized = report.materialized,
        "poll finished"
    );
    Ok(report)
}

async fn merge_batch(
    scope: &mut Scope<CrawlContext>,
    checkpoint: &mut Checkpoint,
    classifier: &Arc<dyn BatchClassifier>,
    batch: &PendingBatch,
    report: &mut PollReport,
) -> anyhow::Result<()> {
    let name = batch.batch_name.as_str();
    let responses = scope
        .work_with(format!("Reading results for {}", short_name(name)), |_| async move {
            classifier.results(name).await
        })
        .await?;

    let threshold = scope.context().settings.confidence_threshold;

    for (key, classification) in read_results(name, responses) {
        let media_url = batch
            .request_keys
            .get(&key)
            .map(|meta| meta.media_url.clone())
            .unwrap_or(key);

        let qualifies = classification.qualifies(threshold);
        checkpoint
            .classified_images
            .insert(media_url.clone(), classification.clone());
        report.classified += 1;

        if qualifies && materialize(scope, &media_url, &classification).await? {
            report.materialized += 1;
        }
    }

    Ok(())
}

/// Copy a qualifying artifact from the cache into the permanent store.
/// Returns `false` when the cached artifact is gone.
async fn materialize(
    scope: &mut Scope<CrawlContext>,
    media_url: &str,
    classification: &ClassificationResult,
) -> anyhow::Result<bool> {
    scope
        .work(|w| async move {
            let settings = &w.context().settings;
            let cache = settings.image_cache();
            if !cache.contains(media_url) {
                warn!(url = %media_url, "qualifying artifact is no longer cached; not materialized");
                return Ok(false);
            }

            let png = cache.read(media_url)?;
            let meta = settings.artifact_store().save(media_url, &png)?;
            w.description(format!(
                "Saving {} ({:.2})",
                &meta.hash[..12],
                classification.confidence
            ));
            anyhow::Ok(true)
        })
        .await
}

/// Last 12 characters of a batch name, enough to tell batches apart in logs.
fn short_name(name: &str) -> &str {
    let start = name
        .char_indices()
        .rev()
        .nth(11)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &name[start..]
}
