// src/pipeline/collect.rs

//! Collect phase: fetch and cache every unclassified media item.

use tracing::{info, warn};

use crate::engine::Scope;
use crate::pipeline::checkpoint::Checkpoint;
use crate::pipeline::source::{MediaCandidate, SourceEntry, unclassified_media};
use crate::pipeline::CrawlContext;

/// A cached media item waiting for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedImage {
    pub media_url: String,
    /// Name of the source record the item came from.
    pub source: String,
    pub item_id: String,
    pub item_text: String,
}

/// What one collect pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub collected: Vec<CollectedImage>,
    /// Sources whose fingerprint matched the checkpoint.
    pub sources_skipped: usize,
    pub downloaded: usize,
    pub cache_hits: usize,
    /// Items removed from their source because they no longer exist.
    pub items_dropped: usize,
    /// Items replaced in their source by a newer version.
    pub items_replaced: usize,
    /// Items skipped because fetching or normalizing failed.
    pub items_failed: usize,
}

enum Download {
    Cached,
    NotFound,
}

enum LookupOutcome {
    Deleted,
    Replaced,
}

/// Fetch and cache the unclassified media of every source not yet processed
/// at its current fingerprint.
///
/// Nothing is written to the checkpoint. A "not found" fetch triggers the
/// context's item lookup (when there is one) and updates the source record;
/// any other failure skips just that item.
pub async fn collect(
    scope: &mut Scope<CrawlContext>,
    checkpoint: &Checkpoint,
    sources: &[SourceEntry],
) -> anyhow::Result<CollectReport> {
    let mut report = CollectReport::default();

    for source in sources {
        if checkpoint.is_processed(&source.name, source.fingerprint()) {
            report.sources_skipped += 1;
            continue;
        }

        let candidates = unclassified_media(&source.record, checkpoint, &scope.context().settings.filter);

        for candidate in candidates {
            if scope.context().settings.image_cache().contains(&candidate.url) {
                report.cache_hits += 1;
                report.collected.push(collected_image(source, candidate));
                continue;
            }

            let ordinal = report.downloaded + 1;
            let url = candidate.url.as_str();
            let download = scope
                .work_with(format!("Downloading image {ordinal}"), |w| async move {
                    let ctx = w.context();
                    match ctx.fetcher.fetch(url).await {
                        Ok(bytes) => {
                            let image = ctx.normalizer.normalize(bytes)?;
                            ctx.settings.image_cache().store(url, &image.png)?;
                            anyhow::Ok(Download::Cached)
                        }
                        Err(e) if e.is_not_found() => Ok(Download::NotFound),
                        Err(e) => Err(e.into()),
                    }
                })
                .await;

            match download {
                Ok(Download::Cached) => {
                    report.downloaded += 1;
                    report.collected.push(collected_image(source, candidate));
                }
                Ok(Download::NotFound) => {
                    match resolve_missing(scope, &source.name, &candidate).await {
                        Ok(Some(LookupOutcome::Deleted)) => report.items_dropped += 1,
                        Ok(Some(LookupOutcome::Replaced)) => report.items_replaced += 1,
                        Ok(None) => report.items_failed += 1,
                        Err(err) => {
                            warn!(url = %candidate.url, error = %format!("{err:#}"), "item lookup failed; skipping");
                            report.items_failed += 1;
                        }
                    }
                }
                Err(err) => {
                    warn!(url = %candidate.url, error = %format!("{err:#}"), "skipping media item");
                    report.items_failed += 1;
                }
            }
        }
    }

    info!(
        collected = report.collected.len(),
        downloaded = report.downloaded,
        cache_hits = report.cache_hits,
        dropped = report.items_dropped,
        replaced = report.items_replaced,
        failed = report.items_failed,
        "collect finished"
    );
    Ok(report)
}

/// Ask the item lookup what happened to an item whose media is gone and
/// update its source record. `None` when no lookup is configured.
async fn resolve_missing(
    scope: &mut Scope<CrawlContext>,
    source: &str,
    candidate: &MediaCandidate,
) -> anyhow::Result<Option<LookupOutcome>> {
    if scope.context().lookup.is_none() {
        return Ok(None);
    }

    let description = format!("Checking item {} of {source}", candidate.item_id);
    let outcome = scope
        .work_with(description, |w| async move {
            let ctx = w.context();
            let Some(lookup) = ctx.lookup.as_ref() else {
                return Ok(None);
            };

            let current = lookup.lookup(&candidate.item_id).await?;
            let mut record = ctx.sources.load(source)?;

            let outcome = match current {
                None => {
                    record.remove_item(&candidate.item_id);
                    w.description(format!("Item {} was deleted; dropping it", candidate.item_id));
                    LookupOutcome::Deleted
                }
                Some(item) => {
                    record.upsert_item(item);
                    w.description(format!("Item {} was edited; replacing it", candidate.item_id));
                    LookupOutcome::Replaced
                }
            };

            ctx.sources.save(source, &record)?;
            anyhow::Ok(Some(outcome))
        })
        .await?;

    Ok(outcome)
}

fn collected_image(source: &SourceEntry, candidate: MediaCandidate) -> CollectedImage {
    CollectedImage {
        media_url: candidate.url,
        source: source.name.clone(),
        item_id: candidate.item_id,
        item_text: candidate.item_text,
    }
}
