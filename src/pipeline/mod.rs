// src/pipeline/mod.rs

//! Checkpoint-driven, resumable classification pipeline.
//!
//! One run walks four phases:
//! 1. [`collect`]: fetch and cache unclassified media of changed sources.
//! 2. [`submit`]: chunk the cached items and submit each chunk as a batch.
//! 3. [`poll`]: wait for batches, merge results, materialize positives.
//! 4. finish: mark every scanned source processed and drop the cache.
//!
//! The checkpoint is written after every step that must survive a restart.
//! A run that starts with pending batches in its checkpoint goes straight
//! to polling.

pub mod batch;
pub mod cache;
pub mod checkpoint;
pub mod chunk;
pub mod collect;
pub mod poll;
pub mod source;
pub mod submit;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::info;

use crate::config::model::{DataPaths, PipelineConfig};
use crate::engine::{Completion, Scope, Task, task};
use crate::errors::Result;
use crate::fetch::Fetcher;

use batch::BatchClassifier;
use cache::{ArtifactNormalizer, ArtifactStore, ImageCache, PassthroughNormalizer};
use checkpoint::Checkpoint;
use collect::CollectReport;
use source::{ItemLookup, SourceEntry, SourceFilter, SourceStore};
use submit::save_checkpoint;

/// Pipeline knobs, resolved once from the `[pipeline]` config section.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub paths: DataPaths,
    pub confidence_threshold: f64,
    pub poll_interval: Duration,
    pub max_batch_bytes: usize,
    pub filter: SourceFilter,
}

impl PipelineSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            paths: cfg.paths(),
            confidence_threshold: cfg.confidence_threshold,
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            max_batch_bytes: cfg.max_batch_bytes,
            filter: SourceFilter::from_config(cfg)?,
        })
    }

    pub fn image_cache(&self) -> ImageCache {
        ImageCache::new(&self.paths.image_cache_dir)
    }

    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.paths.booth_info_dir)
    }
}

/// Collaborators shared by every pipeline task of a session.
pub struct CrawlContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub sources: Arc<dyn SourceStore>,
    pub normalizer: Arc<dyn ArtifactNormalizer>,
    /// Needed by the submit and poll phases only.
    pub classifier: Option<Arc<dyn BatchClassifier>>,
    /// Consulted when a media fetch reports "not found".
    pub lookup: Option<Arc<dyn ItemLookup>>,
    pub settings: PipelineSettings,
}

impl CrawlContext {
    pub fn new(fetcher: Arc<dyn Fetcher>, sources: Arc<dyn SourceStore>, settings: PipelineSettings) -> Self {
        Self {
            fetcher,
            sources,
            normalizer: Arc::new(PassthroughNormalizer),
            classifier: None,
            lookup: None,
            settings,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn BatchClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn ItemLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn ArtifactNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeReport {
    /// The run started from batches left pending by an earlier run.
    pub resumed: bool,
    pub sources: usize,
    pub collect: CollectReport,
    pub submit: submit::SubmitReport,
    pub poll: poll::PollReport,
}

/// The whole pipeline as one task.
///
/// Returns `Skipped` when no source changed and nothing is pending; the
/// sources are still marked processed in that case.
pub fn analyze_task() -> Task<CrawlContext, AnalyzeReport> {
    task("analyze-info", |mut scope: Scope<CrawlContext>| async move {
        let classifier = scope
            .context()
            .classifier
            .clone()
            .context("the classification pipeline needs a batch classifier")?;

        let (mut checkpoint, sources) = load_state(&mut scope).await?;
        let mut report = AnalyzeReport {
            resumed: checkpoint.has_pending_batches(),
            sources: sources.len(),
            ..AnalyzeReport::default()
        };

        if report.resumed {
            info!(
                pending = checkpoint.pending_batches.len(),
                "resuming pending batches from checkpoint"
            );
        } else {
            report.collect = collect::collect(&mut scope, &checkpoint, &sources).await?;

            if report.collect.collected.is_empty() {
                mark_processed(&mut checkpoint, &sources);
                scope
                    .work_with("No new images to classify", |w| async move {
                        checkpoint.save(&w.context().settings.paths.checkpoint)?;
                        anyhow::Ok(())
                    })
                    .await?;
                return Ok(Completion::Skipped);
            }

            report.submit =
                submit::submit(&mut scope, &mut checkpoint, &report.collect.collected, &classifier)
                    .await?;
        }

        report.poll = poll::poll_until_settled(&mut scope, &mut checkpoint, &classifier).await?;

        mark_processed(&mut checkpoint, &sources);
        let saved = report.poll.materialized;
        scope
            .work_with(
                format!("Done, {saved} images saved. Cleaning up cache"),
                |w| async move {
                    w.context().settings.image_cache().clear()?;
                    anyhow::Ok(())
                },
            )
            .await?;
        save_checkpoint(&mut scope, &checkpoint).await?;

        Ok(Completion::Done(report))
    })
}

/// Only the collect phase: download and cache artifacts, touching neither
/// the checkpoint nor any classifier.
pub fn prefetch_task() -> Task<CrawlContext, CollectReport> {
    task("prefetch", |mut scope: Scope<CrawlContext>| async move {
        let (checkpoint, sources) = load_state(&mut scope).await?;
        let report = collect::collect(&mut scope, &checkpoint, &sources).await?;
        if report.collected.is_empty() {
            return Ok(Completion::Skipped);
        }
        Ok(Completion::Done(report))
    })
}

async fn load_state(
    scope: &mut Scope<CrawlContext>,
) -> anyhow::Result<(Checkpoint, Vec<SourceEntry>)> {
    scope
        .work_with("Loading checkpoint and source records", |w| async move {
            let ctx = w.context();
            let checkpoint = Checkpoint::load(&ctx.settings.paths.checkpoint)?;
            let sources = ctx.sources.list()?;
            w.description(format!(
                "Loaded {} sources, {} classified, {} pending batches",
                sources.len(),
                checkpoint.classified_images.len(),
                checkpoint.pending_batches.len()
            ));
            anyhow::Ok((checkpoint, sources))
        })
        .await
}

fn mark_processed(checkpoint: &mut Checkpoint, sources: &[SourceEntry]) {
    for source in sources {
        checkpoint
            .users_processed
            .insert(source.name.clone(), source.fingerprint().to_string());
    }
}
