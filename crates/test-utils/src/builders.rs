#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crawlflow::config::model::DataPaths;
use crawlflow::fetch::Fetcher;
use crawlflow::pipeline::checkpoint::{ClassificationResult, PendingBatch, RequestMeta};
use crawlflow::pipeline::source::{MediaRef, SourceFilter, SourceItem, SourceRecord, SourceStore};
use crawlflow::pipeline::{CrawlContext, PipelineSettings};

/// Builder for `SourceItem`.
pub struct ItemBuilder {
    item: SourceItem,
}

impl ItemBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            item: SourceItem {
                id: id.to_string(),
                full_text: format!("item {id}"),
                created_at: None,
                conversation_id: None,
                media: vec![],
                urls: vec![],
            },
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.item.full_text = text.to_string();
        self
    }

    pub fn media(mut self, url: &str) -> Self {
        self.item.media.push(MediaRef {
            url: url.to_string(),
        });
        self
    }

    pub fn build(self) -> SourceItem {
        self.item
    }
}

/// A record fetched at `fetched_at` holding `items`.
pub fn record(fetched_at: &str, items: Vec<SourceItem>) -> SourceRecord {
    SourceRecord {
        fetched_at: fetched_at.to_string(),
        tweets: items,
    }
}

pub fn verdict(is_booth_info: bool, confidence: f64) -> ClassificationResult {
    ClassificationResult {
        is_booth_info,
        confidence,
        reason: "test verdict".to_string(),
    }
}

/// A pending batch covering `urls`, all attributed to `username`.
pub fn pending_batch(name: &str, username: &str, urls: &[&str]) -> PendingBatch {
    PendingBatch {
        batch_name: name.to_string(),
        created_at: PendingBatch::timestamp(Utc::now()),
        request_keys: urls
            .iter()
            .map(|url| {
                (
                    url.to_string(),
                    RequestMeta {
                        media_url: url.to_string(),
                        username: username.to_string(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Builder for `PipelineSettings` rooted at a scratch directory.
///
/// Polling does not wait and no filter is active unless asked for.
pub struct SettingsBuilder {
    settings: PipelineSettings,
}

impl SettingsBuilder {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            settings: PipelineSettings {
                paths: DataPaths::new(data_dir),
                confidence_threshold: 0.6,
                poll_interval: Duration::ZERO,
                max_batch_bytes: 20_000_000,
                filter: SourceFilter::default(),
            },
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.settings.confidence_threshold = threshold;
        self
    }

    pub fn max_batch_bytes(mut self, max: usize) -> Self {
        self.settings.max_batch_bytes = max;
        self
    }

    pub fn skip_text(mut self, pattern: &str) -> Self {
        self.settings.filter = SourceFilter::new(&[pattern.to_string()], &[])
            .expect("skip pattern in test must compile");
        self
    }

    pub fn build(self) -> PipelineSettings {
        self.settings
    }
}

/// A context with the given fetcher and store and default everything else.
pub fn context(
    fetcher: Arc<dyn Fetcher>,
    sources: Arc<dyn SourceStore>,
    settings: PipelineSettings,
) -> CrawlContext {
    CrawlContext::new(fetcher, sources, settings)
}
