// src/pipeline/source.rs

//! Source records: the per-account item lists the pipeline scans.
//!
//! Each source lives in `<raw_tweets_dir>/<name>.json`:
//!
//! ```json
//! { "fetchedAt": "...", "tweets": [ { "id": "...", "fullText": "...", "media": [ { "url": "..." } ] } ] }
//! ```
//!
//! `fetchedAt` is the source's fingerprint: a source whose fingerprint
//! matches the checkpoint is not scanned again.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::RateLimitedChannel;
use crate::config::model::PipelineConfig;
use crate::errors::{CrawlflowError, Result};
use crate::pipeline::checkpoint::Checkpoint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceItem {
    pub id: String,
    pub full_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub fetched_at: String,
    pub tweets: Vec<SourceItem>,
}

impl SourceRecord {
    /// Remove the item with `id`. Returns whether anything was removed.
    pub fn remove_item(&mut self, id: &str) -> bool {
        let before = self.tweets.len();
        self.tweets.retain(|item| item.id != id);
        self.tweets.len() != before
    }

    /// Replace the item with the same id, or append it if absent.
    pub fn upsert_item(&mut self, item: SourceItem) {
        match self.tweets.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => self.tweets.push(item),
        }
    }
}

/// A named source and its current contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub record: SourceRecord,
}

impl SourceEntry {
    pub fn fingerprint(&self) -> &str {
        &self.record.fetched_at
    }
}

/// Storage of source records.
pub trait SourceStore: Send + Sync {
    /// All sources, sorted by name.
    fn list(&self) -> Result<Vec<SourceEntry>>;

    fn load(&self, name: &str) -> Result<SourceRecord>;

    fn save(&self, name: &str, record: &SourceRecord) -> Result<()>;
}

/// [`SourceStore`] over a directory of `<name>.json` files.
#[derive(Debug, Clone)]
pub struct JsonSourceStore {
    dir: PathBuf,
}

impl JsonSourceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl SourceStore for JsonSourceStore {
    fn list(&self) -> Result<Vec<SourceEntry>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();

        names
            .into_iter()
            .map(|name| {
                let record = self.load(&name)?;
                Ok(SourceEntry { name, record })
            })
            .collect()
    }

    fn load(&self, name: &str) -> Result<SourceRecord> {
        let path = self.path_for(name);
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| {
            anyhow::Error::new(e)
                .context(format!("invalid source record {}", path.display()))
                .into()
        })
    }

    fn save(&self, name: &str, record: &SourceRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut json = serde_json::to_string_pretty(record)?;
        json.push('\n');
        fs::write(self.path_for(name), json)?;
        debug!(source = %name, items = record.tweets.len(), "source record saved");
        Ok(())
    }
}

/// Secondary lookup used when an item's media has disappeared upstream.
#[async_trait]
pub trait ItemLookup: Send + Sync {
    /// Current version of the item, or `None` if it was deleted.
    async fn lookup(&self, item_id: &str) -> anyhow::Result<Option<SourceItem>>;
}

/// Routes lookups through a [`RateLimitedChannel`].
pub struct ChannelLookup<L> {
    channel: RateLimitedChannel<L>,
}

impl<L> ChannelLookup<L> {
    pub fn new(channel: RateLimitedChannel<L>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl<L> ItemLookup for ChannelLookup<L>
where
    L: ItemLookup + 'static,
{
    async fn lookup(&self, item_id: &str) -> anyhow::Result<Option<SourceItem>> {
        let item_id = item_id.to_string();
        self.channel
            .enqueue(move |client| {
                let item_id = item_id.clone();
                async move { client.lookup(&item_id).await }
            })
            .await
    }
}

/// Regex filters deciding which items and media are never collected.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    skip_text: Vec<Regex>,
    skip_media: Vec<Regex>,
}

impl SourceFilter {
    pub fn new(skip_text: &[String], skip_media: &[String]) -> Result<Self> {
        Ok(Self {
            skip_text: compile_all(skip_text)?,
            skip_media: compile_all(skip_media)?,
        })
    }

    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        Self::new(&cfg.skip_text_patterns, &cfg.skip_media_patterns)
    }

    pub fn skips_item(&self, text: &str) -> bool {
        self.skip_text.iter().any(|re| re.is_match(text))
    }

    pub fn skips_media(&self, url: &str) -> bool {
        self.skip_media.iter().any(|re| re.is_match(url))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| CrawlflowError::ConfigError(format!("invalid regex '{p}': {e}")))
        })
        .collect()
}

/// A media item eligible for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub url: String,
    pub item_id: String,
    pub item_text: String,
}

/// Every media URL of `record` that is not filtered out and not classified
/// yet, in item order.
pub fn unclassified_media(
    record: &SourceRecord,
    checkpoint: &Checkpoint,
    filter: &SourceFilter,
) -> Vec<MediaCandidate> {
    record
        .tweets
        .iter()
        .filter(|item| !item.media.is_empty() && !filter.skips_item(&item.full_text))
        .flat_map(|item| {
            item.media
                .iter()
                .filter(|m| !checkpoint.is_classified(&m.url) && !filter.skips_media(&m.url))
                .map(move |m| MediaCandidate {
                    url: m.url.clone(),
                    item_id: item.id.clone(),
                    item_text: item.full_text.clone(),
                })
        })
        .collect()
}
