#![allow(dead_code)]

//! In-memory stand-ins for the pipeline's collaborators.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crawlflow::errors::{CrawlflowError, Result};
use crawlflow::fetch::{FetchError, Fetcher};
use crawlflow::pipeline::batch::{BatchClassifier, BatchResponse, BatchState, ClassificationRequest};
use crawlflow::pipeline::checkpoint::ClassificationResult;
use crawlflow::pipeline::source::{ItemLookup, SourceEntry, SourceItem, SourceRecord, SourceStore};

enum Canned {
    Body(Vec<u8>),
    Status(u16),
}

/// A fetcher answering from a fixed table of URLs.
///
/// Unknown URLs fail with a transport error so a missing setup line shows up
/// as a skipped item rather than a silent 404.
#[derive(Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, Canned>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Body(body.into()));
        self
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Status(status));
        self
    }

    /// Every URL requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url) {
            Some(Canned::Body(bytes)) => Ok(bytes.clone()),
            Some(Canned::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Transport {
                url: url.to_string(),
                source: format!("no canned response for {url}").into(),
            }),
        }
    }
}

/// A batch classifier with scripted batch states and per-URL verdicts.
///
/// Batches are named `fake-batch-1`, `fake-batch-2`, ... in submission
/// order. A batch with no scripted states succeeds on its first poll. Once a
/// script runs out, its last state sticks.
#[derive(Default)]
pub struct FakeClassifier {
    verdicts: Mutex<HashMap<String, String>>,
    states: Mutex<HashMap<String, VecDeque<BatchState>>>,
    submitted: Mutex<BTreeMap<String, Vec<ClassificationRequest>>>,
    display_names: Mutex<Vec<String>>,
    status_calls: AtomicUsize,
    /// Submissions from this 1-based attempt on fail.
    fail_submit_from: Mutex<Option<usize>>,
    submit_attempts: AtomicUsize,
}

impl FakeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The model's answer for `url`.
    pub fn with_verdict(self, url: &str, verdict: &ClassificationResult) -> Self {
        let text = format!(
            r#"{{"is_booth_info": {}, "confidence": {}, "reason": "{}"}}"#,
            verdict.is_booth_info, verdict.confidence, verdict.reason
        );
        self.with_raw_answer(url, &text)
    }

    /// Raw model text for `url`, for malformed-output cases.
    pub fn with_raw_answer(self, url: &str, text: &str) -> Self {
        self.verdicts
            .lock()
            .unwrap()
            .insert(url.to_string(), text.to_string());
        self
    }

    /// States reported by successive polls of `batch_name`.
    pub fn with_states(self, batch_name: &str, states: Vec<BatchState>) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(batch_name.to_string(), states.into());
        self
    }

    pub fn failing_submit(self) -> Self {
        self.failing_submit_from(1)
    }

    /// Accept the first `attempt - 1` submissions, then fail every later one.
    pub fn failing_submit_from(self, attempt: usize) -> Self {
        *self.fail_submit_from.lock().unwrap() = Some(attempt);
        self
    }

    /// Requests of every submitted batch, keyed by batch name.
    pub fn submitted(&self) -> BTreeMap<String, Vec<ClassificationRequest>> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_keys(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .values()
            .flatten()
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn display_names(&self) -> Vec<String> {
        self.display_names.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchClassifier for FakeClassifier {
    async fn submit(
        &self,
        requests: &[ClassificationRequest],
        display_name: &str,
    ) -> anyhow::Result<String> {
        let attempt = self.submit_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .fail_submit_from
            .lock()
            .unwrap()
            .is_some_and(|from| attempt >= from)
        {
            anyhow::bail!("batch endpoint unavailable");
        }

        let mut submitted = self.submitted.lock().unwrap();
        let name = format!("fake-batch-{}", submitted.len() + 1);
        submitted.insert(name.clone(), requests.to_vec());
        self.display_names
            .lock()
            .unwrap()
            .push(display_name.to_string());
        Ok(name)
    }

    async fn status(&self, batch_name: &str) -> anyhow::Result<BatchState> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().unwrap();
        let state = match states.get_mut(batch_name) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().copied(),
            None => None,
        };
        Ok(state.unwrap_or(BatchState::Succeeded))
    }

    async fn results(&self, batch_name: &str) -> anyhow::Result<Vec<BatchResponse>> {
        let verdicts = self.verdicts.lock().unwrap();
        let keys: Vec<String> = match self.submitted.lock().unwrap().get(batch_name) {
            Some(requests) => requests.iter().map(|r| r.key.clone()).collect(),
            // Batches left behind by an earlier run: answer every known URL.
            None => verdicts.keys().cloned().collect(),
        };

        Ok(keys
            .into_iter()
            .map(|key| BatchResponse {
                text: verdicts.get(&key).cloned(),
                key,
            })
            .collect())
    }
}

/// Item lookup over a fixed table; absent ids count as deleted.
#[derive(Default)]
pub struct FakeLookup {
    items: Mutex<HashMap<String, SourceItem>>,
    calls: Mutex<Vec<String>>,
}

impl FakeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, item: SourceItem) -> Self {
        self.items.lock().unwrap().insert(item.id.clone(), item);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemLookup for FakeLookup {
    async fn lookup(&self, item_id: &str) -> anyhow::Result<Option<SourceItem>> {
        self.calls.lock().unwrap().push(item_id.to_string());
        Ok(self.items.lock().unwrap().get(item_id).cloned())
    }
}

/// Source records held in memory.
#[derive(Default)]
pub struct MemorySourceStore {
    records: Mutex<BTreeMap<String, SourceRecord>>,
    saves: AtomicUsize,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, name: &str, record: SourceRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(name.to_string(), record);
        self
    }

    pub fn record(&self, name: &str) -> Option<SourceRecord> {
        self.records.lock().unwrap().get(name).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SourceStore for MemorySourceStore {
    fn list(&self) -> Result<Vec<SourceEntry>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(name, record)| SourceEntry {
                name: name.clone(),
                record: record.clone(),
            })
            .collect())
    }

    fn load(&self, name: &str) -> Result<SourceRecord> {
        self.record(name)
            .ok_or_else(|| CrawlflowError::ConfigError(format!("unknown source '{name}'")))
    }

    fn save(&self, name: &str, record: &SourceRecord) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(name.to_string(), record.clone());
        Ok(())
    }
}
