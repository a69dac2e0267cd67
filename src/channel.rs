// src/channel.rs

//! Rate-limited access to a single upstream client.
//!
//! All calls go through one FIFO queue drained by one background loop, so at
//! most one call is in flight at a time. Consecutive calls are spaced by a
//! fixed delay. A call that fails with a rate-limit error is retried (before
//! anything queued behind it) after a backoff; callers never see that error.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, warn};

use crate::config::model::ChannelConfig;
use crate::errors::CrawlflowError;
use crate::fetch::FetchError;

/// Decides whether a failed call should be retried after the backoff.
pub type RateLimitClassifier = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct ChannelSettings {
    /// Minimum spacing between the end of one call and the start of the next.
    pub delay: Duration,
    /// Sleep before retrying a rate-limited call.
    pub rate_limit_backoff: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(2_000),
            rate_limit_backoff: Duration::from_millis(60_000),
        }
    }
}

impl From<&ChannelConfig> for ChannelSettings {
    fn from(cfg: &ChannelConfig) -> Self {
        Self {
            delay: Duration::from_millis(cfg.delay_ms),
            rate_limit_backoff: Duration::from_millis(cfg.rate_limit_backoff_ms),
        }
    }
}

enum Attempt {
    Finished,
    RateLimited(anyhow::Error),
}

type Job<C> = Box<dyn FnMut(Arc<C>) -> BoxFuture<'static, Attempt> + Send>;

/// Handle to a rate-limited client. Cheap to clone; the drain loop stops
/// once every handle is dropped and the queue is empty.
pub struct RateLimitedChannel<C> {
    tx: mpsc::UnboundedSender<Job<C>>,
    classify: RateLimitClassifier,
}

impl<C> Clone for RateLimitedChannel<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            classify: Arc::clone(&self.classify),
        }
    }
}

impl<C> RateLimitedChannel<C>
where
    C: Send + Sync + 'static,
{
    /// Wrap `client` and start the drain loop on the current tokio runtime.
    pub fn new(client: C, settings: ChannelSettings) -> Self {
        Self::with_classifier(client, settings, Arc::new(is_rate_limit_error))
    }

    pub fn with_classifier(client: C, settings: ChannelSettings, classify: RateLimitClassifier) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(Arc::new(client), rx, settings));
        Self { tx, classify }
    }

    /// Queue `op` and wait for its result.
    ///
    /// `op` may be invoked more than once if the upstream rate-limits it.
    pub async fn enqueue<T, F, Fut>(&self, op: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: Fn(Arc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let reply = Arc::new(Mutex::new(Some(reply_tx)));
        let classify = Arc::clone(&self.classify);

        let job: Job<C> = Box::new(move |client| {
            let call = op(client);
            let reply = Arc::clone(&reply);
            let classify = Arc::clone(&classify);
            Box::pin(async move {
                match call.await {
                    Err(err) if classify(&err) => Attempt::RateLimited(err),
                    result => {
                        let sender = reply.lock().unwrap_or_else(PoisonError::into_inner).take();
                        if let Some(sender) = sender {
                            // The caller may have stopped waiting.
                            let _ = sender.send(result);
                        }
                        Attempt::Finished
                    }
                }
            })
        });

        self.tx
            .send(job)
            .map_err(|_| CrawlflowError::ChannelClosed)?;

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(CrawlflowError::ChannelClosed.into()),
        }
    }
}

async fn drain<C>(client: Arc<C>, mut rx: mpsc::UnboundedReceiver<Job<C>>, settings: ChannelSettings)
where
    C: Send + Sync + 'static,
{
    let mut next_slot = Instant::now();

    while let Some(mut job) = rx.recv().await {
        loop {
            sleep_until(next_slot).await;

            let attempt = AssertUnwindSafe(job(Arc::clone(&client)))
                .catch_unwind()
                .await;
            next_slot = Instant::now() + settings.delay;

            match attempt {
                Ok(Attempt::Finished) => break,
                Ok(Attempt::RateLimited(err)) => {
                    warn!(
                        error = %format!("{err:#}"),
                        backoff_ms = settings.rate_limit_backoff.as_millis() as u64,
                        "rate limited; retrying after backoff"
                    );
                    sleep(settings.rate_limit_backoff).await;
                }
                Err(_) => {
                    error!("queued call panicked; dropping it");
                    break;
                }
            }
        }
    }

    debug!("rate-limited channel drained and closed");
}

/// Default rate-limit detection.
///
/// A [`FetchError`] in the chain decides on its own; the message is only
/// inspected (for `429` or `rate limit`) when no typed error is present,
/// since URLs in typed errors often contain those digits.
pub fn is_rate_limit_error(err: &anyhow::Error) -> bool {
    let mut typed = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<FetchError>())
        .peekable();
    if typed.peek().is_some() {
        return typed.any(FetchError::is_rate_limited);
    }
    let message = format!("{err:#}").to_lowercase();
    message.contains("429") || message.contains("rate limit")
}
