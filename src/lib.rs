// src/lib.rs

pub mod channel;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod engine;
pub mod errors;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod telemetry;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_or_default;
use crate::config::model::ConfigFile;
use crate::engine::{Session, TaskResult};
use crate::fetch::HttpFetcher;
use crate::pipeline::checkpoint::Checkpoint;
use crate::pipeline::source::JsonSourceStore;
use crate::pipeline::{CrawlContext, PipelineSettings, prefetch_task};
use crate::telemetry::format::{format_duration, format_error_chain};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)?;
    debug!(config = %args.config, "configuration loaded");

    match args.command {
        Command::CheckConfig => print_config(&cfg),
        Command::Checkpoint => print_checkpoint(&cfg),
        Command::Prefetch => prefetch(&cfg).await,
    }
}

/// Print the effective configuration as TOML.
fn print_config(cfg: &ConfigFile) -> Result<()> {
    let rendered = toml::to_string_pretty(cfg)?;
    println!("# configuration is valid");
    print!("{rendered}");
    Ok(())
}

fn print_checkpoint(cfg: &ConfigFile) -> Result<()> {
    let paths = cfg.pipeline.paths();
    let checkpoint = Checkpoint::load(&paths.checkpoint)?;
    let threshold = cfg.pipeline.confidence_threshold;

    let positives = checkpoint
        .classified_images
        .values()
        .filter(|c| c.qualifies(threshold))
        .count();

    println!("checkpoint: {}", paths.checkpoint.display());
    println!("  sources processed: {}", checkpoint.users_processed.len());
    println!(
        "  classified images: {} ({positives} at or above {threshold})",
        checkpoint.classified_images.len()
    );
    println!("  pending batches:   {}", checkpoint.pending_batches.len());

    let now = Utc::now();
    for batch in &checkpoint.pending_batches {
        let age = match batch.created() {
            Some(at) => (now - at)
                .to_std()
                .map(|age| format!("{} ago", format_duration(age)))
                .unwrap_or_else(|_| "just now".to_string()),
            None => format!("at '{}'", batch.created_at),
        };
        println!(
            "    - {} ({} requests, submitted {age})",
            batch.batch_name,
            batch.request_keys.len()
        );
    }
    Ok(())
}

/// Run the collect phase with the HTTP fetcher, logging telemetry.
async fn prefetch(cfg: &ConfigFile) -> Result<()> {
    let settings = PipelineSettings::from_config(&cfg.pipeline)?;
    let fetcher = Arc::new(HttpFetcher::from_config(&cfg.http)?);
    let sources = Arc::new(JsonSourceStore::new(&settings.paths.raw_tweets_dir));
    let context = CrawlContext::new(fetcher, sources, settings);

    let session = Session::with_settings(context, cfg.session_settings());
    let run = session.run_task(prefetch_task());
    let reporter = tokio::spawn(telemetry::report(run.events()));

    let result = run.result().await;
    if let Err(e) = reporter.await {
        warn!(error = %e, "telemetry reporter stopped early");
    }
    session.shutdown().await;

    match result {
        TaskResult::Ok(report) => {
            info!(
                collected = report.collected.len(),
                downloaded = report.downloaded,
                "prefetch complete"
            );
            println!(
                "prefetched {} media items ({} downloaded, {} already cached, {} failed)",
                report.collected.len(),
                report.downloaded,
                report.cache_hits,
                report.items_failed
            );
            Ok(())
        }
        TaskResult::Skipped => {
            println!("nothing to prefetch: every source is up to date");
            Ok(())
        }
        TaskResult::Err(err) => Err(anyhow::anyhow!("prefetch failed: {}", format_error_chain(&err))),
    }
}
