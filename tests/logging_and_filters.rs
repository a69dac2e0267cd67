// tests/logging_and_filters.rs

use clap::Parser;
use tracing::Level;

use crawlflow::cli::{CliArgs, Command, LogLevel};
use crawlflow::logging::{parse_level_str, resolve_level};
use crawlflow::pipeline::checkpoint::Checkpoint;
use crawlflow::pipeline::source::{SourceFilter, unclassified_media};
use crawlflow_test_utils::builders::{ItemBuilder, record, verdict};

#[test]
fn cli_flag_wins_over_environment() {
    assert_eq!(resolve_level(Some(LogLevel::Warn), Some("trace")), Level::WARN);
    assert_eq!(resolve_level(None, Some(" DEBUG ")), Level::DEBUG);
    assert_eq!(resolve_level(None, Some("loud")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
}

#[test]
fn warning_is_an_alias_for_warn() {
    assert_eq!(parse_level_str("warning"), Some(Level::WARN));
    assert_eq!(parse_level_str(""), None);
}

#[test]
fn cli_parses_subcommands_and_global_flags() {
    let args = CliArgs::try_parse_from(["crawlflow", "--log-level", "debug", "prefetch"]).unwrap();
    assert!(matches!(args.command, Command::Prefetch));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert_eq!(args.config, "Crawlflow.toml");

    let args =
        CliArgs::try_parse_from(["crawlflow", "--config", "alt.toml", "check-config"]).unwrap();
    assert!(matches!(args.command, Command::CheckConfig));
    assert_eq!(args.config, "alt.toml");

    assert!(CliArgs::try_parse_from(["crawlflow"]).is_err());
}

#[test]
fn filters_drop_retweets_and_matching_media() {
    let filter = SourceFilter::new(&["^RT @".to_string()], &["\\.gif$".to_string()]).unwrap();

    let rec = record(
        "2024-05-01T10:00:00Z",
        vec![
            ItemBuilder::new("1")
                .text("RT @someone look at this")
                .media("https://img/rt.png")
                .build(),
            ItemBuilder::new("2")
                .text("our booth map")
                .media("https://img/map.png")
                .media("https://img/anim.gif")
                .media("https://img/done.png")
                .build(),
            ItemBuilder::new("3").text("no pictures").build(),
        ],
    );

    let mut checkpoint = Checkpoint::default();
    checkpoint
        .classified_images
        .insert("https://img/done.png".to_string(), verdict(false, 0.2));

    let candidates = unclassified_media(&rec, &checkpoint, &filter);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].url, "https://img/map.png");
    assert_eq!(candidates[0].item_id, "2");
    assert_eq!(candidates[0].item_text, "our booth map");
}

#[test]
fn empty_filter_skips_nothing() {
    let filter = SourceFilter::default();
    assert!(!filter.skips_item("RT @anyone"));
    assert!(!filter.skips_media("https://img/a.gif"));
}
