// tests/config_validation.rs

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;

use crawlflow::channel::ChannelSettings;
use crawlflow::config::loader::{load_and_validate, load_or_default, parse_str};
use crawlflow::config::model::{ConfigFile, DataPaths};
use crawlflow::config::validate::validate_config;
use crawlflow::errors::CrawlflowError;
use crawlflow::pipeline::PipelineSettings;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{contents}")?;
    Ok(file)
}

fn expect_config_error(contents: &str, needle: &str) {
    let file = write_config(contents).unwrap();
    match load_and_validate(file.path()) {
        Err(CrawlflowError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "'{msg}' should mention '{needle}'")
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let file = write_config("")?;
    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.engine.event_warn_threshold, 50_000);
    assert_eq!(cfg.channel.delay_ms, 2_000);
    assert_eq!(cfg.channel.rate_limit_backoff_ms, 60_000);
    assert_eq!(cfg.pipeline.confidence_threshold, 0.6);
    assert_eq!(cfg.pipeline.poll_interval_secs, 30);
    assert_eq!(cfg.pipeline.max_batch_bytes, 20_000_000);
    assert!(cfg.http.user_agent.starts_with("crawlflow/"));
    Ok(())
}

#[test]
fn explicit_values_flow_into_runtime_settings() -> TestResult {
    let file = write_config(
        r#"
[engine]
event_warn_threshold = 10

[channel]
delay_ms = 250
rate_limit_backoff_ms = 1500

[pipeline]
data_dir = "/srv/crawl"
confidence_threshold = 0.75
poll_interval_secs = 5
max_batch_bytes = 4096
skip_text_patterns = []
skip_media_patterns = ["\\.gif$"]
"#,
    )?;
    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.session_settings().event_warn_threshold, 10);

    let channel = ChannelSettings::from(&cfg.channel);
    assert_eq!(channel.delay, Duration::from_millis(250));
    assert_eq!(channel.rate_limit_backoff, Duration::from_millis(1500));

    let pipeline = PipelineSettings::from_config(&cfg.pipeline)?;
    assert_eq!(pipeline.poll_interval, Duration::from_secs(5));
    assert_eq!(pipeline.max_batch_bytes, 4096);
    assert_eq!(pipeline.confidence_threshold, 0.75);
    assert!(pipeline.filter.skips_media("https://img/anim.gif"));
    assert!(!pipeline.filter.skips_item("RT @someone"));
    assert_eq!(
        pipeline.paths.checkpoint,
        PathBuf::from("/srv/crawl/find-info/.analyze-checkpoint.json")
    );
    Ok(())
}

#[test]
fn data_paths_follow_the_documented_layout() {
    let paths = DataPaths::new("data");
    assert_eq!(paths.raw_tweets_dir, PathBuf::from("data/find-info/raw-tweets"));
    assert_eq!(paths.image_cache_dir, PathBuf::from("data/find-info/.image-cache"));
    assert_eq!(paths.booth_info_dir, PathBuf::from("data/booth-info"));
}

#[test]
fn threshold_out_of_range_is_rejected() {
    expect_config_error(
        "[pipeline]\nconfidence_threshold = 1.5\n",
        "confidence_threshold",
    );
}

#[test]
fn zero_limits_are_rejected() {
    expect_config_error("[pipeline]\nmax_batch_bytes = 0\n", "max_batch_bytes");
    expect_config_error("[pipeline]\npoll_interval_secs = 0\n", "poll_interval_secs");
    expect_config_error("[engine]\nevent_warn_threshold = 0\n", "event_warn_threshold");
}

#[test]
fn invalid_skip_pattern_is_rejected() {
    expect_config_error(
        "[pipeline]\nskip_text_patterns = [\"(unclosed\"]\n",
        "invalid regex '(unclosed'",
    );
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let file = write_config("[pipeline\nconfidence_threshold = ")?;
    assert!(matches!(
        load_and_validate(file.path()),
        Err(CrawlflowError::TomlError(_))
    ));
    Ok(())
}

#[test]
fn validate_config_checks_without_consuming() -> TestResult {
    let raw = parse_str("[pipeline]\nconfidence_threshold = 0.4\n")?;
    validate_config(&raw)?;
    let cfg = ConfigFile::try_from(raw)?;
    assert_eq!(cfg.pipeline.confidence_threshold, 0.4);
    Ok(())
}

#[test]
fn missing_explicit_file_is_an_error() {
    let result = load_or_default("/definitely/not/here/Crawlflow.toml");
    assert!(matches!(result, Err(CrawlflowError::IoError(_))));
}

#[test]
fn effective_config_renders_back_to_toml() -> TestResult {
    let rendered = toml::to_string_pretty(&ConfigFile::default())?;
    let reparsed = parse_str(&rendered)?;
    let cfg = ConfigFile::try_from(reparsed)?;
    assert_eq!(cfg.pipeline.skip_text_patterns, vec!["^RT @".to_string()]);
    assert_eq!(cfg.pipeline.data_dir, PathBuf::from("data"));
    Ok(())
}
