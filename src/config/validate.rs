// src/config/validate.rs

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{CrawlflowError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::CrawlflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Check a parsed config without consuming it.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_engine(cfg)?;
    validate_pipeline_limits(cfg)?;
    validate_patterns("skip_text_patterns", &cfg.pipeline.skip_text_patterns)?;
    validate_patterns("skip_media_patterns", &cfg.pipeline.skip_media_patterns)?;
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.event_warn_threshold == 0 {
        return Err(CrawlflowError::ConfigError(
            "[engine].event_warn_threshold must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_pipeline_limits(cfg: &RawConfigFile) -> Result<()> {
    let p = &cfg.pipeline;

    if !(0.0..=1.0).contains(&p.confidence_threshold) {
        return Err(CrawlflowError::ConfigError(format!(
            "[pipeline].confidence_threshold must be within [0, 1] (got {})",
            p.confidence_threshold
        )));
    }

    if p.max_batch_bytes == 0 {
        return Err(CrawlflowError::ConfigError(
            "[pipeline].max_batch_bytes must be >= 1 (got 0)".to_string(),
        ));
    }

    if p.poll_interval_secs == 0 {
        return Err(CrawlflowError::ConfigError(
            "[pipeline].poll_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_patterns(field: &str, patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        if let Err(e) = Regex::new(pattern) {
            return Err(CrawlflowError::ConfigError(format!(
                "[pipeline].{field} contains invalid regex '{pattern}': {e}"
            )));
        }
    }
    Ok(())
}
