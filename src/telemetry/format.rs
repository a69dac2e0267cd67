// src/telemetry/format.rs

//! Human-readable renderings of durations, progress and failures.

use std::time::Duration;

use crate::engine::TaskError;
use crate::errors::{PropertyMismatch, ValidationError};
use crate::types::ProgressValue;

/// `850ms`, `12s`, `3m 4s`.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    if ms < 60_000 {
        return format!("{}s", round_div(ms, 1_000));
    }
    let minutes = ms / 60_000;
    let seconds = round_div(ms % 60_000, 1_000);
    format!("{minutes}m {seconds}s")
}

fn round_div(value: u128, divisor: u128) -> u128 {
    (value + divisor / 2) / divisor
}

pub fn format_progress(progress: &ProgressValue) -> String {
    match progress {
        ProgressValue::Indefinite => "…".to_string(),
        ProgressValue::Count(n) => n.to_string(),
        ProgressValue::Ratio(r) => format!("{}%", (r * 100.0).round() as u64),
    }
}

/// One-line message for a task failure.
///
/// Validation failures collapse to their issue count; everything else uses
/// the top-level message.
pub fn format_error(err: &TaskError) -> String {
    match err.find::<ValidationError>() {
        Some(validation) => {
            let n = validation.issue_count();
            format!("Validation failed ({n} issue{})", if n == 1 { "" } else { "s" })
        }
        None => err.to_string(),
    }
}

/// Mismatch list of a validation failure anywhere in `err`'s cause chain.
pub fn validation_mismatches(err: &TaskError) -> Option<&[PropertyMismatch]> {
    err.find::<ValidationError>()
        .map(|validation| validation.mismatches.as_slice())
}

/// Full cause chain, one cause per line.
pub fn format_error_chain(err: &TaskError) -> String {
    err.inner()
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n  caused by: ")
}
