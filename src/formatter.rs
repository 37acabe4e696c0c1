//! Turns a raw run result into the human-readable summary posted to Slack.

use std::time::Instant;

use serde::Serialize;

use crate::run_result::RunResult;

pub const NO_ENVIRONMENT_PLACEHOLDER: &str = "No Environment file specified for the Newman Run";
pub const NO_FAILURES_PLACEHOLDER: &str = "No Test Failures";

const MS_PER_SECOND: f64 = 1_000.0;
const MS_PER_MINUTE: u64 = 60_000;
const MS_PER_HOUR: u64 = 3_600_000;
const MS_PER_DAY: u64 = 86_400_000;
const SECOND_ROUNDING_EPSILON: f64 = 0.000_000_1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Passed => "good",
            Self::Failed => "danger",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub environment: String,
    pub run_duration: String,
    pub average_response_time: String,
    pub verdict: Verdict,
    pub color: &'static str,
    pub failures_text: String,
    pub iterations: u64,
    pub total_requests: u64,
    pub total_assertions: u64,
    pub failed_assertions: u64,
}

pub fn summarize(result: &RunResult) -> RunSummary {
    let verdict = if result.has_failures() {
        Verdict::Failed
    } else {
        Verdict::Passed
    };
    RunSummary {
        environment: environment_display(result.environment.as_deref()),
        run_duration: pretty_ms(result.duration_ms(), 0),
        average_response_time: pretty_ms(result.response_average_ms, 2),
        verdict,
        color: verdict.color(),
        failures_text: failures_text(result),
        iterations: result.iterations,
        total_requests: result.total_requests,
        total_assertions: result.total_assertions,
        failed_assertions: result.failed_assertions,
    }
}

fn environment_display(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => NO_ENVIRONMENT_PLACEHOLDER.to_string(),
    }
}

fn failures_text(result: &RunResult) -> String {
    if result.failures.is_empty() {
        return NO_FAILURES_PLACEHOLDER.to_string();
    }
    result
        .failures
        .iter()
        .map(|failure| {
            format!(
                "*{}:* {} - _{}_\n\n",
                failure.error_name, failure.test_name, failure.error_message
            )
        })
        .collect()
}

/// Renders a millisecond count as a compact duration such as `1h 2m 3.4s`.
///
/// Units that come out as zero are skipped. Below one second the value is
/// printed in milliseconds, with `ms_decimal_digits` fixed decimals when
/// non-zero; from one second up seconds keep one floored decimal.
pub fn pretty_ms(milliseconds: f64, ms_decimal_digits: usize) -> String {
    let milliseconds = if milliseconds.is_finite() {
        milliseconds.max(0.0)
    } else {
        0.0
    };
    let whole = milliseconds.trunc() as u64;
    let days = whole / MS_PER_DAY;

    let mut parts = Vec::new();
    push_unit(&mut parts, (days / 365).to_string(), "y");
    push_unit(&mut parts, (days % 365).to_string(), "d");
    push_unit(&mut parts, ((whole / MS_PER_HOUR) % 24).to_string(), "h");
    push_unit(&mut parts, ((whole / MS_PER_MINUTE) % 60).to_string(), "m");

    if milliseconds < MS_PER_SECOND {
        let value = if ms_decimal_digits > 0 {
            format!("{milliseconds:.ms_decimal_digits$}")
        } else if milliseconds >= 1.0 {
            format!("{}", milliseconds.round())
        } else {
            format!("{}", milliseconds.ceil())
        };
        push_unit(&mut parts, value, "ms");
    } else {
        let seconds = (milliseconds / MS_PER_SECOND) % 60.0;
        let floored = (seconds * 10.0 + SECOND_ROUNDING_EPSILON).floor() / 10.0;
        let value = format!("{floored:.1}");
        let value = value.strip_suffix(".0").unwrap_or(&value).to_string();
        push_unit(&mut parts, value, "s");
    }

    if parts.is_empty() {
        return "0ms".to_string();
    }
    parts.join(" ")
}

pub fn pretty_elapsed(since: Instant) -> String {
    pretty_ms(since.elapsed().as_secs_f64() * MS_PER_SECOND, 0)
}

fn push_unit(parts: &mut Vec<String>, value: String, suffix: &str) {
    let is_zero = value.parse::<f64>().map(|v| v == 0.0).unwrap_or(false);
    if is_zero {
        return;
    }
    parts.push(format!("{value}{suffix}"));
}
