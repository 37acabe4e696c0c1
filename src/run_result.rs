//! Raw collection-run results and the Newman JSON report they are read from.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq)]
pub struct FailureRecord {
    pub test_name: String,
    pub error_name: String,
    pub error_message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub environment: Option<String>,
    pub iterations: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub response_average_ms: f64,
    pub total_requests: u64,
    pub total_assertions: u64,
    pub failed_assertions: u64,
    pub failures: Vec<FailureRecord>,
}

impl RunResult {
    pub fn duration_ms(&self) -> f64 {
        let elapsed = self.completed_at - self.started_at;
        elapsed.num_milliseconds().max(0) as f64
    }

    pub fn has_failures(&self) -> bool {
        self.failed_assertions > 0
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewmanReport {
    #[serde(default)]
    pub environment: Option<NewmanEnvironment>,
    pub run: NewmanRun,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewmanEnvironment {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewmanRun {
    #[serde(default)]
    pub stats: NewmanStats,
    #[serde(default)]
    pub timings: NewmanTimings,
    #[serde(default)]
    pub failures: Vec<NewmanFailure>,
    /// Set when Newman aborted the run; the report then holds partial counts.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl NewmanRun {
    pub fn is_aborted(&self) -> bool {
        self.error.as_ref().is_some_and(|error| !error.is_null())
    }

    /// Message of the error that aborted the run, when Newman recorded one.
    pub fn abort_message(&self) -> Option<String> {
        let message = match self.error.as_ref()? {
            serde_json::Value::Null => return None,
            serde_json::Value::String(message) => message.clone(),
            error => error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)?,
        };
        Some(message).filter(|message| !message.trim().is_empty())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewmanStats {
    #[serde(default)]
    pub iterations: NewmanCounter,
    #[serde(default)]
    pub requests: NewmanCounter,
    #[serde(default)]
    pub assertions: NewmanCounter,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct NewmanCounter {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewmanTimings {
    #[serde(default)]
    pub started: i64,
    #[serde(default)]
    pub completed: i64,
    #[serde(default)]
    pub response_average: f64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewmanFailure {
    #[serde(default)]
    pub error: NewmanError,
    #[serde(default)]
    pub source: Option<NewmanSource>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewmanError {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewmanSource {
    #[serde(default)]
    pub name: Option<String>,
}

impl TryFrom<NewmanReport> for RunResult {
    type Error = anyhow::Error;

    fn try_from(report: NewmanReport) -> anyhow::Result<Self> {
        if report.run.is_aborted() {
            let message = report
                .run
                .abort_message()
                .unwrap_or_else(|| "newman aborted the run".to_string());
            return Err(anyhow::anyhow!(message));
        }
        let timings = report.run.timings;
        let started_at = DateTime::<Utc>::from_timestamp_millis(timings.started)
            .with_context(|| format!("invalid run start timestamp {}", timings.started))?;
        let completed_at = DateTime::<Utc>::from_timestamp_millis(timings.completed)
            .with_context(|| format!("invalid run end timestamp {}", timings.completed))?;
        let stats = report.run.stats;
        let failures = report
            .run
            .failures
            .into_iter()
            .map(|failure| FailureRecord {
                // Non-assertion errors (e.g. a refused connection) carry no test name.
                test_name: failure
                    .error
                    .test
                    .or_else(|| failure.source.and_then(|source| source.name))
                    .unwrap_or_default(),
                error_name: failure.error.name,
                error_message: failure.error.message,
            })
            .collect();
        Ok(Self {
            environment: report.environment.and_then(|environment| environment.name),
            iterations: stats.iterations.total,
            started_at,
            completed_at,
            response_average_ms: timings.response_average,
            // Requests executed, not `stats.tests`.
            total_requests: stats.requests.total,
            total_assertions: stats.assertions.total,
            failed_assertions: stats.assertions.failed,
            failures,
        })
    }
}

pub fn decode_newman_report(contents: &str) -> anyhow::Result<NewmanReport> {
    serde_json::from_str(contents).context("failed to parse newman json report")
}

pub fn parse_newman_report(contents: &str) -> anyhow::Result<RunResult> {
    RunResult::try_from(decode_newman_report(contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_report() -> serde_json::Value {
        json!({
            "collection": { "info": { "name": "Restful Booker" } },
            "environment": { "id": "env-1", "name": "Staging_Restful_Booker", "values": [] },
            "run": {
                "stats": {
                    "iterations": { "total": 1, "pending": 0, "failed": 0 },
                    "requests": { "total": 12, "pending": 0, "failed": 0 },
                    "tests": { "total": 14, "pending": 0, "failed": 0 },
                    "assertions": { "total": 10, "pending": 0, "failed": 2 }
                },
                "timings": {
                    "responseAverage": 48.25,
                    "started": 1_700_000_000_000_i64,
                    "completed": 1_700_000_004_500_i64
                },
                "failures": [
                    {
                        "error": {
                            "name": "AssertionError",
                            "test": "Status code is 200",
                            "message": "expected 404 to equal 200"
                        },
                        "source": { "name": "Get Booking" }
                    },
                    {
                        "error": {
                            "name": "Error",
                            "message": "connect ECONNREFUSED 127.0.0.1:3001"
                        },
                        "source": { "name": "Create Booking" }
                    }
                ]
            }
        })
    }

    #[test]
    fn decodes_newman_report() -> anyhow::Result<()> {
        let result = parse_newman_report(&sample_report().to_string())?;
        assert_eq!(result.environment.as_deref(), Some("Staging_Restful_Booker"));
        assert_eq!(result.iterations, 1);
        assert_eq!(result.total_requests, 12);
        assert_eq!(result.total_assertions, 10);
        assert_eq!(result.failed_assertions, 2);
        assert_eq!(result.duration_ms(), 4500.0);
        assert_eq!(result.response_average_ms, 48.25);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].test_name, "Status code is 200");
        assert_eq!(result.failures[0].error_name, "AssertionError");
        Ok(())
    }

    #[test]
    fn failure_without_test_uses_request_name() -> anyhow::Result<()> {
        let result = parse_newman_report(&sample_report().to_string())?;
        assert_eq!(result.failures[1].test_name, "Create Booking");
        assert_eq!(
            result.failures[1].error_message,
            "connect ECONNREFUSED 127.0.0.1:3001"
        );
        Ok(())
    }

    #[test]
    fn missing_environment_decodes_as_none() -> anyhow::Result<()> {
        let mut report = sample_report();
        report
            .as_object_mut()
            .expect("report is an object")
            .remove("environment");
        let result = parse_newman_report(&report.to_string())?;
        assert!(result.environment.is_none());
        Ok(())
    }

    #[test]
    fn rejects_report_without_run() {
        let err = parse_newman_report("{}").unwrap_err();
        assert!(err.to_string().contains("newman json report"));
    }

    #[test]
    fn aborted_run_is_an_error() {
        let mut report = sample_report();
        report["run"]["error"] = json!({
            "name": "Error",
            "message": "collection could not be loaded",
            "stack": "Error: collection could not be loaded\n    at run"
        });
        let err = parse_newman_report(&report.to_string()).unwrap_err();
        assert_eq!(err.to_string(), "collection could not be loaded");
    }

    #[test]
    fn null_run_error_is_a_completed_run() -> anyhow::Result<()> {
        let mut report = sample_report();
        report["run"]["error"] = serde_json::Value::Null;
        let result = parse_newman_report(&report.to_string())?;
        assert_eq!(result.failed_assertions, 2);
        Ok(())
    }

    #[test]
    fn abort_without_message_has_no_message() -> anyhow::Result<()> {
        let mut report = sample_report();
        report["run"]["error"] = json!({ "name": "Error" });
        let decoded = decode_newman_report(&report.to_string())?;
        assert!(decoded.run.is_aborted());
        assert_eq!(decoded.run.abort_message(), None);
        Ok(())
    }

    #[test]
    fn reversed_timings_saturate_to_zero() -> anyhow::Result<()> {
        let mut report = sample_report();
        report["run"]["timings"]["completed"] = json!(1_600_000_000_000_i64);
        let result = parse_newman_report(&report.to_string())?;
        assert_eq!(result.duration_ms(), 0.0);
        Ok(())
    }
}
