//! Slack message shapes posted back to a slash command's `response_url`.

use serde::Serialize;

use crate::environment::Environment;
use crate::formatter::RunSummary;

const IN_CHANNEL: &str = "in_channel";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NotificationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    pub color: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrkdwn: Option<bool>,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Field {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short: Option<bool>,
}

impl Field {
    fn plain(value: impl Into<String>) -> Self {
        Self {
            title: None,
            value: value.into(),
            short: None,
        }
    }

    fn titled(title: &str, value: impl ToString, short: bool) -> Self {
        Self {
            title: Some(title.to_string()),
            value: value.to_string(),
            short: short.then_some(true),
        }
    }
}

/// The four messages a command can produce.
#[derive(Clone, Debug)]
pub enum Notification<'a> {
    InvalidEnvironment,
    RunStarted(Environment),
    RunSummary(&'a RunSummary),
    RunError(&'a str),
}

impl Notification<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEnvironment => "invalid_environment",
            Self::RunStarted(_) => "run_started",
            Self::RunSummary(_) => "run_summary",
            Self::RunError(_) => "run_error",
        }
    }

    pub fn to_payload(&self) -> NotificationPayload {
        match self {
            Self::InvalidEnvironment => invalid_environment(),
            Self::RunStarted(environment) => run_started(*environment),
            Self::RunSummary(summary) => run_summary(summary),
            Self::RunError(description) => run_error(description),
        }
    }
}

pub fn invalid_environment() -> NotificationPayload {
    NotificationPayload {
        response_type: None,
        attachments: vec![Attachment {
            fallback: None,
            color: "danger".to_string(),
            title: "Invalid Environment Name".to_string(),
            text: None,
            mrkdwn: None,
            fields: vec![Field::plain(
                "The environment name you entered is incorrect. Please try again.",
            )],
        }],
    }
}

pub fn run_started(environment: Environment) -> NotificationPayload {
    NotificationPayload {
        response_type: Some(IN_CHANNEL.to_string()),
        attachments: vec![Attachment {
            fallback: None,
            color: "good".to_string(),
            title: "Newman Test Run Started".to_string(),
            text: None,
            mrkdwn: Some(true),
            fields: vec![Field::plain(format!(
                "Your Summary Report for the *{environment}* environment will be with you _very_ soon"
            ))],
        }],
    }
}

pub fn run_summary(summary: &RunSummary) -> NotificationPayload {
    NotificationPayload {
        response_type: Some(IN_CHANNEL.to_string()),
        attachments: vec![Attachment {
            fallback: Some("Newman Run Summary".to_string()),
            color: summary.color.to_string(),
            title: "Summary Test Result".to_string(),
            text: Some(format!(
                "Environment File: *{}*\n Total Run Duration: {}",
                summary.environment, summary.run_duration
            )),
            mrkdwn: Some(true),
            fields: vec![
                Field::titled("No. Of Iterations", summary.iterations, true),
                Field::titled("No. Of Requests", summary.total_requests, true),
                Field::titled("No. Of Assertions", summary.total_assertions, true),
                Field::titled("No. Of Failures", summary.failed_assertions, true),
                Field::titled("Av. Response Time", &summary.average_response_time, true),
                Field::titled("Result", summary.verdict.as_str(), true),
                Field::titled("Test Failures", &summary.failures_text, false),
            ],
        }],
    }
}

pub fn run_error(description: &str) -> NotificationPayload {
    NotificationPayload {
        response_type: None,
        attachments: vec![Attachment {
            fallback: None,
            color: "danger".to_string(),
            title: "Newman Run Error".to_string(),
            text: None,
            mrkdwn: None,
            fields: vec![Field::plain(description)],
        }],
    }
}
