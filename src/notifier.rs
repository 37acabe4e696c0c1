use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::payload::NotificationPayload;
use crate::relay_log;

/// Delivers a payload to a slash command's `response_url`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, url: &str, payload: &NotificationPayload) -> anyhow::Result<()>;
}

pub type DynNotifier = Arc<dyn Notifier>;

#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build notification http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, url: &str, payload: &NotificationPayload) -> anyhow::Result<()> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("failed to post notification to {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("notification to {url} rejected with {status}: {body}");
        }
        Ok(())
    }
}

/// Sends `payload` and logs a failed delivery instead of returning it.
///
/// Returns whether the delivery succeeded. Nothing is retried.
pub async fn deliver(
    notifier: &dyn Notifier,
    url: &str,
    kind: &str,
    payload: &NotificationPayload,
) -> bool {
    match notifier.send(url, payload).await {
        Ok(()) => {
            relay_log::debug(module_path!(), format!("delivered {kind} notification"));
            true
        }
        Err(err) => {
            relay_log::error(
                module_path!(),
                format!("dropping {kind} notification: {err:#}"),
            );
            false
        }
    }
}
