#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use newman_relay::config::RelayConfig;
use newman_relay::executor::{CollectionEngine, RunExecutor};
use newman_relay::handler::CommandHandler;
use newman_relay::notifier::Notifier;
use newman_relay::payload::NotificationPayload;
use newman_relay::run_result::{FailureRecord, RunResult};
use tokio::sync::Semaphore;

/// Records delivered payloads; the first `refuse_first` sends fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, NotificationPayload)>>,
    attempts: AtomicUsize,
    refuse_first: usize,
}

impl RecordingNotifier {
    pub fn refusing_first(count: usize) -> Self {
        Self {
            refuse_first: count,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, NotificationPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|(_, payload)| payload.attachments[0].title.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, url: &str, payload: &NotificationPayload) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.refuse_first {
            anyhow::bail!("connection refused to {url}");
        }
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(())
    }
}

pub enum Script {
    Succeed(RunResult),
    Fail(String),
    Panic,
}

/// Engine double that answers every run from a script.
///
/// With `gated`, each run waits until `release` is called once.
pub struct ScriptedEngine {
    script: Script,
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    gate: Option<Semaphore>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn gated(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
            gate: Some(Semaphore::new(0)),
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CollectionEngine for ScriptedEngine {
    async fn run(&self, collection: &Path, environment: &Path) -> anyhow::Result<RunResult> {
        self.calls
            .lock()
            .unwrap()
            .push((collection.to_path_buf(), environment.to_path_buf()));
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        match &self.script {
            Script::Succeed(result) => Ok(result.clone()),
            Script::Fail(message) => Err(anyhow::anyhow!(message.clone())),
            Script::Panic => panic!("engine blew up"),
        }
    }
}

pub fn run_result(failed: u64, total: u64) -> RunResult {
    let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    let failures = (0..failed)
        .map(|index| FailureRecord {
            test_name: format!("check {index}"),
            error_name: "AssertionError".to_string(),
            error_message: "expected 500 to equal 200".to_string(),
        })
        .collect();
    RunResult {
        environment: Some("Staging_Restful_Booker".to_string()),
        iterations: 1,
        started_at,
        completed_at: started_at + chrono::Duration::milliseconds(4_500),
        response_average_ms: 52.5,
        total_requests: 8,
        total_assertions: total,
        failed_assertions: failed,
        failures,
    }
}

pub fn handler_with(
    engine: Arc<ScriptedEngine>,
    notifier: Arc<RecordingNotifier>,
) -> CommandHandler {
    let executor = RunExecutor::new(engine, &RelayConfig::default());
    CommandHandler::new(executor, notifier)
}
