//! Slash-command orchestration: validate, acknowledge, run, report.

use std::time::Instant;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::environment::{Environment, match_environment};
use crate::executor::RunExecutor;
use crate::formatter::{Verdict, pretty_elapsed, summarize};
use crate::notifier::{DynNotifier, deliver};
use crate::payload::Notification;
use crate::relay_log;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundCommand {
    pub callback_url: String,
    pub raw_text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    Rejected,
    Reported(Verdict),
    Errored(String),
}

/// A command that has been acknowledged; its notifications run on `task`.
pub struct Dispatched {
    pub environment: Option<Environment>,
    pub task: JoinHandle<PipelineOutcome>,
}

impl Dispatched {
    /// Lets the pipeline finish on its own, logging it if the task dies.
    pub fn detach(self) {
        let task = self.task;
        tokio::spawn(async move {
            if let Err(err) = task.await {
                relay_log::error(module_path!(), format!("background run task failed: {err}"));
            }
        });
    }
}

#[derive(Clone)]
pub struct CommandHandler {
    executor: RunExecutor,
    notifier: DynNotifier,
}

impl CommandHandler {
    pub fn new(executor: RunExecutor, notifier: DynNotifier) -> Self {
        Self { executor, notifier }
    }

    /// Validates the command and spawns its notification chain.
    ///
    /// Returns without waiting on any notification or run, so the caller
    /// can acknowledge right away. Must be called inside a tokio runtime.
    pub fn dispatch(&self, command: InboundCommand) -> Dispatched {
        let notifier = self.notifier.clone();
        let Some(environment) = match_environment(&command.raw_text) else {
            relay_log::info(
                module_path!(),
                format!("rejected command text={:?}: no environment", command.raw_text),
            );
            let task = tokio::spawn(async move {
                let notification = Notification::InvalidEnvironment;
                let delivered = deliver(
                    notifier.as_ref(),
                    &command.callback_url,
                    notification.kind(),
                    &notification.to_payload(),
                )
                .await;
                relay_log::debug(
                    module_path!(),
                    format!("rejection finished delivered={delivered}"),
                );
                PipelineOutcome::Rejected
            });
            return Dispatched {
                environment: None,
                task,
            };
        };

        let run_id = Uuid::new_v4();
        relay_log::info(
            module_path!(),
            format!("accepted run_id={run_id} environment={environment}"),
        );
        let executor = self.executor.clone();
        let task = tokio::spawn(run_and_report(
            executor,
            notifier,
            command.callback_url,
            environment,
            run_id,
        ));
        Dispatched {
            environment: Some(environment),
            task,
        }
    }
}

async fn run_and_report(
    executor: RunExecutor,
    notifier: DynNotifier,
    callback_url: String,
    environment: Environment,
    run_id: Uuid,
) -> PipelineOutcome {
    let started = Notification::RunStarted(environment);
    let announced = deliver(
        notifier.as_ref(),
        &callback_url,
        started.kind(),
        &started.to_payload(),
    )
    .await;
    if !announced {
        relay_log::warn(
            module_path!(),
            format!("run_id={run_id} started notification lost; running anyway"),
        );
    }

    let clock = Instant::now();
    match executor.execute(environment).await {
        Ok(result) => {
            let summary = summarize(&result);
            relay_log::info(
                module_path!(),
                format!(
                    "run_id={run_id} environment={environment} result={} assertions={}/{} elapsed={}",
                    summary.verdict.as_str(),
                    summary.failed_assertions,
                    summary.total_assertions,
                    pretty_elapsed(clock),
                ),
            );
            let notification = Notification::RunSummary(&summary);
            let delivered = deliver(
                notifier.as_ref(),
                &callback_url,
                notification.kind(),
                &notification.to_payload(),
            )
            .await;
            relay_log::debug(
                module_path!(),
                format!("run_id={run_id} finished delivered={delivered}"),
            );
            PipelineOutcome::Reported(summary.verdict)
        }
        Err(err) => {
            let description = format!("{err:#}");
            relay_log::error(
                module_path!(),
                format!(
                    "run_id={run_id} environment={environment} failed after {}: {description}",
                    pretty_elapsed(clock)
                ),
            );
            let notification = Notification::RunError(&description);
            let delivered = deliver(
                notifier.as_ref(),
                &callback_url,
                notification.kind(),
                &notification.to_payload(),
            )
            .await;
            relay_log::debug(
                module_path!(),
                format!("run_id={run_id} finished delivered={delivered}"),
            );
            PipelineOutcome::Errored(description)
        }
    }
}
