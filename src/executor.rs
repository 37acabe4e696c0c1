use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::{RelayConfig, environment_file_path};
use crate::environment::Environment;
use crate::relay_log;
use crate::run_result::{RunResult, decode_newman_report};

/// Runs a collection against an environment file and reports the raw result.
#[async_trait]
pub trait CollectionEngine: Send + Sync {
    async fn run(&self, collection: &Path, environment: &Path) -> anyhow::Result<RunResult>;
}

pub type DynCollectionEngine = Arc<dyn CollectionEngine>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunPlan {
    pub environment: Environment,
    pub collection: PathBuf,
    pub environment_file: PathBuf,
}

#[derive(Clone)]
pub struct RunExecutor {
    engine: DynCollectionEngine,
    collection: PathBuf,
    environments_dir: PathBuf,
    environment_file_pattern: String,
}

impl RunExecutor {
    pub fn new(engine: DynCollectionEngine, config: &RelayConfig) -> Self {
        Self {
            engine,
            collection: config.collection.clone(),
            environments_dir: config.environments_dir.clone(),
            environment_file_pattern: config.environment_file_pattern.clone(),
        }
    }

    pub fn plan(&self, environment: Environment) -> RunPlan {
        RunPlan {
            environment,
            collection: self.collection.clone(),
            environment_file: environment_file_path(
                &self.environments_dir,
                &self.environment_file_pattern,
                environment,
            ),
        }
    }

    /// Engine errors are returned as-is; classifying them is the caller's job.
    pub async fn execute(&self, environment: Environment) -> anyhow::Result<RunResult> {
        let plan = self.plan(environment);
        relay_log::debug(
            module_path!(),
            format!(
                "running collection={} environment_file={}",
                plan.collection.display(),
                plan.environment_file.display()
            ),
        );
        self.engine
            .run(&plan.collection, &plan.environment_file)
            .await
    }
}

/// Drives the `newman` command line and reads back its JSON report.
#[derive(Clone, Debug)]
pub struct NewmanCli {
    binary: String,
    extra_args: Vec<String>,
    report_dir: PathBuf,
}

impl NewmanCli {
    pub fn new(binary: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args,
            report_dir: std::env::temp_dir(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.newman.binary.clone(), config.newman.extra_args.clone())
    }

    pub fn with_report_dir(mut self, report_dir: PathBuf) -> Self {
        self.report_dir = report_dir;
        self
    }

    fn command_args(&self, collection: &Path, environment: &Path, report: &Path) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            collection.display().to_string(),
            "-e".to_string(),
            environment.display().to_string(),
            "--reporters".to_string(),
            "cli,json".to_string(),
            "--reporter-json-export".to_string(),
            report.display().to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl CollectionEngine for NewmanCli {
    async fn run(&self, collection: &Path, environment: &Path) -> anyhow::Result<RunResult> {
        tokio::fs::create_dir_all(&self.report_dir)
            .await
            .with_context(|| format!("failed to create {}", self.report_dir.display()))?;
        let report_path = self
            .report_dir
            .join(format!("newman-report-{}.json", Uuid::new_v4()));
        let output = Command::new(&self.binary)
            .args(self.command_args(collection, environment, &report_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to start {}", self.binary))?;

        // Newman exits non-zero when assertions fail but still writes the report.
        let report = tokio::fs::read_to_string(&report_path).await;
        let _ = tokio::fs::remove_file(&report_path).await;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = Some(stderr).filter(|stderr| !stderr.is_empty());
        let Ok(contents) = report else {
            return Err(match stderr {
                Some(stderr) => anyhow::anyhow!(stderr),
                None => anyhow::anyhow!(
                    "{} exited with {} without a report",
                    self.binary,
                    output.status
                ),
            });
        };
        let report = decode_newman_report(&contents)?;
        if report.run.is_aborted() {
            let message = report
                .run
                .abort_message()
                .or(stderr)
                .unwrap_or_else(|| format!("{} aborted the run", self.binary));
            return Err(anyhow::anyhow!(message));
        }
        RunResult::try_from(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::runtime::Runtime;

    struct RecordingEngine {
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    #[async_trait]
    impl CollectionEngine for RecordingEngine {
        async fn run(&self, collection: &Path, environment: &Path) -> anyhow::Result<RunResult> {
            self.calls
                .lock()
                .unwrap()
                .push((collection.to_path_buf(), environment.to_path_buf()));
            anyhow::bail!("ENOENT: environment file not found")
        }
    }

    #[test]
    fn plan_interpolates_environment_into_file_name() {
        let engine = Arc::new(RecordingEngine {
            calls: Mutex::new(Vec::new()),
        });
        let executor = RunExecutor::new(engine, &RelayConfig::default());
        let plan = executor.plan(Environment::Production);
        assert_eq!(
            plan.environment_file,
            PathBuf::from("./environments/Production_Restful_Booker_Environment.json")
        );
        assert_eq!(
            plan.collection,
            PathBuf::from("./collections/Restful_Booker_Collection.json")
        );
    }

    #[test]
    fn execute_passes_engine_error_through() -> anyhow::Result<()> {
        let engine = Arc::new(RecordingEngine {
            calls: Mutex::new(Vec::new()),
        });
        let executor = RunExecutor::new(engine.clone(), &RelayConfig::default());
        let runtime = Runtime::new()?;
        let err = runtime
            .block_on(executor.execute(Environment::Local))
            .unwrap_err();
        assert_eq!(err.to_string(), "ENOENT: environment file not found");
        let calls = engine.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.ends_with("Local_Restful_Booker_Environment.json"));
        Ok(())
    }

    #[test]
    fn newman_args_request_json_export() {
        let cli = NewmanCli::new("newman", vec!["--bail".to_string()]);
        let args = cli.command_args(
            Path::new("c.json"),
            Path::new("e.json"),
            Path::new("/tmp/r.json"),
        );
        assert_eq!(
            args,
            vec![
                "run",
                "c.json",
                "-e",
                "e.json",
                "--reporters",
                "cli,json",
                "--reporter-json-export",
                "/tmp/r.json",
                "--bail",
            ]
        );
    }

    #[test]
    fn missing_binary_is_an_execution_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cli = NewmanCli::new("definitely-not-newman-relay-binary", Vec::new())
            .with_report_dir(dir.path().to_path_buf());
        let runtime = Runtime::new()?;
        let err = runtime
            .block_on(cli.run(Path::new("c.json"), Path::new("e.json")))
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
        Ok(())
    }
}
