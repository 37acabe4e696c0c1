use std::{env, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::config::{self, RelayConfig};
use crate::environment::{self, Environment};
use crate::executor::{NewmanCli, RunExecutor};
use crate::formatter::summarize;
use crate::handler::CommandHandler;
use crate::http_ingress::{RelayServer, RelayServerConfig};
use crate::notifier::HttpNotifier;
use crate::payload;
use crate::relay_log::{self, Level};

#[derive(Parser)]
#[command(name = "newman-relay")]
#[command(about = "Run Newman collections from a Slack slash command", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the slash-command endpoint until interrupted.
    Serve(ServeArgs),
    /// Run the collection once against an environment and print the summary.
    Run(RunArgs),
}

#[derive(Parser)]
struct ServeArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    listen_addr: Option<std::net::IpAddr>,
    #[arg(long)]
    log_dir: Option<PathBuf>,
    #[arg(long)]
    debug: bool,
}

#[derive(Parser)]
struct RunArgs {
    #[arg(value_parser = parse_environment_arg)]
    environment: Environment,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the Slack summary payload instead of plain text.
    #[arg(long)]
    json: bool,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve(args) => args.run(),
            Command::Run(args) => args.run(),
        }
    }
}

fn parse_environment_arg(value: &str) -> Result<Environment, String> {
    environment::parse_environment(value).ok_or_else(|| {
        let names = environment::ALL
            .iter()
            .map(|environment| environment::environment_name(*environment))
            .collect::<Vec<_>>()
            .join(", ");
        format!("unknown environment '{value}'; expected one of {names}")
    })
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<RelayConfig> {
    let root = env::current_dir().context("unable to resolve working directory")?;
    config::load_relay_config(&root, path)
}

fn init_tracing(debug: bool) {
    let max_level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(max_level)
        .try_init();
}

impl ServeArgs {
    fn run(self) -> anyhow::Result<()> {
        init_tracing(self.debug);
        let mut config = load_config(self.config.as_deref())?;
        config.apply_port_env(env::var("PORT").ok().as_deref())?;
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(log_dir) = self.log_dir {
            config.log_dir = log_dir;
        }
        let log_level = if self.debug {
            Level::Debug
        } else {
            config.log_level
        };
        let log_dir = relay_log::init(config.log_dir.clone(), log_level)?;
        relay_log::debug(
            module_path!(),
            format!("relay log directory {}", log_dir.display()),
        );

        let engine = Arc::new(NewmanCli::from_config(&config));
        let executor = RunExecutor::new(engine, &config);
        let notifier = Arc::new(HttpNotifier::new()?);
        let handler = CommandHandler::new(executor, notifier);
        let server = RelayServer::start(RelayServerConfig {
            bind_addr: config.bind_addr(),
            route: config.route.clone(),
            handler,
            debug: self.debug,
        })?;
        println!("Server Started on port: {}", server.local_addr().port());

        let runtime = Runtime::new().context("failed to create signal runtime")?;
        runtime
            .block_on(tokio::signal::ctrl_c())
            .context("failed to wait for ctrl-c")?;
        relay_log::info(module_path!(), "shutting down");
        server.stop()
    }
}

impl RunArgs {
    fn run(self) -> anyhow::Result<()> {
        init_tracing(false);
        let config = load_config(self.config.as_deref())?;
        let engine = Arc::new(NewmanCli::from_config(&config));
        let executor = RunExecutor::new(engine, &config);
        let runtime = Runtime::new().context("failed to create run runtime")?;
        let result = runtime.block_on(executor.execute(self.environment))?;
        let summary = summarize(&result);
        if self.json {
            let payload = payload::run_summary(&summary);
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else {
            println!("Environment File: {}", summary.environment);
            println!("Total Run Duration: {}", summary.run_duration);
            println!("Iterations: {}", summary.iterations);
            println!("Requests: {}", summary.total_requests);
            println!("Assertions: {}", summary.total_assertions);
            println!("Failures: {}", summary.failed_assertions);
            println!("Av. Response Time: {}", summary.average_response_time);
            println!("Result: {}", summary.verdict.as_str());
            println!();
            println!("{}", summary.failures_text.trim_end());
        }
        if result.has_failures() {
            anyhow::bail!(
                "{} of {} assertions failed",
                result.failed_assertions,
                result.total_assertions
            );
        }
        Ok(())
    }
}
