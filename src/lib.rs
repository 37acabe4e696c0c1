pub mod cli;
pub mod config;
pub mod environment;
pub mod executor;
pub mod formatter;
pub mod handler;
pub mod http_ingress;
pub mod notifier;
pub mod payload;
pub mod relay_log;
pub mod run_result;
