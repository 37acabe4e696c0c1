use std::{
    fs::{File, OpenOptions},
    io,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::Utc;
use serde::Deserialize;
use std::sync::OnceLock;

pub const LOG_FILE_NAME: &str = "relay.log";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

struct Logger {
    writer: Mutex<File>,
    min_level: Level,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Opens `relay.log` under `log_dir`, falling back to `./logs`.
///
/// Returns the directory actually used. Records logged before `init` (or
/// when it fails) still reach the `tracing` subscriber.
pub fn init(log_dir: PathBuf, min_level: Level) -> anyhow::Result<PathBuf> {
    let fallback = std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("logs");

    let mut candidates = vec![log_dir.clone()];
    if fallback != log_dir {
        candidates.push(fallback.clone());
    }

    let mut last_error: Option<(PathBuf, io::Error)> = None;
    for candidate in candidates {
        match try_open_relay_log(&candidate) {
            Ok(file) => {
                let logger = Logger {
                    writer: Mutex::new(file),
                    min_level,
                };
                if LOGGER.set(logger).is_err() {
                    anyhow::bail!("relay logger already initialized");
                }
                if candidate != log_dir {
                    eprintln!(
                        "unable to write {LOG_FILE_NAME} at {}; falling back to {}",
                        log_dir.display(),
                        candidate.display()
                    );
                }
                return Ok(candidate);
            }
            Err(err) => {
                last_error = Some((candidate, err));
            }
        }
    }

    if let Some((path, err)) = last_error {
        Err(anyhow::anyhow!(
            "unable to open relay log at {}: {}",
            path.display(),
            err
        ))
    } else {
        anyhow::bail!("unable to initialize relay log")
    }
}

fn try_open_relay_log(log_dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
}

pub fn log(level: Level, target: &str, message: String) {
    mirror_to_tracing(level, target, &message);
    let logger = match LOGGER.get() {
        Some(logger) => logger,
        None => return,
    };
    if level < logger.min_level {
        return;
    }
    let mut writer = match logger.writer.lock() {
        Ok(writer) => writer,
        Err(_) => return,
    };
    let timestamp = Utc::now().to_rfc3339();
    if writeln!(*writer, "{timestamp} [{level:?}] {target} - {message}").is_err() {
        let _ = writer.flush();
    }
}

fn mirror_to_tracing(level: Level, target: &str, message: &str) {
    match level {
        Level::Trace => tracing::trace!(source = target, "{message}"),
        Level::Debug => tracing::debug!(source = target, "{message}"),
        Level::Info => tracing::info!(source = target, "{message}"),
        Level::Warn => tracing::warn!(source = target, "{message}"),
        Level::Error => tracing::error!(source = target, "{message}"),
    }
}

pub fn trace(target: &str, message: impl AsRef<str>) {
    log(Level::Trace, target, message.as_ref().to_string());
}

pub fn debug(target: &str, message: impl AsRef<str>) {
    log(Level::Debug, target, message.as_ref().to_string());
}

pub fn info(target: &str, message: impl AsRef<str>) {
    log(Level::Info, target, message.as_ref().to_string());
}

pub fn warn(target: &str, message: impl AsRef<str>) {
    log(Level::Warn, target, message.as_ref().to_string());
}

pub fn error(target: &str, message: impl AsRef<str>) {
    log(Level::Error, target, message.as_ref().to_string());
}
