use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::environment::{Environment, environment_name};
use crate::relay_log::Level;

pub const DEFAULT_CONFIG_FILE: &str = "newman-relay.yaml";
pub const ENVIRONMENT_PLACEHOLDER: &str = "{env}";

#[derive(Clone, Debug, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default = "default_collection")]
    pub collection: PathBuf,
    #[serde(default = "default_environments_dir")]
    pub environments_dir: PathBuf,
    #[serde(default = "default_environment_file_pattern")]
    pub environment_file_pattern: String,
    #[serde(default)]
    pub newman: NewmanConfig,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: Level,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
            route: default_route(),
            collection: default_collection(),
            environments_dir: default_environments_dir(),
            environment_file_pattern: default_environment_file_pattern(),
            newman: NewmanConfig::default(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewmanConfig {
    #[serde(default = "default_newman_binary")]
    pub binary: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for NewmanConfig {
    fn default() -> Self {
        Self {
            binary: default_newman_binary(),
            extra_args: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }

    /// Applies the `PORT` environment variable, as hosting platforms set it.
    pub fn apply_port_env(&mut self, value: Option<&str>) -> anyhow::Result<()> {
        if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
            self.port = value
                .parse()
                .with_context(|| format!("invalid PORT value '{value}'"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.route.starts_with('/') {
            anyhow::bail!("route '{}' must start with '/'", self.route);
        }
        if !self.environment_file_pattern.contains(ENVIRONMENT_PLACEHOLDER) {
            anyhow::bail!(
                "environment_file_pattern '{}' must contain {ENVIRONMENT_PLACEHOLDER}",
                self.environment_file_pattern
            );
        }
        if self.newman.binary.trim().is_empty() {
            anyhow::bail!("newman.binary cannot be empty");
        }
        Ok(())
    }
}

pub fn environment_file_path(dir: &Path, pattern: &str, environment: Environment) -> PathBuf {
    dir.join(pattern.replace(ENVIRONMENT_PLACEHOLDER, environment_name(environment)))
}

/// Loads `path`, or the default file in `root` when `path` is `None`.
///
/// A missing default file, or one holding only comments, yields defaults.
/// An explicitly named file must exist.
pub fn load_relay_config(root: &Path, path: Option<&Path>) -> anyhow::Result<RelayConfig> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (root.join(DEFAULT_CONFIG_FILE), false),
    };
    if !path.exists() {
        if required {
            anyhow::bail!("config file {} not found", path.display());
        }
        return Ok(RelayConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if contents
        .lines()
        .all(|line| line.trim().is_empty() || line.trim().starts_with('#'))
    {
        return Ok(RelayConfig::default());
    }
    let mut config: RelayConfig = serde_yaml_bw::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let config_dir = path.parent().unwrap_or(root);
    config.collection = resolve_path(config_dir, &config.collection);
    config.environments_dir = resolve_path(config_dir, &config.environments_dir);
    config.log_dir = resolve_path(config_dir, &config.log_dir);
    config.validate()?;
    Ok(config)
}

fn resolve_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn default_listen_addr() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    3000
}

fn default_route() -> String {
    "/newmanRun".to_string()
}

fn default_collection() -> PathBuf {
    PathBuf::from("./collections/Restful_Booker_Collection.json")
}

fn default_environments_dir() -> PathBuf {
    PathBuf::from("./environments")
}

fn default_environment_file_pattern() -> String {
    "{env}_Restful_Booker_Environment.json".to_string()
}

fn default_newman_binary() -> String {
    "newman".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_level() -> Level {
    Level::Info
}
