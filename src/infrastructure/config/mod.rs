//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::services::bridge::IngressConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub subscribers: SubscriberConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            state: StateConfig::default(),
            logging: LoggingConfig::default(),
            queue: QueueConfig::default(),
            ingress: IngressConfig::default(),
            subscribers: SubscriberConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: ".atabus/bus.db".to_string(), max_connections: 5 }
    }
}

/// Root of all file-backed state (events, tasks, messages, registry, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub root: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { root: PathBuf::from(".atabus/state") }
    }
}

impl StateConfig {
    pub fn events_dir(&self) -> PathBuf {
        self.root.join("events")
    }
    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }
    pub fn messages_dir(&self) -> PathBuf {
        self.root.join("messages")
    }
    pub fn delivery_dir(&self) -> PathBuf {
        self.root.join("delivery_queue")
    }
    pub fn contexts_dir(&self) -> PathBuf {
        self.root.join("contexts")
    }
    pub fn outbox_file(&self) -> PathBuf {
        self.root.join("outbox").join("pending.json")
    }
    pub fn registry_file(&self) -> PathBuf {
        self.root.join("agent_registry.json")
    }
    pub fn applications_file(&self) -> PathBuf {
        self.root.join("agent_applications.json")
    }
    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }
    pub fn templates_file(&self) -> PathBuf {
        self.root.join("workflow_templates.json")
    }
    pub fn board_file(&self) -> PathBuf {
        self.root.join("board.md")
    }
    pub fn inbox_dir(&self) -> PathBuf {
        self.root.join("inbox")
    }
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }
    pub fn vault_dir(&self) -> PathBuf {
        self.root.join("admin_vault")
    }
    pub fn docs_dir(&self) -> PathBuf {
        self.root.join("docs")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file_dir: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_retries: u32,
    pub retry_delays_secs: Vec<i64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_retries: 3, retry_delays_secs: vec![1, 2, 4] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    pub poll_interval_secs: u64,
    pub batch_size: i64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 5, batch_size: 10 }
    }
}

/// Configuration loader with hierarchical merging.
///
/// Precedence (lowest to highest): programmatic defaults,
/// `.atabus/config.yaml`, `.atabus/local.yaml`, `ATABUS_*` env vars.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".atabus/config.yaml"))
            .merge(Yaml::file(".atabus/local.yaml"))
            .merge(Env::prefixed("ATABUS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<()> {
        anyhow::ensure!(!config.database.path.is_empty(), "database path cannot be empty");
        anyhow::ensure!(config.database.max_connections > 0, "max_connections must be at least 1");

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        anyhow::ensure!(
            valid_levels.contains(&config.logging.level.as_str()),
            "invalid log level: {}",
            config.logging.level
        );
        let valid_formats = ["json", "pretty"];
        anyhow::ensure!(
            valid_formats.contains(&config.logging.format.as_str()),
            "invalid log format: {}",
            config.logging.format
        );

        anyhow::ensure!(config.queue.max_retries > 0, "queue max_retries cannot be 0");
        anyhow::ensure!(
            !config.queue.retry_delays_secs.is_empty(),
            "queue retry_delays_secs cannot be empty"
        );
        anyhow::ensure!(
            config.ingress.active == "task_types" || config.ingress.active == "update_types",
            "ingress.active must be task_types or update_types"
        );
        Ok(())
    }
}
