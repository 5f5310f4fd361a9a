//! Process configuration (`# 6 Configuration`): local YAML file, overridable
//! by environment variables, following the same `config`-crate builder and
//! prefix convention the rest of the agent control family uses.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const CONFIG_ENV_VAR_PREFIX: &str = "OPAMP_COMMANDER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{0}`: `{1}`")]
    Read(String, std::io::Error),
    #[error("could not parse configuration: `{0}`")]
    Parse(#[from] config::ConfigError),
    #[error("invalid configuration: `{0}`")]
    Invalid(String),
}

fn default_server_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| format!("opamp-commander-{}", uuid::Uuid::new_v4()))
}

fn default_heartbeat_interval() -> Duration {
    crate::server_identity::DEFAULT_HEARTBEAT_INTERVAL
}

fn default_heartbeat_timeout() -> Duration {
    crate::server_identity::DEFAULT_HEARTBEAT_TIMEOUT
}

fn default_transport_listen() -> String {
    "0.0.0.0:4320".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `server.*` (`# 6 Configuration`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_id")]
    pub id: String,
    #[serde(default = "default_heartbeat_interval", deserialize_with = "duration_str::deserialize_duration")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_heartbeat_timeout", deserialize_with = "duration_str::deserialize_duration")]
    pub heartbeat_timeout: Duration,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            id: default_server_id(),
            heartbeat_interval: default_heartbeat_interval(),
            heartbeat_timeout: default_heartbeat_timeout(),
        }
    }
}

/// `persistence.*`. The in-memory adapter is the only one shipped in-tree
/// (`# 1 Non-goals`: the document store is an external collaborator); `uri`
/// is carried through for a future out-of-tree adapter to interpret.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistenceSection {
    pub uri: Option<String>,
}

/// `eventBus.*`, same shape and rationale as [`PersistenceSection`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventBusSection {
    pub uri: Option<String>,
}

/// `transport.*`: where the (externally specified) OpAMP listener binds.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_transport_listen")]
    pub listen: String,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            listen: default_transport_listen(),
        }
    }
}

/// `log.*`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level process config, deserialized from YAML with duration strings
/// like `"30s"` parsed by `duration-str` (`# 6 Configuration`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommanderConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default, rename = "eventBus")]
    pub event_bus: EventBusSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub log: LogSection,
}

impl CommanderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.heartbeat_interval >= self.server.heartbeat_timeout {
            return Err(ConfigError::Invalid(format!(
                "server.heartbeatInterval ({:?}) must be smaller than server.heartbeatTimeout ({:?})",
                self.server.heartbeat_interval, self.server.heartbeat_timeout
            )));
        }
        if self.server.id.trim().is_empty() {
            return Err(ConfigError::Invalid("server.id must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let builder: ConfigBuilder<DefaultState> = Config::builder();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_string_lossy().to_string(), e))?;

        let config = builder
            .add_source(File::from_str(contents.as_str(), FileFormat::Yaml))
            // `OPAMP_COMMANDER_SERVER__ID=s1` overrides `server.id`.
            .add_source(
                Environment::with_prefix(CONFIG_ENV_VAR_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<CommanderConfig>()?;

        config.validate()?;
        Ok(config)
    }
}
