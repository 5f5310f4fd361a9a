//! Sets up the global [`tracing`] subscriber (`# 7 Observability`).

use crate::config::LogSection;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level `{0}`: `{1}`")]
    InvalidLevel(String, tracing_subscriber::filter::ParseError),
    #[error("could not install global subscriber: `{0}`")]
    Init(String),
}

/// Installs a process-wide subscriber. `RUST_LOG` takes precedence over
/// `logging.level` when set, matching the rest of the agent control family's
/// `EnvFilter` convention.
pub fn try_init_tracing(config: &LogSection) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| LoggingError::InvalidLevel(config.level.clone(), e))?,
    };

    let subscriber = Registry::default().with(filter);

    if config.json {
        let json_layer = tracing_subscriber::fmt::layer().json();
        subscriber
            .with(json_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))
    } else {
        let plain_layer = tracing_subscriber::fmt::layer();
        subscriber
            .with(plain_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))
    }
}
