//! Command line interface (`# 6 Exit codes`: 0 success, 1 runtime error,
//! 2 validation error).

use crate::commander::Commander;
use crate::config::CommanderConfig;
use crate::error::CommanderError;
use crate::logging;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the commander process until interrupted.
    Serve {
        /// Path to the YAML configuration file.
        #[arg(long, default_value = "opamp-commander.yaml")]
        config: PathBuf,
    },
    /// Loads and validates a configuration file, then exits.
    ValidateConfig {
        #[arg(long, default_value = "opamp-commander.yaml")]
        config: PathBuf,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("logging setup failed: {0}")]
    Logging(#[from] logging::LoggingError),
    #[error(transparent)]
    Runtime(#[from] CommanderError),
}

impl CliError {
    /// Validation problems exit 2, everything else exits 1
    /// (`# 6 Admin API`: CLI exit code convention).
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Config(_) => ExitCode::from(2),
            CliError::Runtime(e) => ExitCode::from(e.exit_code() as u8),
            CliError::Logging(_) => ExitCode::from(1),
        }
    }
}

/// Parses arguments and runs the requested subcommand to completion.
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("opamp-commander: {e}");
            e.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::ValidateConfig { config } => {
            CommanderConfig::load(&config)?;
            println!("configuration is valid");
            Ok(())
        }
        Command::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: PathBuf) -> Result<(), CliError> {
    let config = CommanderConfig::load(&config_path)?;
    logging::try_init_tracing(&config.log)?;
    info!(server_id = %config.server.id, "starting opamp commander");

    let commander = Commander::new(config);
    let cancellation = CancellationToken::new();
    install_shutdown_handler(cancellation.clone());

    commander.run(cancellation).await?;
    Ok(())
}

/// Ctrl-C triggers a graceful stop of the heartbeat and subscriber loops
/// (`# 9 Design Notes`: coroutine control flow).
fn install_shutdown_handler(cancellation: CancellationToken) {
    let result = ctrlc::set_handler(move || {
        info!("received interrupt signal, shutting down");
        cancellation.cancel();
    });
    if let Err(e) = result {
        error!(error = %e, "could not install signal handler");
    }
}
