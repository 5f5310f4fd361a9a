//! Error taxonomy shared across the reconciler, group resolver, connection
//! registry, server identity and router components.
//!
//! Every component-local error type converts into [`CommanderError`] at the
//! public surface so the Admin API and the CLI only ever need to match on
//! one set of kinds (`# 7 ERROR HANDLING DESIGN`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommanderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("stale version: expected `{expected}`, store has `{found}`")]
    StaleVersion { expected: i64, found: i64 },

    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    #[error("transport closed: {0}")]
    TransportClosed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommanderError {
    /// Exit code contract for the CLI surface (`# 6 Admin API` pagination
    /// section / `# 1` scope note): 0 success, 1 runtime error, 2 validation.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommanderError::Validation(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CommanderError>;
