//! Error types for the fault-management core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MendError>;

#[derive(Error, Debug)]
pub enum MendError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Remediation strategy {0} not found")]
    StrategyNotFound(i64),

    #[error("No remedy registered under key '{0}'")]
    RemedyNotRegistered(String),

    #[error("Remedy '{0}' does not match the instrumented operation's signature")]
    RemedySignatureMismatch(String),
}

impl MendError {
    /// True for failures of the stored state (database, snapshot file).
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            MendError::Database(_) | MendError::Io(_) | MendError::Json(_)
        )
    }

    /// True when a stored strategy could not be turned into a callable.
    pub fn is_unresolvable_remedy(&self) -> bool {
        matches!(
            self,
            MendError::RemedyNotRegistered(_) | MendError::RemedySignatureMismatch(_)
        )
    }
}
