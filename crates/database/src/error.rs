use core_types::{Categorized, ErrorCategory, TransitionError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    // --- Configuration: fatal at startup, never retried ---
    #[error("Invalid database connection configuration: {0}")]
    ConnectionConfigError(String),

    #[error("Failed to read TLS material from {path:?}: {source}")]
    TlsMaterial {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("server certificate authority: {0:?} is not a valid PEM file")]
    InvalidCertificateAuthority(PathBuf),

    // --- Connectivity: transient ---
    #[error("Failed to connect to the database: {0}")]
    ConnectionError(#[source] sqlx::Error),

    #[error("Gave up connecting to the database after {attempts} attempts: {source}")]
    ConnectExhausted {
        attempts: u32,
        #[source]
        source: Box<DbError>,
    },

    #[error("database unavailable: {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("The database is not connected.")]
    NotConnected,

    // --- Transactions ---
    #[error("could not begin tx: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("could not commit tx: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("could not rollback tx: {rollback}; original cause: {cause}")]
    Rollback {
        #[source]
        rollback: sqlx::Error,
        cause: String,
    },

    #[error("The transaction on this context has already been closed.")]
    TxClosed,

    #[error("Batch statement {index} failed: {source}")]
    BatchStatement {
        index: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    // --- Lifecycle ---
    #[error(transparent)]
    Lifecycle(#[from] TransitionError),

    #[error("Timed out after {0:?} waiting for background workers to stop")]
    ShutdownTimeout(Duration),
}

impl DbError {
    /// `true` for failures worth another attempt: the server may come back.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::ConnectionError(_) | DbError::Unavailable { .. }
        )
    }

    /// `true` for configuration problems that no amount of retrying will fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DbError::ConnectionConfigError(_)
                | DbError::TlsMaterial { .. }
                | DbError::InvalidCertificateAuthority(_)
        )
    }

    /// The database failure that made a guarded connect or shutdown action fail.
    pub fn action_source(&self) -> Option<&DbError> {
        match self {
            DbError::Lifecycle(TransitionError::Action { source, .. }) => {
                source.downcast_ref::<DbError>()
            }
            _ => None,
        }
    }
}

impl Categorized for DbError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Infrastructure
    }
}
