use core_types::{Categorized, CoreError, ErrorCategory};
use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidInput(#[from] CoreError),

    /// A storage failure, with what the service was doing at the time.
    #[error("problem {action}: {source}")]
    Storage {
        action: &'static str,
        #[source]
        source: DbError,
    },

    #[error(transparent)]
    Database(#[from] DbError),
}

impl ServiceError {
    pub(crate) fn storage(action: &'static str) -> impl FnOnce(DbError) -> Self {
        move |source| ServiceError::Storage { action, source }
    }
}

impl Categorized for ServiceError {
    fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::InvalidInput(e) => e.category(),
            ServiceError::Storage { .. } | ServiceError::Database(_) => ErrorCategory::Infrastructure,
        }
    }
}
