use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),
}

/// Coarse classification of a failure, used by outer layers (e.g. an HTTP
/// adapter) to decide between a client-error and a server-error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller supplied something invalid. Maps to a 4xx-style response.
    InvalidInput,
    /// Anything else: database, network, lifecycle, configuration.
    Infrastructure,
}

impl ErrorCategory {
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorCategory::InvalidInput)
    }
}

/// Implemented by error types that can report their [`ErrorCategory`].
pub trait Categorized {
    fn category(&self) -> ErrorCategory;
}

impl Categorized for CoreError {
    fn category(&self) -> ErrorCategory {
        match self {
            CoreError::InvalidInput(..) => ErrorCategory::InvalidInput,
        }
    }
}
