//! Service-level error type.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a [`ServiceIntegration`](crate::ServiceIntegration).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Remote side asked us to slow down. Reschedule after `retry_after`.
    #[error("Service backing off, retry after {retry_after:?}")]
    Backoff { retry_after: Duration },

    /// Remote side failed or is unreachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Caller passed something the service cannot accept.
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Anything else, including contract violations by the remote side.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Service already registered: {0}")]
    DuplicateService(String),
}

impl ServiceError {
    /// Suggested delay before retrying, for backoff errors.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Backoff { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether a later retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backoff { .. } | Self::Unavailable(_))
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
