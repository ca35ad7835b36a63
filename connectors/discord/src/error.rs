//! Discord-specific error types.

use std::time::Duration;

use guildsync_core::ServiceError;
use guildsync_ratelimit::{RateLimitError, StoreError};
use thiserror::Error;

/// Discord-specific errors.
#[derive(Error, Debug)]
pub enum DiscordError {
    /// Local quota for the route is used up. Retry after the delay.
    #[error("Rate limit exhausted, retry after {retry_after:?}")]
    RateLimitExhausted { retry_after: Duration },

    /// The API rejected a call with 429, or a backoff it imposed is ongoing.
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    /// Short waits kept failing until the attempt ceiling.
    #[error("Failed to handle rate limit after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The API answered with an unexpected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Discord API returned an error status
    #[error("Discord API error {status}: {message}")]
    Status {
        status: u16,
        message: String,
        code: Option<u64>,
    },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Shared store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No bot token configured")]
    MissingToken,
}

impl DiscordError {
    /// Get the suggested retry delay.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExhausted { retry_after } | Self::TooManyRequests { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// Retry delay rounded up to whole seconds, for task schedulers.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(|d| {
            let secs = d.as_secs();
            if d.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }

    /// Whether the caller should reschedule instead of failing.
    #[must_use]
    pub const fn is_backoff(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExhausted { .. } | Self::TooManyRequests { .. }
        )
    }

    /// HTTP status of an API error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<RateLimitError> for DiscordError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exhausted { retry_after } => Self::RateLimitExhausted { retry_after },
            RateLimitError::TooManyRequests { retry_after } => Self::TooManyRequests { retry_after },
            RateLimitError::RetriesExhausted { attempts } => Self::RetriesExhausted { attempts },
            RateLimitError::Store(e) => Self::Store(e),
        }
    }
}

impl From<DiscordError> for ServiceError {
    fn from(err: DiscordError) -> Self {
        if let Some(retry_after) = err.retry_after() {
            return Self::Backoff { retry_after };
        }
        match err {
            DiscordError::Http(_) | DiscordError::Store(_) => Self::Unavailable(err.to_string()),
            DiscordError::Status { status, .. } if status >= 500 => {
                Self::Unavailable(err.to_string())
            }
            DiscordError::InvalidMethod(_)
            | DiscordError::InvalidArgument(_)
            | DiscordError::MissingToken => Self::Invalid(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

/// Result type for Discord operations.
pub type DiscordResult<T> = Result<T, DiscordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_secs_rounds_up() {
        let err = DiscordError::TooManyRequests {
            retry_after: Duration::from_millis(3500),
        };
        assert_eq!(err.retry_after_secs(), Some(4));

        let err = DiscordError::RateLimitExhausted {
            retry_after: Duration::from_secs(2),
        };
        assert_eq!(err.retry_after_secs(), Some(2));
        assert!(err.is_backoff());

        assert_eq!(DiscordError::MissingToken.retry_after_secs(), None);
    }

    #[test]
    fn test_from_rate_limit_error() {
        let err: DiscordError = RateLimitError::RetriesExhausted { attempts: 1000 }.into();
        assert!(matches!(err, DiscordError::RetriesExhausted { attempts: 1000 }));
        assert!(!err.is_backoff());

        let err: DiscordError = RateLimitError::TooManyRequests {
            retry_after: Duration::from_secs(1),
        }
        .into();
        assert!(err.is_backoff());
    }

    #[test]
    fn test_into_service_error() {
        let backoff: ServiceError = DiscordError::TooManyRequests {
            retry_after: Duration::from_secs(3),
        }
        .into();
        assert_eq!(backoff.retry_after(), Some(Duration::from_secs(3)));

        let server: ServiceError = DiscordError::Status {
            status: 502,
            message: "Bad Gateway".into(),
            code: None,
        }
        .into();
        assert!(matches!(server, ServiceError::Unavailable(_)));

        let client: ServiceError = DiscordError::Status {
            status: 403,
            message: "Missing Permissions".into(),
            code: Some(50013),
        }
        .into();
        assert!(matches!(client, ServiceError::Internal(_)));

        let invalid: ServiceError = DiscordError::InvalidArgument("nick".into()).into();
        assert!(matches!(invalid, ServiceError::Invalid(_)));
    }
}
