//! Guildsync Rate Limit - fleet-wide rate limiting over a shared store
//!
//! Many independent workers (web requests, background jobs, operator commands)
//! talk to the same remote API. They share no process memory, so every piece of
//! rate-limit state lives in an external key/value store and is only ever
//! mutated through atomic primitives:
//!
//! - **Store**: [`SharedRateStore`] with [`MemoryRateStore`] and, behind the
//!   `redis` feature, [`RedisRateStore`]
//! - **Limiter**: [`SharedRateLimiter`] gating each call on the global backoff
//!   window and a per-route token bucket
//! - **Header Parsing**: advisory [`RateLimitHeaders`] harvested from responses
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use guildsync_ratelimit::{MemoryRateStore, RateLimitPolicy, SharedRateLimiter};
//!
//! let limiter = SharedRateLimiter::new(Arc::new(MemoryRateStore::new()), RateLimitPolicy::default());
//!
//! match limiter.acquire("guilds/42/roles", "req-1").await {
//!     Ok(remaining) => { /* issue the request */ }
//!     Err(e) => { /* reschedule after e.retry_after() */ }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod headers;
mod limiter;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod store;

pub use headers::*;
pub use limiter::*;
pub use memory::*;
#[cfg(feature = "redis")]
pub use redis_store::*;
pub use store::*;

use std::time::Duration;

/// Rate limit error.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The local quota for a route is used up and does not reset soon.
    #[error("Rate limit exhausted, retry after {retry_after:?}")]
    Exhausted {
        /// Time until the bucket resets.
        retry_after: Duration,
    },

    /// A global backoff imposed by the server is in effect.
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Remaining backoff window.
        retry_after: Duration,
    },

    /// The bounded wait-and-retry loop ran out of attempts.
    #[error("Failed to acquire rate limit after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The shared store failed.
    #[error("Rate store error: {0}")]
    Store(#[from] StoreError),
}

impl RateLimitError {
    /// Get the suggested retry delay, if the error is a backoff signal.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Exhausted { retry_after } | Self::TooManyRequests { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}
