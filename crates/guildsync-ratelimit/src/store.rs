//! Shared key/value store used as the only coordination medium between workers.

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised by a [`SharedRateStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis command or connection failure.
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A counter key holds a value that is not an integer.
    #[error("Value at `{key}` is not an integer")]
    NotAnInteger {
        /// Offending key.
        key: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic key/value operations against a store shared by all workers.
///
/// Rate counters must only be mutated through [`decrement_or_initialize`] and
/// [`set_if_longer`]. Implementations guarantee both are atomic with respect to
/// every other caller of the same store.
///
/// [`decrement_or_initialize`]: SharedRateStore::decrement_or_initialize
/// [`set_if_longer`]: SharedRateStore::set_if_longer
#[async_trait]
pub trait SharedRateStore: Send + Sync {
    /// Decrement the counter at `key` and return the new value.
    ///
    /// If the key is absent it is first set to `initial` with the given TTL, so
    /// the first caller sees `initial - 1`. An existing key keeps its TTL.
    async fn decrement_or_initialize(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> StoreResult<i64>;

    /// Set `key` to `value` with `ttl`, but only if that extends the key's
    /// remaining lifetime.
    ///
    /// Returns `true` if the key was written.
    async fn set_if_longer(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Read a value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Remaining lifetime of `key`.
    ///
    /// `None` when the key is absent or has no expiry.
    async fn ttl_remaining(&self, key: &str) -> StoreResult<Option<Duration>>;
}
