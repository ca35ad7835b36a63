//! Rate limiter coordinating a fleet of workers through a [`SharedRateStore`].
//!
//! Each call first honours any global backoff the server imposed, then takes a
//! token from the route's bucket. Short waits are slept out locally; long ones
//! surface as errors carrying the delay so the caller can reschedule instead of
//! tying up a worker.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{RateLimitError, RateLimitHeaders, SharedRateStore};

/// Value stored under the global backoff key.
pub const GLOBAL_BACKOFF_VALUE: &str = "GLOBAL_API_BACKOFF";

/// Unit of the `retry_after` field in a 429 body.
///
/// API v10 answers in seconds. Older versions answer in milliseconds when
/// asked with `X-RateLimit-Precision: millisecond`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryAfterUnit {
    #[default]
    Seconds,
    Milliseconds,
}

impl RetryAfterUnit {
    /// `value` expressed in milliseconds.
    #[must_use]
    pub fn to_millis(self, value: f64) -> f64 {
        match self {
            Self::Seconds => value * 1000.0,
            Self::Milliseconds => value,
        }
    }
}

/// Tunables for [`SharedRateLimiter`]. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests allowed per bucket window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Length of a bucket window.
    #[serde(default = "default_resets_after_ms")]
    pub resets_after_ms: u64,

    /// Added to server-declared durations to absorb clock skew.
    #[serde(default = "default_duration_contingency_ms")]
    pub duration_contingency_ms: u64,

    /// Backoff used when a 429 carries no usable `retry_after`.
    #[serde(default = "default_backoff_ms")]
    pub default_backoff_ms: u64,

    /// Waits shorter than this are slept out instead of raised.
    #[serde(default = "default_wait_threshold_ms")]
    pub wait_threshold_ms: u64,

    /// Floor for any local sleep.
    #[serde(default = "default_minimum_blocking_wait_ms")]
    pub minimum_blocking_wait_ms: u64,

    /// Ceiling on wait-and-retry rounds for a single call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How the server's `retry_after` is to be read.
    #[serde(default)]
    pub retry_after_unit: RetryAfterUnit,
}

const fn default_max_requests() -> u32 {
    5
}

const fn default_resets_after_ms() -> u64 {
    5000
}

const fn default_duration_contingency_ms() -> u64 {
    500
}

const fn default_backoff_ms() -> u64 {
    5000
}

const fn default_wait_threshold_ms() -> u64 {
    250
}

const fn default_minimum_blocking_wait_ms() -> u64 {
    50
}

const fn default_max_attempts() -> u32 {
    1000
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            resets_after_ms: default_resets_after_ms(),
            duration_contingency_ms: default_duration_contingency_ms(),
            default_backoff_ms: default_backoff_ms(),
            wait_threshold_ms: default_wait_threshold_ms(),
            minimum_blocking_wait_ms: default_minimum_blocking_wait_ms(),
            max_attempts: default_max_attempts(),
            retry_after_unit: RetryAfterUnit::default(),
        }
    }
}

impl RateLimitPolicy {
    /// TTL of a freshly initialised bucket.
    #[must_use]
    pub const fn bucket_ttl(&self) -> Duration {
        Duration::from_millis(self.resets_after_ms + self.duration_contingency_ms)
    }

    /// Safety margin added to server-declared delays.
    #[must_use]
    pub const fn contingency(&self) -> Duration {
        Duration::from_millis(self.duration_contingency_ms)
    }

    /// Waits below this are slept out locally.
    #[must_use]
    pub const fn wait_threshold(&self) -> Duration {
        Duration::from_millis(self.wait_threshold_ms)
    }

    /// Floor for local sleeps.
    #[must_use]
    pub const fn minimum_blocking_wait(&self) -> Duration {
        Duration::from_millis(self.minimum_blocking_wait_ms)
    }

    /// Effective backoff for a 429 given the server's `retry_after`, read in
    /// [`retry_after_unit`](Self::retry_after_unit).
    ///
    /// A usable value gets the contingency added; anything else falls back to
    /// the default backoff.
    #[must_use]
    pub fn backoff_for(&self, retry_after: Option<f64>) -> Duration {
        match retry_after.map(|v| self.retry_after_unit.to_millis(v)) {
            Some(ms) if ms.is_finite() && ms >= 0.0 => {
                // Truncate fractional milliseconds.
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let ms = ms.min(u64::MAX as f64) as u64;
                Duration::from_millis(ms.saturating_add(self.duration_contingency_ms))
            }
            _ => Duration::from_millis(self.default_backoff_ms),
        }
    }

    /// `wait` plus the contingency.
    #[must_use]
    pub fn padded(&self, wait: Duration) -> Duration {
        wait.saturating_add(self.contingency())
    }
}

/// Major resource of a route: its first two path segments.
///
/// `guilds/42/members/7/roles/9` and `guilds/42/roles` share the bucket
/// `guilds/42`.
#[must_use]
pub fn major_route(route: &str) -> String {
    let path = route.split(&['?', '#'][..]).next().unwrap_or_default();
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join("/")
}

/// Rate limiter whose only state lives in a shared store.
pub struct SharedRateLimiter {
    store: Arc<dyn SharedRateStore>,
    policy: RateLimitPolicy,
    key_prefix: String,
    enabled: bool,
}

impl std::fmt::Debug for SharedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRateLimiter")
            .field("policy", &self.policy)
            .field("key_prefix", &self.key_prefix)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl SharedRateLimiter {
    /// Create a limiter over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SharedRateStore>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            policy,
            key_prefix: "ratelimit".into(),
            enabled: true,
        }
    }

    /// Namespace all keys under `prefix`.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Turn gating on or off.
    ///
    /// Only disable for callers known not to race with anyone else, such as an
    /// exclusive operator command.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether calls are gated.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Key holding the global backoff window.
    #[must_use]
    pub fn backoff_key(&self) -> String {
        format!("{}:global:backoff", self.key_prefix)
    }

    /// Key holding the token counter for `route`'s bucket.
    #[must_use]
    pub fn bucket_key(&self, route: &str) -> String {
        format!("{}:route:{}", self.key_prefix, major_route(route))
    }

    /// Gate one call on `route`.
    ///
    /// Returns the tokens left in the bucket after this call, or `None` when
    /// gating is disabled.
    ///
    /// # Errors
    ///
    /// - [`RateLimitError::TooManyRequests`] while a long global backoff runs
    /// - [`RateLimitError::Exhausted`] when the bucket is empty and does not reset soon
    /// - [`RateLimitError::RetriesExhausted`] when short waits keep failing
    pub async fn acquire(
        &self,
        route: &str,
        request_id: &str,
    ) -> Result<Option<u32>, RateLimitError> {
        if !self.enabled {
            return Ok(None);
        }

        self.wait_out_global_backoff(request_id).await?;
        self.take_token(route, request_id).await.map(Some)
    }

    /// Remaining global backoff window, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn global_backoff_remaining(&self) -> Result<Option<Duration>, RateLimitError> {
        let remaining = self.store.ttl_remaining(&self.backoff_key()).await?;
        Ok(remaining.filter(|d| !d.is_zero()))
    }

    /// Sleep out a short global backoff or raise on a long one.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::TooManyRequests`] if the backoff exceeds the
    /// wait threshold.
    pub async fn wait_out_global_backoff(&self, request_id: &str) -> Result<(), RateLimitError> {
        let Some(remaining) = self.global_backoff_remaining().await? else {
            return Ok(());
        };

        if remaining < self.policy.wait_threshold() {
            info!(
                request_id,
                backoff_ms = remaining.as_millis(),
                "Global API backoff ends soon, waiting"
            );
            sleep(remaining).await;
            Ok(())
        } else {
            info!(
                request_id,
                backoff_ms = remaining.as_millis(),
                "Global API backoff ongoing"
            );
            Err(RateLimitError::TooManyRequests {
                retry_after: remaining,
            })
        }
    }

    /// Take one token from `route`'s bucket, sleeping out imminent resets.
    ///
    /// # Errors
    ///
    /// See [`SharedRateLimiter::acquire`].
    pub async fn take_token(&self, route: &str, request_id: &str) -> Result<u32, RateLimitError> {
        let key = self.bucket_key(route);
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            let remaining = self
                .store
                .decrement_or_initialize(
                    &key,
                    i64::from(self.policy.max_requests),
                    self.policy.bucket_ttl(),
                )
                .await?;
            let resets_in = self
                .store
                .ttl_remaining(&key)
                .await?
                .unwrap_or_default()
                .max(self.policy.minimum_blocking_wait());

            if remaining >= 0 {
                debug!(
                    request_id,
                    bucket = %key,
                    remaining,
                    resets_in_ms = resets_in.as_millis(),
                    "Took rate limit token"
                );
                return Ok(u32::try_from(remaining).unwrap_or(u32::MAX));
            }

            if resets_in < self.policy.wait_threshold() {
                debug!(
                    request_id,
                    bucket = %key,
                    attempt,
                    resets_in_ms = resets_in.as_millis(),
                    "Bucket empty, waiting for reset"
                );
                sleep(resets_in).await;
                continue;
            }

            debug!(
                request_id,
                bucket = %key,
                resets_in_ms = resets_in.as_millis(),
                "Bucket empty"
            );
            return Err(RateLimitError::Exhausted {
                retry_after: resets_in,
            });
        }

        warn!(request_id, bucket = %key, attempts, "Gave up waiting for rate limit");
        Err(RateLimitError::RetriesExhausted { attempts })
    }

    /// Record a server-imposed backoff for the whole fleet.
    ///
    /// Never shortens a backoff another worker already registered. Returns
    /// `true` if this call extended the window.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn register_backoff(
        &self,
        retry_after: Duration,
        request_id: &str,
    ) -> Result<bool, RateLimitError> {
        let extended = self
            .store
            .set_if_longer(&self.backoff_key(), GLOBAL_BACKOFF_VALUE, retry_after)
            .await?;
        warn!(
            request_id,
            backoff_ms = retry_after.as_millis(),
            extended,
            "Rate limit violated, backing off"
        );
        Ok(extended)
    }

    /// Log limits reported by the server. Never gates a call.
    pub fn observe_headers(&self, headers: &RateLimitHeaders, request_id: &str) {
        if headers.is_complete() && headers.is_window_start() {
            debug!(
                request_id,
                limit = headers.limit,
                reset_after_ms = headers.reset_after.map(|d| d.as_millis()),
                bucket = headers.bucket.as_deref(),
                "Rate limit reported from API"
            );
        }
        if headers.global && headers.is_limited() {
            debug!(request_id, "API reports global rate limit hit");
        }
    }
}
