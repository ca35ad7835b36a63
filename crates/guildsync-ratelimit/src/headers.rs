//! Rate limit header parsing.
//!
//! Values harvested here are advisory. The shared counter stays authoritative
//! because headers seen by one worker can be stale for every other worker.

use std::collections::HashMap;
use std::time::Duration;

/// Parsed rate limit information from HTTP headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// Maximum requests allowed in the bucket's window.
    pub limit: Option<u32>,

    /// Remaining requests in the current window.
    pub remaining: Option<u32>,

    /// Time until the window resets.
    pub reset_after: Option<Duration>,

    /// Opaque bucket identifier assigned by the server.
    pub bucket: Option<String>,

    /// Whether the limit reported is the global one.
    pub global: bool,

    /// `Retry-After` of a 429, in seconds on the wire.
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Parse headers from a map with lower-case keys.
    ///
    /// Malformed values are dropped field by field; parsing never fails.
    #[must_use]
    pub fn parse(headers: &HashMap<String, String>) -> Self {
        Self {
            limit: parse_header_u32(headers, "x-ratelimit-limit"),
            remaining: parse_header_u32(headers, "x-ratelimit-remaining"),
            reset_after: headers
                .get("x-ratelimit-reset-after")
                .and_then(|v| parse_seconds(v)),
            bucket: headers
                .get("x-ratelimit-bucket")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            global: headers
                .get("x-ratelimit-global")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            retry_after: headers.get("retry-after").and_then(|v| parse_seconds(v)),
        }
    }

    /// Build from `(name, value)` pairs as a response yields them.
    ///
    /// Names are lower-cased before lookup.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self::parse(&map)
    }

    /// Whether limit, remaining and reset were all reported.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.limit.is_some() && self.remaining.is_some() && self.reset_after.is_some()
    }

    /// Whether this response consumed the first request of a fresh window.
    #[must_use]
    pub fn is_window_start(&self) -> bool {
        matches!((self.limit, self.remaining), (Some(limit), Some(remaining)) if remaining.saturating_add(1) == limit)
    }

    /// Delay the headers ask for before the route is usable again.
    ///
    /// `Retry-After` wins. Otherwise an exhausted window waits for its reset.
    #[must_use]
    pub fn suggested_wait(&self) -> Option<Duration> {
        self.retry_after.or_else(|| {
            if self.remaining == Some(0) {
                self.reset_after
            } else {
                None
            }
        })
    }

    /// Check if rate limited.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.remaining == Some(0) || self.retry_after.is_some()
    }
}

/// Helper to parse a header as u32.
fn parse_header_u32(headers: &HashMap<String, String>, key: &str) -> Option<u32> {
    headers.get(key).and_then(|v| v.trim().parse().ok())
}

/// Parse fractional seconds such as `"1.25"`.
fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
