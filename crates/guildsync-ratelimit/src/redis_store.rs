//! Redis store backend.
//!
//! The two counter primitives run as server-side Lua scripts so concurrent
//! workers on any host observe them atomically.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::debug;

use crate::{SharedRateStore, StoreResult};

/// KEYS[1] = counter, ARGV[1] = initial value, ARGV[2] = ttl in ms.
const DECREMENT_OR_INITIALIZE_LUA: &str = r#"
if redis.call("EXISTS", KEYS[1]) == 0 then
    redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
end
return redis.call("DECR", KEYS[1])
"#;

/// KEYS[1] = key, ARGV[1] = value, ARGV[2] = ttl in ms. Absent keys report -2.
const SET_IF_LONGER_LUA: &str = r#"
local remaining = tonumber(redis.call("PTTL", KEYS[1]))
if remaining >= tonumber(ARGV[2]) then
    return 0
end
redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
return 1
"#;

/// Shared store backed by Redis.
#[derive(Clone)]
pub struct RedisRateStore {
    connection: MultiplexedConnection,
    decrement_or_initialize: Script,
    set_if_longer: Script,
}

impl std::fmt::Debug for RedisRateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateStore").finish_non_exhaustive()
    }
}

impl RedisRateStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        debug!("Connected to Redis rate store");
        Ok(Self::from_connection(connection))
    }

    /// Wrap an existing multiplexed connection.
    #[must_use]
    pub fn from_connection(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            decrement_or_initialize: Script::new(DECREMENT_OR_INITIALIZE_LUA),
            set_if_longer: Script::new(SET_IF_LONGER_LUA),
        }
    }
}

fn as_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SharedRateStore for RedisRateStore {
    async fn decrement_or_initialize(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        let value: i64 = self
            .decrement_or_initialize
            .key(key)
            .arg(initial)
            .arg(as_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set_if_longer(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let written: i64 = self
            .set_if_longer
            .key(key)
            .arg(value)
            .arg(as_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(as_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn ttl_remaining(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.connection.clone();
        let millis: i64 = conn.pttl(key).await?;
        // -2: absent, -1: no expiry
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }
}
