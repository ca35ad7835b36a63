//! In-process store backend.
//!
//! Atomic within one process only. Use it for tests and single-worker
//! deployments; fleets need [`crate::RedisRateStore`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{SharedRateStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

/// Shared store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryRateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl SharedRateStore for MemoryRateStore {
    async fn decrement_or_initialize(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> StoreResult<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: initial.to_string(),
            expires_at: Some(now + ttl),
        });

        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| StoreError::NotAnInteger { key: key.to_string() })?;
        let next = current - 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn set_if_longer(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key, now);

        let current = entries
            .get(key)
            .and_then(|e| e.remaining(now))
            .unwrap_or(Duration::ZERO);
        if current >= ttl {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key, now);
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let expires_at = Some(Instant::now() + ttl);
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn ttl_remaining(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key, now);
        Ok(entries.get(key).and_then(|e| e.remaining(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decrement_initializes_absent_key() {
        let store = MemoryRateStore::new();

        let first = store
            .decrement_or_initialize("bucket", 5, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(first, 4);

        let second = store
            .decrement_or_initialize("bucket", 5, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(second, 3);
    }

    #[tokio::test]
    async fn test_decrement_keeps_original_ttl() {
        let store = MemoryRateStore::new();
        store
            .decrement_or_initialize("bucket", 5, Duration::from_millis(200))
            .await
            .unwrap();
        store
            .decrement_or_initialize("bucket", 5, Duration::from_secs(60))
            .await
            .unwrap();

        let ttl = store.ttl_remaining("bucket").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_decrement_rejects_non_integer() {
        let store = MemoryRateStore::new();
        store
            .set("bucket", "nope", Duration::from_secs(5))
            .await
            .unwrap();

        let err = store
            .decrement_or_initialize("bucket", 5, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotAnInteger { .. }));
    }

    #[tokio::test]
    async fn test_expired_key_is_absent() {
        let store = MemoryRateStore::new();
        store
            .set("k", "v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl_remaining("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_if_longer_on_absent_key() {
        let store = MemoryRateStore::new();
        assert!(store
            .set_if_longer("backoff", "on", Duration::from_secs(1))
            .await
            .unwrap());
        assert_eq!(store.get("backoff").await.unwrap().as_deref(), Some("on"));
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let store = MemoryRateStore::new();
        store.delete("missing").await.unwrap();
    }
}
