//! Per-operation deadline for any store adapter.

use super::KeyValueStore;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::{collections::BTreeMap, future::Future, time::Duration};
use tracing::warn;

/// Wraps a store so every call fails with `StoreUnavailable` once `timeout` elapses.
#[derive(Debug)]
pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: KeyValueStore> TimedStore<S> {
    pub const fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        key: &str,
        call: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                warn!(operation, key, timeout = ?self.timeout, "store operation timed out");
                Err(Error::StoreUnavailable {
                    message: format!("{operation} {key} timed out after {:?}", self.timeout),
                })
            })
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for TimedStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.bounded("GET", key, self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.bounded("SET", key, self.inner.set(key, value)).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>> {
        self.bounded("HGETALL", key, self.inner.hash_get_all(key))
            .await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.bounded("HSET", key, self.inner.hash_set(key, field, value))
            .await
    }

    async fn hash_set_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.bounded("HMSET", key, self.inner.hash_set_multiple(key, fields))
            .await
    }

    async fn list_push_left(&self, key: &str, value: &str) -> Result<usize> {
        self.bounded("LPUSH", key, self.inner.list_push_left(key, value))
            .await
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.bounded("LRANGE", key, self.inner.list_range(key, start, stop))
            .await
    }

    async fn list_remove(&self, key: &str, count: isize, value: &str) -> Result<usize> {
        self.bounded("LREM", key, self.inner.list_remove(key, count, value))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.bounded("DEL", key, self.inner.delete(key)).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.bounded("KEYS", pattern, self.inner.keys_matching(pattern))
            .await
    }
}
