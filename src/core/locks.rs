//! Per-key async locks serializing read-modify-write sequences.
//!
//! The store has no compare-and-set, so writers inside this process queue on a
//! mutex keyed by the store key they rewrite. Writers in other processes are not
//! covered.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Table of lazily created mutexes, one per locked key.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`. Released when the guard drops.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().await;
            // Drop mutexes nobody holds or waits on.
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        trace!(key, "waiting for key lock");
        mutex.lock_owned().await
    }

    /// Number of keys with a live mutex.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.lock("toggle:a:f").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("toggle:a:f").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire the lock")
            .expect("contender task panicked");
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _first = locks.lock("toggle:a:one").await;
        let second = tokio::time::timeout(Duration::from_secs(1), locks.lock("toggle:a:two")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = KeyLocks::new();
        drop(locks.lock("k1").await);
        drop(locks.lock("k2").await);
        let _held = locks.lock("k3").await;
        assert_eq!(locks.tracked().await, 1);
    }
}
