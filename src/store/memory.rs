//! In-process key-value store.
//!
//! Holds typed values behind a tokio `RwLock`. Used by tests and for running the
//! toggle service without a database.

use super::{KeyValueStore, glob_matcher, range_bounds, removal_indexes};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::trace;

#[derive(Debug, Clone)]
enum Entry {
    Text(String),
    Hash(BTreeMap<String, String>),
    List(VecDeque<String>),
}

/// Key-value store living entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn wrong_type(key: &str) -> Error {
    Error::WrongType {
        key: key.to_string(),
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entries.read().await.get(key) {
            None => Ok(None),
            Some(Entry::Text(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        trace!(key, "SET");
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry::Text(value.to_string()));
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>> {
        match self.entries.read().await.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Entry::Hash(fields)) => Ok(fields.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hash_set_multiple(key, &[(field.to_string(), value.to_string())])
            .await
    }

    async fn hash_set_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        trace!(key, fields = fields.len(), "HSET");
        if fields.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(BTreeMap::new()));
        let Entry::Hash(hash) = entry else {
            return Err(wrong_type(key));
        };
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn list_push_left(&self, key: &str, value: &str) -> Result<usize> {
        trace!(key, "LPUSH");
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        let Entry::List(list) = entry else {
            return Err(wrong_type(key));
        };
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let list = match entries.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry::List(list)) => list,
            Some(_) => return Err(wrong_type(key)),
        };
        Ok(match range_bounds(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn list_remove(&self, key: &str, count: isize, value: &str) -> Result<usize> {
        trace!(key, count, "LREM");
        let mut entries = self.entries.write().await;
        let list = match entries.get_mut(key) {
            None => return Ok(0),
            Some(Entry::List(list)) => list,
            Some(_) => return Err(wrong_type(key)),
        };
        let snapshot: Vec<String> = list.iter().cloned().collect();
        let doomed = removal_indexes(&snapshot, count, value);
        for index in doomed.iter().rev() {
            list.remove(*index);
        }
        if list.is_empty() {
            entries.remove(key);
        }
        Ok(doomed.len())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        trace!(key, "DEL");
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = glob_matcher(pattern)?;
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|key| matcher.is_match(key.as_str()))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
