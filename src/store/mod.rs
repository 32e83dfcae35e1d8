//! Key-value store adapters.
//!
//! The feature store only talks to [`KeyValueStore`]: strings, hashes, left-pushed
//! lists and glob key listing, with no transactions across keys. Two adapters ship
//! with the crate, plus a wrapper bounding every call with a timeout.

pub mod keys;
pub mod memory;
pub mod sqlite;
pub mod timeout;

use crate::errors::{Error, Result};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use std::collections::BTreeMap;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use timeout::TimedStore;

/// Abstract key-value contract the toggle data model is mapped onto.
///
/// Semantics follow Redis: `set` replaces a key of any kind, hash and list
/// operations on a key of another kind fail with [`Error::WrongType`], and
/// emptied hashes or lists cease to exist.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// String value at `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace `key` with a string value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// All fields of the hash at `key`; empty when absent.
    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>>;

    /// Set one hash field.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Set several hash fields at once.
    async fn hash_set_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// Push onto the head of the list at `key`, returning the new length.
    async fn list_push_left(&self, key: &str, value: &str) -> Result<usize>;

    /// Elements `start..=stop` counted from the head; negative indexes count from the tail.
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// Remove elements equal to `value`: the first `count` from the head when
    /// positive, from the tail when negative, all of them when zero.
    async fn list_remove(&self, key: &str, count: isize, value: &str) -> Result<usize>;

    /// Remove `key` whatever it holds. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys matching a glob pattern, sorted.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Compile a Redis-style glob (`*`, `?`, `[..]`, backslash escapes).
pub fn glob_matcher(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| Error::validation(format!("invalid key pattern {pattern:?}: {e}")))
}

/// Resolve `LRANGE`-style bounds against a list of `len` elements.
///
/// Returns the inclusive index range to read, or `None` when it is empty.
#[must_use]
pub fn range_bounds(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = isize::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

/// Indexes (head-first) of the elements an `LREM key count value` removes.
#[must_use]
pub fn removal_indexes(elements: &[String], count: isize, value: &str) -> Vec<usize> {
    let matching = elements
        .iter()
        .enumerate()
        .filter(|(_, element)| *element == value)
        .map(|(i, _)| i);
    let limit = count.unsigned_abs();
    match count {
        0 => matching.collect(),
        c if c > 0 => matching.take(limit).collect(),
        _ => {
            let mut from_tail: Vec<usize> = matching.rev().take(limit).collect();
            from_tail.reverse();
            from_tail
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_range_bounds_follows_lrange() {
        assert_eq!(range_bounds(5, 0, -1), Some((0, 4)));
        assert_eq!(range_bounds(5, 1, 2), Some((1, 2)));
        assert_eq!(range_bounds(5, -2, -1), Some((3, 4)));
        assert_eq!(range_bounds(5, 0, 100), Some((0, 4)));
        assert_eq!(range_bounds(5, -100, 0), Some((0, 0)));
        assert_eq!(range_bounds(5, 3, 1), None);
        assert_eq!(range_bounds(5, 7, 9), None);
        assert_eq!(range_bounds(0, 0, -1), None);
    }

    #[test]
    fn test_removal_indexes_direction() {
        let list: Vec<String> = ["a", "b", "a", "c", "a"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(removal_indexes(&list, 0, "a"), vec![0, 2, 4]);
        assert_eq!(removal_indexes(&list, 2, "a"), vec![0, 2]);
        assert_eq!(removal_indexes(&list, -2, "a"), vec![2, 4]);
        assert!(removal_indexes(&list, 0, "z").is_empty());
    }

    #[test]
    fn test_glob_matches_across_colons() {
        let matcher = glob_matcher("*:myapp:*").unwrap();
        assert!(matcher.is_match("toggle:myapp:dark-mode"));
        assert!(matcher.is_match("audit:myapp:dark-mode"));
        assert!(!matcher.is_match("audit:myapp"));
        assert!(!matcher.is_match("toggle:otherapp:dark-mode"));
    }
}
