//! SQLite-backed key-value store using SeaORM.
//!
//! Strings, hash fields and list elements live in three tables created from the
//! entity definitions (see `config::database::create_tables`). Each operation is a
//! short statement or a local transaction; nothing spans more than one key.

use super::{KeyValueStore, glob_matcher, range_bounds, removal_indexes};
use crate::{
    entities::{
        KvHash, KvHashColumn, KvList, KvListColumn, KvString, KvStringColumn, kv_hash, kv_list,
        kv_string,
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, PaginatorTrait, QueryOrder, QuerySelect, Set, TransactionTrait,
    prelude::*, sea_query::OnConflict,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Hash,
    List,
}

/// Key-value store persisted in SQLite tables.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: DatabaseConnection,
}

impl SqliteStore {
    /// Wrap an open connection whose tables already exist.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

async fn kind_of<C: ConnectionTrait>(db: &C, key: &str) -> Result<Option<Kind>> {
    if KvString::find_by_id(key.to_string()).one(db).await?.is_some() {
        return Ok(Some(Kind::Text));
    }
    if KvHash::find()
        .filter(KvHashColumn::Key.eq(key))
        .one(db)
        .await?
        .is_some()
    {
        return Ok(Some(Kind::Hash));
    }
    if KvList::find()
        .filter(KvListColumn::Key.eq(key))
        .one(db)
        .await?
        .is_some()
    {
        return Ok(Some(Kind::List));
    }
    Ok(None)
}

/// Fail with `WrongType` when `key` exists with a kind other than `expected`.
async fn ensure_kind<C: ConnectionTrait>(db: &C, key: &str, expected: Kind) -> Result<()> {
    match kind_of(db, key).await? {
        Some(kind) if kind != expected => Err(Error::WrongType {
            key: key.to_string(),
        }),
        _ => Ok(()),
    }
}

/// List elements head-first.
async fn list_rows<C: ConnectionTrait>(db: &C, key: &str) -> Result<Vec<kv_list::Model>> {
    KvList::find()
        .filter(KvListColumn::Key.eq(key))
        .order_by_desc(KvListColumn::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(row) = KvString::find_by_id(key.to_string()).one(&self.db).await? {
            return Ok(Some(row.value));
        }
        ensure_kind(&self.db, key, Kind::Text).await?;
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        trace!(key, "SET");
        let txn = self.db.begin().await?;

        KvHash::delete_many()
            .filter(KvHashColumn::Key.eq(key))
            .exec(&txn)
            .await?;
        KvList::delete_many()
            .filter(KvListColumn::Key.eq(key))
            .exec(&txn)
            .await?;

        let row = kv_string::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
        };
        KvString::insert(row)
            .on_conflict(
                OnConflict::column(KvStringColumn::Key)
                    .update_column(KvStringColumn::Value)
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let rows = KvHash::find()
            .filter(KvHashColumn::Key.eq(key))
            .all(&self.db)
            .await?;
        if rows.is_empty() {
            ensure_kind(&self.db, key, Kind::Hash).await?;
        }
        Ok(rows.into_iter().map(|row| (row.field, row.value)).collect())
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
        let txn = self.db.begin().await?;
        ensure_kind(&txn, key, Kind::Hash).await?;

        let rows = fields.iter().map(|(field, value)| kv_hash::ActiveModel {
            key: Set(key.to_string()),
            field: Set(field.clone()),
            value: Set(value.clone()),
        });
        KvHash::insert_many(rows)
            .on_conflict(
                OnConflict::columns([KvHashColumn::Key, KvHashColumn::Field])
                    .update_column(KvHashColumn::Value)
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn list_push_left(&self, key: &str, value: &str) -> Result<usize> {
        trace!(key, "LPUSH");
        let txn = self.db.begin().await?;
        ensure_kind(&txn, key, Kind::List).await?;

        let row = kv_list::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            ..Default::default()
        };
        KvList::insert(row).exec(&txn).await?;

        let len = KvList::find()
            .filter(KvListColumn::Key.eq(key))
            .count(&txn)
            .await?;
        txn.commit().await?;

        usize::try_from(len).map_err(|e| Error::StoreUnavailable {
            message: format!("list length out of range: {e}"),
        })
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let rows = list_rows(&self.db, key).await?;
        if rows.is_empty() {
            ensure_kind(&self.db, key, Kind::List).await?;
            return Ok(Vec::new());
        }
        Ok(match range_bounds(rows.len(), start, stop) {
            Some((from, to)) => rows[from..=to].iter().map(|row| row.value.clone()).collect(),
            None => Vec::new(),
        })
    }

    async fn list_remove(&self, key: &str, count: isize, value: &str) -> Result<usize> {
        trace!(key, count, "LREM");
        let txn = self.db.begin().await?;
        let rows = list_rows(&txn, key).await?;
        if rows.is_empty() {
            ensure_kind(&txn, key, Kind::List).await?;
            return Ok(0);
        }

        let values: Vec<String> = rows.iter().map(|row| row.value.clone()).collect();
        let doomed: Vec<i64> = removal_indexes(&values, count, value)
            .into_iter()
            .map(|index| rows[index].id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        KvList::delete_many()
            .filter(KvListColumn::Id.is_in(doomed.clone()))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(doomed.len())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        trace!(key, "DEL");
        let txn = self.db.begin().await?;
        let strings = KvString::delete_many()
            .filter(KvStringColumn::Key.eq(key))
            .exec(&txn)
            .await?;
        let hashes = KvHash::delete_many()
            .filter(KvHashColumn::Key.eq(key))
            .exec(&txn)
            .await?;
        let lists = KvList::delete_many()
            .filter(KvListColumn::Key.eq(key))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        Ok(strings.rows_affected + hashes.rows_affected + lists.rows_affected > 0)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = glob_matcher(pattern)?;

        let strings: Vec<String> = KvString::find()
            .select_only()
            .column(KvStringColumn::Key)
            .into_tuple()
            .all(&self.db)
            .await?;
        let hashes: Vec<String> = KvHash::find()
            .select_only()
            .column(KvHashColumn::Key)
            .distinct()
            .into_tuple()
            .all(&self.db)
            .await?;
        let lists: Vec<String> = KvList::find()
            .select_only()
            .column(KvListColumn::Key)
            .distinct()
            .into_tuple()
            .all(&self.db)
            .await?;

        let keys: BTreeSet<String> = strings
            .into_iter()
            .chain(hashes)
            .chain(lists)
            .filter(|key| matcher.is_match(key.as_str()))
            .collect();
        Ok(keys.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::database::create_tables;
    use sea_orm::Database;

    async fn setup_store() -> Result<SqliteStore> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        Ok(SqliteStore::new(db))
    }

    #[tokio::test]
    async fn test_set_replaces_value_and_other_kinds() -> Result<()> {
        let store = setup_store().await?;

        store.hash_set("k", "field", "v").await?;
        assert!(matches!(store.get("k").await, Err(Error::WrongType { .. })));

        store.set("k", "one").await?;
        store.set("k", "two").await?;
        assert_eq!(store.get("k").await?.as_deref(), Some("two"));
        assert!(store.hash_get_all("k").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_hash_upsert() -> Result<()> {
        let store = setup_store().await?;
        store
            .hash_set_multiple(
                "meta:a:f",
                &[
                    ("description".to_string(), "old".to_string()),
                    ("categoryId".to_string(), "1".to_string()),
                ],
            )
            .await?;
        store.hash_set("meta:a:f", "description", "new").await?;

        let fields = store.hash_get_all("meta:a:f").await?;
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["description"], "new");
        assert_eq!(fields["categoryId"], "1");
        assert!(store.hash_get_all("meta:a:missing").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_order_range_and_remove() -> Result<()> {
        let store = setup_store().await?;
        for value in ["a", "b", "a", "c"] {
            store.list_push_left("applications", value).await?;
        }

        assert_eq!(
            store.list_range("applications", 0, -1).await?,
            vec!["c", "a", "b", "a"]
        );
        assert_eq!(store.list_range("applications", -2, -1).await?, vec!["b", "a"]);

        assert_eq!(store.list_remove("applications", 1, "a").await?, 1);
        assert_eq!(
            store.list_range("applications", 0, -1).await?,
            vec!["c", "b", "a"]
        );
        assert_eq!(store.list_remove("applications", 0, "zzz").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_and_keys_across_tables() -> Result<()> {
        let store = setup_store().await?;
        store.set("toggle:myapp:f", "[false]").await?;
        store.hash_set("meta:myapp:f", "description", "d").await?;
        store.list_push_left("audit:myapp:f", "{}").await?;
        store.list_push_left("audit:myapp", "{}").await?;

        assert_eq!(
            store.keys_matching("*:myapp:*").await?,
            vec!["audit:myapp:f", "meta:myapp:f", "toggle:myapp:f"]
        );

        assert!(store.delete("meta:myapp:f").await?);
        assert!(!store.delete("meta:myapp:f").await?);
        assert_eq!(
            store.keys_matching("*:myapp:*").await?,
            vec!["audit:myapp:f", "toggle:myapp:f"]
        );
        Ok(())
    }
}
