//! Store connection and table creation.
//!
//! The persistent adapter keeps its records in `SQLite` through `SeaORM`. Tables are
//! generated from the entity definitions with `Schema::create_table_from_entity`, so
//! the schema always matches the Rust structs.

use crate::entities::{KvHash, KvList, KvString};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::info;

/// Resolves the database URL: `DATABASE_URL` wins over the configured value.
#[must_use]
pub fn resolve_database_url(configured: &str) -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| configured.to_string())
}

/// Opens a connection and makes sure the key-value tables exist.
pub async fn connect(url: &str) -> Result<DatabaseConnection> {
    let db = Database::connect(url).await?;
    create_tables(&db).await?;
    info!("Connected to store at {}", url);
    Ok(db)
}

/// Creates the string, hash and list tables if they are missing.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut string_table = schema.create_table_from_entity(KvString);
    let mut hash_table = schema.create_table_from_entity(KvHash);
    let mut list_table = schema.create_table_from_entity(KvList);

    string_table.if_not_exists();
    hash_table.if_not_exists();
    list_table.if_not_exists();

    db.execute(builder.build(&string_table)).await?;
    db.execute(builder.build(&hash_table)).await?;
    db.execute(builder.build(&list_table)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{KvHashModel, KvListModel, KvStringModel};
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _: Vec<KvStringModel> = KvString::find().limit(1).all(&db).await?;
        let _: Vec<KvHashModel> = KvHash::find().limit(1).all(&db).await?;
        let _: Vec<KvListModel> = KvList::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
