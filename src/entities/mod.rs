//! Entity module - SeaORM entity definitions backing the SQLite key-value adapter.
//! Each record kind of the key-value contract (string, hash field, list element)
//! gets its own table; a key lives in at most one of them at a time.

pub mod kv_hash;
pub mod kv_list;
pub mod kv_string;

// Re-export specific types to avoid conflicts
pub use kv_hash::{Column as KvHashColumn, Entity as KvHash, Model as KvHashModel};
pub use kv_list::{Column as KvListColumn, Entity as KvList, Model as KvListModel};
pub use kv_string::{Column as KvStringColumn, Entity as KvString, Model as KvStringModel};
