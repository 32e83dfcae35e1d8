//! Hash entity - One row per (key, field) pair.
//!
//! Feature metadata (`meta:<app>:<feature>`) is stored as a hash with the
//! `description` and `categoryId` fields.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Hash field database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "kv_hashes")]
pub struct Model {
    /// Store key the field belongs to
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Field name inside the hash
    #[sea_orm(primary_key, auto_increment = false)]
    pub field: String,
    /// Field value
    pub value: String,
}

/// Hash fields have no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
