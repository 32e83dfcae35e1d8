//! List entity - One row per list element.
//!
//! Elements are only ever pushed on the left, so a higher `id` means closer to
//! the head. Reads order by `id` descending to get head-first order.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// List element database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "kv_lists")]
pub struct Model {
    /// Insertion sequence
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Store key of the list
    pub key: String,
    /// Element value
    pub value: String,
}

/// List elements have no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
