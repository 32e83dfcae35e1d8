//! String entity - One row per key holding a plain string value.
//!
//! Toggle values (`toggle:<app>:<feature>`) are stored here as JSON text.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// String record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "kv_strings")]
pub struct Model {
    /// Store key
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Raw value
    pub value: String,
}

/// String records have no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
