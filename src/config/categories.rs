//! Category table loading from config.toml
//!
//! Categories are declared once in the configuration file and never change while
//! the process runs. A malformed table is a startup error.

use crate::{
    errors::{Error, Result},
    models::SIMPLE_CATEGORY_ID,
};
use serde::Deserialize;
use std::collections::HashSet;

/// Configuration for a single category
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CategoryConfig {
    /// Integer id referenced by feature metadata
    pub id: u32,
    /// Ordered toggle column names
    pub columns: Vec<String>,
}

/// Checks a category table for reserved or duplicate ids and malformed columns.
///
/// # Errors
/// Returns `Error::Config` if:
/// - A category uses the reserved id 0
/// - Two categories share an id
/// - A category has no columns, or repeats a column
/// - A column name is empty or contains ':'
pub fn validate_categories(categories: &[CategoryConfig]) -> Result<()> {
    let mut seen_ids = HashSet::new();
    for category in categories {
        if category.id == SIMPLE_CATEGORY_ID {
            return Err(Error::Config {
                message: format!("category id {SIMPLE_CATEGORY_ID} is reserved for simple toggles"),
            });
        }
        if !seen_ids.insert(category.id) {
            return Err(Error::Config {
                message: format!("duplicate category id {}", category.id),
            });
        }
        if category.columns.is_empty() {
            return Err(Error::Config {
                message: format!("category {} declares no columns", category.id),
            });
        }

        let mut seen_columns = HashSet::new();
        for column in &category.columns {
            if column.trim().is_empty() || column.contains(':') {
                return Err(Error::Config {
                    message: format!("category {} has invalid column {column:?}", category.id),
                });
            }
            if !seen_columns.insert(column.as_str()) {
                return Err(Error::Config {
                    message: format!("category {} repeats column {column:?}", category.id),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: u32, columns: &[&str]) -> CategoryConfig {
        CategoryConfig {
            id,
            columns: columns.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_valid_table() {
        let table = vec![category(1, &["dev", "prod"]), category(2, &["eu", "us"])];
        assert!(validate_categories(&table).is_ok());
        assert!(validate_categories(&[]).is_ok());
    }

    #[test]
    fn test_reserved_id_rejected() {
        let result = validate_categories(&[category(0, &["a"])]);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = validate_categories(&[category(3, &["a"]), category(3, &["b"])]);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_bad_columns_rejected() {
        assert!(validate_categories(&[category(1, &[])]).is_err());
        assert!(validate_categories(&[category(1, &["a", "a"])]).is_err());
        assert!(validate_categories(&[category(1, &["a:b"])]).is_err());
        assert!(validate_categories(&[category(1, &[" "])]).is_err());
    }
}
