//! Category registry - the fixed toggle schemas loaded at startup.

use crate::{
    config::categories::{CategoryConfig, validate_categories},
    errors::Result,
    models::{Category, SIMPLE_CATEGORY_ID},
};
use std::collections::BTreeMap;
use tracing::info;

/// Read-only table of categories keyed by id, including the built-in simple category.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: BTreeMap<u32, Category>,
}

impl CategoryRegistry {
    /// Builds the registry from the configured table.
    ///
    /// # Errors
    /// Returns `Error::Config` when the table is malformed; callers treat this as fatal.
    pub fn from_config(configured: &[CategoryConfig]) -> Result<Self> {
        validate_categories(configured)?;

        let mut categories = BTreeMap::new();
        categories.insert(
            SIMPLE_CATEGORY_ID,
            Category {
                id: SIMPLE_CATEGORY_ID,
                columns: Vec::new(),
                features: Vec::new(),
            },
        );
        for category in configured {
            categories.insert(
                category.id,
                Category {
                    id: category.id,
                    columns: category.columns.clone(),
                    features: Vec::new(),
                },
            );
        }
        info!("Loaded {} configured categories", configured.len());
        Ok(Self { categories })
    }

    /// A fresh copy of the table with empty feature buckets, safe to fill in.
    #[must_use]
    pub fn get_categories(&self) -> BTreeMap<u32, Category> {
        self.categories.clone()
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Category> {
        self.categories.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.categories.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::test_utils::sample_categories;

    #[test]
    fn test_simple_category_always_present() -> Result<()> {
        let registry = CategoryRegistry::from_config(&[])?;
        let categories = registry.get_categories();
        assert_eq!(categories.len(), 1);
        assert!(categories[&SIMPLE_CATEGORY_ID].columns.is_empty());
        Ok(())
    }

    #[test]
    fn test_configured_categories_keep_column_order() -> Result<()> {
        let registry = CategoryRegistry::from_config(&sample_categories())?;
        assert!(registry.contains(1));
        assert!(registry.contains(2));
        assert!(!registry.contains(3));
        assert_eq!(
            registry.get(1).map(|c| c.columns.clone()),
            Some(vec!["dev".to_string(), "qa".to_string(), "prod".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_copies_are_independent() -> Result<()> {
        let registry = CategoryRegistry::from_config(&sample_categories())?;
        let mut first = registry.get_categories();
        if let Some(category) = first.get_mut(&1) {
            category.columns.clear();
        }
        assert_eq!(registry.get_categories()[&1].columns.len(), 3);
        Ok(())
    }

    #[test]
    fn test_malformed_table_rejected() {
        let table = vec![CategoryConfig {
            id: SIMPLE_CATEGORY_ID,
            columns: vec!["x".to_string()],
        }];
        assert!(matches!(
            CategoryRegistry::from_config(&table),
            Err(Error::Config { .. })
        ));
    }
}
