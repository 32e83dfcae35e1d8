//! Shared handles every core operation runs against.

use crate::{
    core::{category::CategoryRegistry, hooks::HookDispatcher, locks::KeyLocks},
    store::KeyValueStore,
};
use std::sync::Arc;

/// Store, category table, hook dispatcher and key locks of one process.
///
/// Cheap to clone; clones share the same lock table.
#[derive(Clone)]
pub struct ToggleContext {
    /// Process-wide store connection
    pub store: Arc<dyn KeyValueStore>,
    /// Read-only category table
    pub categories: Arc<CategoryRegistry>,
    /// Post-mutation hook handlers
    pub hooks: HookDispatcher,
    /// Per-key locks for read-modify-write sequences
    pub locks: Arc<KeyLocks>,
}

impl ToggleContext {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        categories: CategoryRegistry,
        hooks: HookDispatcher,
    ) -> Self {
        Self {
            store,
            categories: Arc::new(categories),
            hooks,
            locks: Arc::new(KeyLocks::new()),
        }
    }
}
