//! Application registry - the ordered list of application names.
//!
//! Names live in the `applications` list (newest first). Deleting an application
//! removes it from the list and then sweeps every `*:<name>:*` key; the two steps
//! are not atomic, so a failure in between leaves orphaned keys that a repeated
//! delete cleans up.
//!
//! The registry lock (`applications`) is held by application changes and by
//! feature creation; the sweep also takes each feature's key lock, so no feature
//! writer can recreate a key behind it.

use crate::{
    context::ToggleContext,
    core::audit::{self, AuditScope},
    errors::{Error, Result},
    models::{AuditAction, AuditEntry, User},
    store::{
        KeyValueStore,
        keys::{APPLICATIONS_KEY, application_keys_pattern, toggle_key, validate_name},
    },
};
use tracing::{error, info, warn};

/// Registered application names, most recently added first.
pub async fn list_applications(store: &dyn KeyValueStore) -> Result<Vec<String>> {
    store.list_range(APPLICATIONS_KEY, 0, -1).await
}

/// Fails with `NotFound` unless `name` is registered.
pub(crate) async fn ensure_application_exists(store: &dyn KeyValueStore, name: &str) -> Result<()> {
    if list_applications(store).await?.iter().any(|a| a == name) {
        Ok(())
    } else {
        Err(Error::not_found(format!("application {name}")))
    }
}

/// Registers a new application and audits its creation. No hook is dispatched.
pub async fn add_application(ctx: &ToggleContext, actor: &User, name: &str) -> Result<()> {
    validate_name("application", name)?;
    let store = ctx.store.as_ref();
    let guard = ctx.locks.lock(APPLICATIONS_KEY).await;

    if list_applications(store).await?.iter().any(|a| a == name) {
        return Err(Error::validation(format!(
            "application {name} already exists"
        )));
    }
    store.list_push_left(APPLICATIONS_KEY, name).await?;
    drop(guard);

    info!(application = name, "application created");
    audit::record(
        store,
        AuditScope::Application(name),
        AuditEntry::now(actor.clone(), AuditAction::Created),
    )
    .await;
    Ok(())
}

/// Unregisters an application and deletes all of its feature, metadata and
/// feature audit keys. The application-level trail `audit:<name>` is kept.
///
/// `NotFound` when the name was not registered and no keys remained.
pub async fn delete_application(ctx: &ToggleContext, actor: &User, name: &str) -> Result<()> {
    let store = ctx.store.as_ref();
    let guard = ctx.locks.lock(APPLICATIONS_KEY).await;

    let unlisted = store.list_remove(APPLICATIONS_KEY, 0, name).await?;
    let partial = |failed: String, completed: String, e: &Error| {
        error!(application = name, failed = %failed, "application only partly deleted: {}", e);
        Error::PartialWrite {
            completed,
            failed,
            message: e.to_string(),
        }
    };

    let keys = match store.keys_matching(&application_keys_pattern(name)).await {
        Ok(keys) => keys,
        Err(e) if unlisted > 0 => {
            return Err(partial(
                application_keys_pattern(name),
                APPLICATIONS_KEY.to_string(),
                &e,
            ));
        }
        Err(e) => return Err(e),
    };
    if unlisted == 0 && keys.is_empty() {
        return Err(Error::not_found(format!("application {name}")));
    }
    if unlisted == 0 {
        warn!(application = name, keys = keys.len(), "sweeping orphaned keys of unregistered application");
    }

    for (deleted, key) in keys.iter().enumerate() {
        // Waits out any feature writer still working on this key.
        let _feature_guard = match key.splitn(3, ':').nth(2) {
            Some(feature) => Some(ctx.locks.lock(&toggle_key(name, feature)).await),
            None => None,
        };
        if let Err(e) = store.delete(key).await {
            if unlisted == 0 && deleted == 0 {
                return Err(e);
            }
            return Err(partial(
                key.clone(),
                format!("{APPLICATIONS_KEY} entry and {deleted} of {} keys", keys.len()),
                &e,
            ));
        }
    }
    drop(guard);

    info!(application = name, keys = keys.len(), "application deleted");
    audit::record(
        store,
        AuditScope::Application(name),
        AuditEntry::now(actor.clone(), AuditAction::Deleted),
    )
    .await;
    Ok(())
}
