//! Feature store - maps features and their toggles onto the flat key space.
//!
//! A feature is two records sharing the `(application, feature)` pair:
//! the toggle value at `toggle:<app>:<feature>` (JSON, `[bool]` for simple
//! features, `[{name, value}]` for multi features) and the metadata hash at
//! `meta:<app>:<feature>` (`description`, `categoryId`). The store offers no
//! transactions, so multi-key writes are sequenced here and partial completion is
//! reported as `Error::PartialWrite`. Every writer holds the feature's key lock
//! from its first read until its audit entry is appended.
//!
//! Every successful mutation except description updates and the "toggle already
//! present" case appends an audit entry and dispatches a hook event afterwards.

use crate::{
    context::ToggleContext,
    core::{
        application::ensure_application_exists,
        audit::{self, AuditScope},
    },
    errors::{Error, Result},
    models::{
        AuditAction, AuditEntry, Category, Feature, FeatureMetadata, FeatureSummary, HookEvent,
        Toggle, ToggleValue, User,
    },
    store::{
        KeyValueStore,
        keys::{
            APPLICATIONS_KEY, CATEGORY_ID_FIELD, DESCRIPTION_FIELD, meta_key, meta_key_for_toggle,
            meta_pattern, split_feature_key, toggle_key, toggle_pattern, validate_name,
        },
    },
};
use futures::future::{try_join, try_join_all};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

/// Hook name for feature creation and multi toggle additions.
pub const HOOK_ADD_FEATURE_TOGGLE: &str = "addFeatureToggle";
/// Hook name for toggle value changes.
pub const HOOK_UPDATE_FEATURE_TOGGLE: &str = "updateFeatureToggle";
/// Hook name for feature deletion.
pub const HOOK_DELETE_FEATURE: &str = "deleteFeature";

/// Post-commit notification for one mutation.
struct Mutation<'a> {
    application: &'a str,
    feature: &'a str,
    action: AuditAction,
    hook: &'static str,
    toggle_name: Option<String>,
    value: Option<bool>,
}

async fn notify(ctx: &ToggleContext, actor: &User, mutation: Mutation<'_>) {
    let entry = AuditEntry::now(actor.clone(), mutation.action)
        .with_toggle(mutation.toggle_name.clone(), mutation.value);
    audit::record(
        ctx.store.as_ref(),
        AuditScope::Feature {
            application: mutation.application,
            feature: mutation.feature,
        },
        entry,
    )
    .await;

    ctx.hooks.dispatch(HookEvent {
        function: mutation.hook.to_string(),
        user: actor.clone(),
        application_name: mutation.application.to_string(),
        feature_name: mutation.feature.to_string(),
        toggle_name: mutation.toggle_name,
        value: mutation.value,
    });
}

/// Parses a metadata hash; `None` when the hash is empty (feature absent).
pub(crate) fn parse_metadata(
    key: &str,
    fields: &BTreeMap<String, String>,
) -> Result<Option<FeatureMetadata>> {
    if fields.is_empty() {
        return Ok(None);
    }
    let category_id = fields
        .get(CATEGORY_ID_FIELD)
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .ok_or_else(|| Error::validation(format!("metadata at {key} has no valid categoryId")))?;
    Ok(Some(FeatureMetadata {
        description: fields.get(DESCRIPTION_FIELD).cloned().unwrap_or_default(),
        category_id,
    }))
}

fn metadata_fields(metadata: &FeatureMetadata) -> Vec<(String, String)> {
    vec![
        (
            CATEGORY_ID_FIELD.to_string(),
            metadata.category_id.to_string(),
        ),
        (DESCRIPTION_FIELD.to_string(), metadata.description.clone()),
    ]
}

/// Decodes the JSON stored at a toggle key according to the feature's kind.
pub(crate) fn decode_toggle_value(raw: &str, metadata: &FeatureMetadata) -> Result<ToggleValue> {
    if metadata.is_multi() {
        Ok(ToggleValue::Multi(serde_json::from_str(raw)?))
    } else {
        let values: Vec<bool> = serde_json::from_str(raw)?;
        Ok(ToggleValue::Simple(values.first().copied().unwrap_or(false)))
    }
}

/// Encodes a toggle value into the JSON stored at a toggle key.
pub(crate) fn encode_toggle_value(value: &ToggleValue) -> Result<String> {
    let json = match value {
        ToggleValue::Simple(value) => serde_json::to_string(&[*value])?,
        ToggleValue::Multi(toggles) => serde_json::to_string(toggles)?,
    };
    Ok(json)
}

/// Metadata of an existing feature.
pub(crate) async fn load_metadata(
    store: &dyn KeyValueStore,
    application: &str,
    feature: &str,
) -> Result<FeatureMetadata> {
    let key = meta_key(application, feature);
    let fields = store.hash_get_all(&key).await?;
    parse_metadata(&key, &fields)?
        .ok_or_else(|| Error::not_found(format!("feature {application}/{feature}")))
}

/// Current toggle list of an existing multi feature.
async fn load_multi_toggles(
    store: &dyn KeyValueStore,
    application: &str,
    feature: &str,
    metadata: &FeatureMetadata,
) -> Result<Vec<Toggle>> {
    let raw = store
        .get(&toggle_key(application, feature))
        .await?
        .ok_or_else(|| Error::not_found(format!("toggle value of {application}/{feature}")))?;
    match decode_toggle_value(&raw, metadata)? {
        ToggleValue::Multi(toggles) => Ok(toggles),
        ToggleValue::Simple(_) => Err(Error::validation(format!(
            "{application}/{feature} is not a multi toggle feature"
        ))),
    }
}

fn require_multi(
    ctx: &ToggleContext,
    application: &str,
    feature: &str,
    metadata: &FeatureMetadata,
) -> Result<Category> {
    if !metadata.is_multi() {
        return Err(Error::validation(format!(
            "{application}/{feature} is a simple feature"
        )));
    }
    ctx.categories
        .get(metadata.category_id)
        .cloned()
        .ok_or_else(|| {
            Error::validation(format!(
                "{application}/{feature} references unknown category {}",
                metadata.category_id
            ))
        })
}

/// Columns of `category` that have no entry in `toggles`, in category order.
fn missing_columns(category: &Category, toggles: &[Toggle]) -> Vec<String> {
    category
        .columns
        .iter()
        .filter(|column| !toggles.iter().any(|toggle| &toggle.name == *column))
        .cloned()
        .collect()
}

/// Reads a toggle key for listing; legacy hash encodings are skipped, not fatal.
async fn read_toggle_for_listing(store: &dyn KeyValueStore, key: &str) -> Result<Option<String>> {
    match store.get(key).await {
        Err(Error::WrongType { .. }) => {
            warn!(key, "toggle stored in legacy hash encoding; run the migration");
            Ok(None)
        }
        other => other,
    }
}

/// All categories of the registry, each filled with the application's features.
///
/// Every toggle and metadata key is read independently; the result is assembled
/// only after all reads completed. Toggle keys without metadata, or whose metadata
/// names an unknown category, are skipped with a warning.
pub async fn list_feature_categories(
    ctx: &ToggleContext,
    application: &str,
) -> Result<BTreeMap<u32, Category>> {
    let store = ctx.store.as_ref();
    let mut categories = ctx.categories.get_categories();

    let (toggle_keys, meta_keys) = try_join(
        store.keys_matching(&toggle_pattern(application)),
        store.keys_matching(&meta_pattern(application)),
    )
    .await?;
    if toggle_keys.is_empty() {
        return Ok(categories);
    }

    let (values, metas) = try_join(
        try_join_all(
            toggle_keys
                .iter()
                .map(|key| read_toggle_for_listing(store, key)),
        ),
        try_join_all(meta_keys.iter().map(|key| store.hash_get_all(key))),
    )
    .await?;

    let metadata_by_key: HashMap<&str, BTreeMap<String, String>> = meta_keys
        .iter()
        .map(String::as_str)
        .zip(metas)
        .collect();

    for (key, raw) in toggle_keys.iter().zip(values) {
        let Some(raw) = raw else { continue };
        let Some((_, feature)) = split_feature_key(key, "toggle") else {
            warn!(key = %key, "skipping malformed toggle key");
            continue;
        };
        let Some(meta_key) = meta_key_for_toggle(key) else {
            continue;
        };
        let metadata = match metadata_by_key
            .get(meta_key.as_str())
            .map(|fields| parse_metadata(&meta_key, fields))
        {
            Some(Ok(Some(metadata))) => metadata,
            Some(Err(e)) => {
                warn!(key = %key, "skipping feature with unreadable metadata: {}", e);
                continue;
            }
            _ => {
                warn!(key = %key, "skipping toggle without metadata");
                continue;
            }
        };
        let value = match decode_toggle_value(&raw, &metadata) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, "skipping undecodable toggle value: {}", e);
                continue;
            }
        };
        let Some(category) = categories.get_mut(&metadata.category_id) else {
            warn!(
                key = %key,
                category_id = metadata.category_id,
                "skipping feature of unknown category"
            );
            continue;
        };
        category.features.push(FeatureSummary {
            name: feature.to_string(),
            description: metadata.description,
            category_id: metadata.category_id,
            toggles: value.into_toggles(feature),
        });
    }

    for category in categories.values_mut() {
        category.features.sort_by(|a, b| a.name.cmp(&b.name));
    }
    debug!(
        application,
        features = toggle_keys.len(),
        "assembled feature categories"
    );
    Ok(categories)
}

/// Creates a feature switched off: `[false]` for simple features, no entries for
/// multi features.
///
/// Both records are written even if one write fails; a single failure is reported
/// as `PartialWrite` and is not rolled back.
pub async fn add_feature(
    ctx: &ToggleContext,
    actor: &User,
    application: &str,
    feature: &str,
    description: &str,
    category_id: u32,
) -> Result<()> {
    validate_name("application", application)?;
    validate_name("feature", feature)?;
    if !ctx.categories.contains(category_id) {
        return Err(Error::validation(format!("unknown category id {category_id}")));
    }

    let store = ctx.store.as_ref();
    // Held until the records exist so a concurrent application delete sweeps them.
    let _registry = ctx.locks.lock(APPLICATIONS_KEY).await;
    ensure_application_exists(store, application).await?;

    let value_key = toggle_key(application, feature);
    let metadata_key = meta_key(application, feature);
    let _guard = ctx.locks.lock(&value_key).await;

    let (existing_value, existing_meta) = futures::join!(
        store.get(&value_key),
        store.hash_get_all(&metadata_key)
    );
    let value_exists = match existing_value {
        Ok(value) => value.is_some(),
        Err(Error::WrongType { .. }) => true,
        Err(e) => return Err(e),
    };
    if value_exists || !existing_meta?.is_empty() {
        return Err(Error::validation(format!(
            "feature {application}/{feature} already exists"
        )));
    }

    let metadata = FeatureMetadata {
        description: description.to_string(),
        category_id,
    };
    let encoded = encode_toggle_value(&ToggleValue::initial(&metadata))?;
    let fields = metadata_fields(&metadata);

    let (value_written, meta_written) = futures::join!(
        store.set(&value_key, &encoded),
        store.hash_set_multiple(&metadata_key, &fields)
    );

    match (value_written, meta_written) {
        (Ok(()), Ok(())) => {}
        (Err(e), Ok(())) => {
            error!(key = %value_key, "feature created without toggle value: {}", e);
            return Err(Error::PartialWrite {
                completed: metadata_key,
                failed: value_key,
                message: e.to_string(),
            });
        }
        (Ok(()), Err(e)) => {
            error!(key = %metadata_key, "feature created without metadata: {}", e);
            return Err(Error::PartialWrite {
                completed: value_key,
                failed: metadata_key,
                message: e.to_string(),
            });
        }
        (Err(e), Err(_)) => return Err(e),
    }

    info!(application, feature, category_id, "feature created");
    notify(
        ctx,
        actor,
        Mutation {
            application,
            feature,
            action: AuditAction::Created,
            hook: HOOK_ADD_FEATURE_TOGGLE,
            toggle_name: None,
            value: Some(false),
        },
    )
    .await;
    Ok(())
}

/// Reconstructs one feature from its toggle value and metadata.
///
/// Multi features also carry the category columns that have no toggle entry yet.
pub async fn get_feature(ctx: &ToggleContext, application: &str, feature: &str) -> Result<Feature> {
    let store = ctx.store.as_ref();
    let metadata_key = meta_key(application, feature);
    let (raw, fields) = try_join(
        store.get(&toggle_key(application, feature)),
        store.hash_get_all(&metadata_key),
    )
    .await?;

    let not_found = || Error::not_found(format!("feature {application}/{feature}"));
    let raw = raw.ok_or_else(not_found)?;
    let metadata = parse_metadata(&metadata_key, &fields)?.ok_or_else(not_found)?;

    let value = decode_toggle_value(&raw, &metadata)?;
    let is_multi_toggle = metadata.is_multi();
    let toggles = value.into_toggles(feature);
    let toggle_suggestions = if is_multi_toggle {
        let category = require_multi(ctx, application, feature, &metadata)?;
        Some(missing_columns(&category, &toggles))
    } else {
        None
    };

    Ok(Feature {
        application_name: application.to_string(),
        feature_name: feature.to_string(),
        feature_description: metadata.description,
        toggles,
        is_multi_toggle,
        toggle_suggestions,
    })
}

/// Deletes the toggle value, then the metadata.
///
/// Stops at the first failing delete. `NotFound` when neither record existed.
pub async fn delete_feature(
    ctx: &ToggleContext,
    actor: &User,
    application: &str,
    feature: &str,
) -> Result<()> {
    let store = ctx.store.as_ref();
    let value_key = toggle_key(application, feature);
    let metadata_key = meta_key(application, feature);
    let _guard = ctx.locks.lock(&value_key).await;

    let value_removed = store.delete(&value_key).await?;
    let meta_removed = match store.delete(&metadata_key).await {
        Ok(removed) => removed,
        Err(e) if value_removed => {
            error!(key = %metadata_key, "feature deleted without its metadata: {}", e);
            return Err(Error::PartialWrite {
                completed: value_key,
                failed: metadata_key,
                message: e.to_string(),
            });
        }
        Err(e) => return Err(e),
    };

    if !value_removed && !meta_removed {
        return Err(Error::not_found(format!("feature {application}/{feature}")));
    }

    info!(application, feature, "feature deleted");
    notify(
        ctx,
        actor,
        Mutation {
            application,
            feature,
            action: AuditAction::Deleted,
            hook: HOOK_DELETE_FEATURE,
            toggle_name: None,
            value: None,
        },
    )
    .await;
    Ok(())
}

/// Overwrites a simple feature's value.
pub async fn update_feature_toggle(
    ctx: &ToggleContext,
    actor: &User,
    application: &str,
    feature: &str,
    value: bool,
) -> Result<()> {
    let store = ctx.store.as_ref();
    let value_key = toggle_key(application, feature);
    let _guard = ctx.locks.lock(&value_key).await;

    let metadata = load_metadata(store, application, feature).await?;
    if metadata.is_multi() {
        return Err(Error::validation(format!(
            "{application}/{feature} is a multi toggle feature; update a named toggle instead"
        )));
    }
    store
        .set(&value_key, &encode_toggle_value(&ToggleValue::Simple(value))?)
        .await?;

    info!(application, feature, value, "toggle updated");
    notify(
        ctx,
        actor,
        Mutation {
            application,
            feature,
            action: AuditAction::ToggleUpdated,
            hook: HOOK_UPDATE_FEATURE_TOGGLE,
            toggle_name: None,
            value: Some(value),
        },
    )
    .await;
    Ok(())
}

/// Adds a switched-off entry for one category column to a multi feature.
///
/// Adding an entry that already exists succeeds without writing, auditing or
/// dispatching anything.
pub async fn add_feature_toggle(
    ctx: &ToggleContext,
    actor: &User,
    application: &str,
    feature: &str,
    toggle_name: &str,
) -> Result<()> {
    let store = ctx.store.as_ref();
    let value_key = toggle_key(application, feature);
    let _guard = ctx.locks.lock(&value_key).await;

    let metadata = load_metadata(store, application, feature).await?;
    let category = require_multi(ctx, application, feature, &metadata)?;
    if !category.has_column(toggle_name) {
        return Err(Error::validation(format!(
            "{toggle_name:?} is not a column of category {}",
            category.id
        )));
    }

    let mut toggles = load_multi_toggles(store, application, feature, &metadata).await?;
    if toggles.iter().any(|toggle| toggle.name == toggle_name) {
        debug!(application, feature, toggle_name, "toggle already present");
        return Ok(());
    }
    toggles.push(Toggle::off(toggle_name));
    store
        .set(&value_key, &encode_toggle_value(&ToggleValue::Multi(toggles))?)
        .await?;

    info!(application, feature, toggle_name, "toggle added");
    notify(
        ctx,
        actor,
        Mutation {
            application,
            feature,
            action: AuditAction::ToggleAdded,
            hook: HOOK_ADD_FEATURE_TOGGLE,
            toggle_name: Some(toggle_name.to_string()),
            value: Some(false),
        },
    )
    .await;
    Ok(())
}

/// Sets the value of one named entry of a multi feature.
pub async fn update_feature_multi_toggle(
    ctx: &ToggleContext,
    actor: &User,
    application: &str,
    feature: &str,
    toggle_name: &str,
    value: bool,
) -> Result<()> {
    let store = ctx.store.as_ref();
    let value_key = toggle_key(application, feature);
    let _guard = ctx.locks.lock(&value_key).await;

    let metadata = load_metadata(store, application, feature).await?;
    require_multi(ctx, application, feature, &metadata)?;

    let mut toggles = load_multi_toggles(store, application, feature, &metadata).await?;
    let entry = toggles
        .iter_mut()
        .find(|toggle| toggle.name == toggle_name)
        .ok_or_else(|| {
            Error::not_found(format!("toggle {toggle_name} of {application}/{feature}"))
        })?;
    entry.value = value;
    store
        .set(&value_key, &encode_toggle_value(&ToggleValue::Multi(toggles))?)
        .await?;

    info!(application, feature, toggle_name, value, "toggle updated");
    notify(
        ctx,
        actor,
        Mutation {
            application,
            feature,
            action: AuditAction::ToggleUpdated,
            hook: HOOK_UPDATE_FEATURE_TOGGLE,
            toggle_name: Some(toggle_name.to_string()),
            value: Some(value),
        },
    )
    .await;
    Ok(())
}

/// Replaces a feature's description. Not audited and no hook is dispatched.
pub async fn update_feature_description(
    ctx: &ToggleContext,
    application: &str,
    feature: &str,
    description: &str,
) -> Result<()> {
    let store = ctx.store.as_ref();
    let _guard = ctx.locks.lock(&toggle_key(application, feature)).await;
    load_metadata(store, application, feature).await?;
    store
        .hash_set(&meta_key(application, feature), DESCRIPTION_FIELD, description)
        .await?;
    debug!(application, feature, "description updated");
    Ok(())
}
