//! Migration of toggle values stored in the historical hash encoding.
//!
//! Older deployments kept a toggle value as a hash: `{value: "true"}` for simple
//! features and one field per column for multi features. The JSON encoding is the
//! only one the feature store reads, so those keys are rewritten in place.

use crate::{
    context::ToggleContext,
    core::feature::{encode_toggle_value, parse_metadata},
    errors::{Error, Result},
    models::{FeatureMetadata, SIMPLE_CATEGORY_ID, Toggle, ToggleValue},
    store::keys::{meta_key, split_feature_key, toggle_pattern},
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const LEGACY_VALUE_FIELD: &str = "value";

fn legacy_flag(raw: &str) -> bool {
    raw.eq_ignore_ascii_case("true")
}

/// Converts one legacy hash into the value it encodes.
fn convert_legacy(
    ctx: &ToggleContext,
    key: &str,
    fields: &BTreeMap<String, String>,
    metadata: Option<&FeatureMetadata>,
) -> ToggleValue {
    let is_multi = metadata.map_or_else(
        || !(fields.len() == 1 && fields.contains_key(LEGACY_VALUE_FIELD)),
        FeatureMetadata::is_multi,
    );
    if !is_multi {
        let value = fields
            .get(LEGACY_VALUE_FIELD)
            .is_some_and(|raw| legacy_flag(raw));
        return ToggleValue::Simple(value);
    }

    let category = metadata.and_then(|m| ctx.categories.get(m.category_id));
    let toggles = match category {
        Some(category) => {
            for field in fields.keys().filter(|f| !category.has_column(f)) {
                warn!(key, field = %field, "dropping legacy toggle that is not a category column");
            }
            category
                .columns
                .iter()
                .filter_map(|column| {
                    fields.get(column).map(|raw| Toggle {
                        name: column.clone(),
                        value: legacy_flag(raw),
                    })
                })
                .collect()
        }
        None => fields
            .iter()
            .map(|(name, raw)| Toggle {
                name: name.clone(),
                value: legacy_flag(raw),
            })
            .collect(),
    };
    ToggleValue::Multi(toggles)
}

/// Rewrites every hash-encoded toggle key of `application` into the JSON encoding.
///
/// Returns the number of keys rewritten. Keys already in the JSON encoding are left
/// alone, so running the migration twice is harmless.
pub async fn migrate_legacy_toggles(ctx: &ToggleContext, application: &str) -> Result<usize> {
    let store = ctx.store.as_ref();
    let mut migrated = 0;

    for key in store.keys_matching(&toggle_pattern(application)).await? {
        let Some((_, feature)) = split_feature_key(&key, "toggle") else {
            continue;
        };
        let _guard = ctx.locks.lock(&key).await;

        match store.get(&key).await {
            Ok(_) => {
                debug!(key = %key, "toggle already in JSON encoding");
                continue;
            }
            Err(Error::WrongType { .. }) => {}
            Err(e) => return Err(e),
        }

        let fields = store.hash_get_all(&key).await?;
        let metadata_key = meta_key(application, feature);
        let metadata = parse_metadata(&metadata_key, &store.hash_get_all(&metadata_key).await?)?;
        if metadata.is_none() {
            warn!(key = %key, "legacy toggle has no metadata; inferring its kind");
        }

        let value = convert_legacy(ctx, &key, &fields, metadata.as_ref());
        store.set(&key, &encode_toggle_value(&value)?).await?;
        migrated += 1;
        info!(
            key = %key,
            category_id = metadata.map_or(SIMPLE_CATEGORY_ID, |m| m.category_id),
            "migrated legacy toggle encoding"
        );
    }
    Ok(migrated)
}
