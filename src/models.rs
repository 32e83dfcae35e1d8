//! Domain types shared by the store mapping, the audit log and the hook dispatcher.
//!
//! Serialized field names are camelCase because the persisted audit records and the
//! outbound hook events are read by consumers outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category id reserved for simple (single boolean) features.
pub const SIMPLE_CATEGORY_ID: u32 = 0;

/// A toggle schema with the features currently filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Integer id; `0` is the built-in simple category
    pub id: u32,
    /// Ordered column names a multi feature of this category may toggle
    pub columns: Vec<String>,
    /// Features bucketed here by `list_feature_categories`
    pub features: Vec<FeatureSummary>,
}

impl Category {
    /// Whether `name` is one of this category's columns.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Descriptive and schema information for one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMetadata {
    /// Free text shown to operators
    pub description: String,
    /// Fixed at creation
    pub category_id: u32,
}

impl FeatureMetadata {
    /// Simple features hold a single boolean.
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        self.category_id != SIMPLE_CATEGORY_ID
    }
}

/// One named boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggle {
    /// Feature name for simple features, column name for multi features
    pub name: String,
    /// Current state
    pub value: bool,
}

impl Toggle {
    /// A toggle in its initial, switched-off state.
    pub fn off(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: false,
        }
    }
}

/// The decoded value stored at a feature's toggle key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleValue {
    /// `[true]` / `[false]`
    Simple(bool),
    /// `[{"name": .., "value": ..}, ..]`
    Multi(Vec<Toggle>),
}

impl ToggleValue {
    /// Initial value for a freshly created feature.
    #[must_use]
    pub const fn initial(metadata: &FeatureMetadata) -> Self {
        if metadata.is_multi() {
            Self::Multi(Vec::new())
        } else {
            Self::Simple(false)
        }
    }

    /// Toggles as exposed to callers. Simple features expose one toggle named after the feature.
    #[must_use]
    pub fn into_toggles(self, feature_name: &str) -> Vec<Toggle> {
        match self {
            Self::Simple(value) => vec![Toggle {
                name: feature_name.to_string(),
                value,
            }],
            Self::Multi(toggles) => toggles,
        }
    }
}

/// A fully reconstructed feature, as returned by `get_feature`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Owning application
    pub application_name: String,
    /// Feature name, unique inside the application
    pub feature_name: String,
    /// Operator description
    pub feature_description: String,
    /// Current toggle state
    pub toggles: Vec<Toggle>,
    /// `true` when the feature belongs to a configured category
    pub is_multi_toggle: bool,
    /// Category columns without an entry in `toggles` (multi features only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle_suggestions: Option<Vec<String>>,
}

/// Compact feature shape filed under a category bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    /// Feature name
    pub name: String,
    /// Operator description
    pub description: String,
    /// Category the feature was created with
    pub category_id: u32,
    /// Current toggle state
    pub toggles: Vec<Toggle>,
}

/// Identity attached to audit entries and hook events.
///
/// Besides `name`, whatever the session layer supplies is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Display name
    pub name: String,
    /// Extra identity fields from the session provider
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// A user carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }

    /// The identity recorded when authentication is disabled.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::named("Anonymous")
    }
}

/// What an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    /// Application or feature created
    Created,
    /// Application or feature deleted
    Deleted,
    /// A toggle's value changed
    ToggleUpdated,
    /// A multi feature gained a toggle entry
    ToggleAdded,
}

/// Immutable record of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Acting user
    pub user: User,
    /// Action taken
    pub action: AuditAction,
    /// Toggle the action touched; written as `null` when there is none
    #[serde(default)]
    pub toggle_name: Option<String>,
    /// Value written; `null` when there is none
    #[serde(default)]
    pub value: Option<bool>,
    /// When the entry was appended
    pub date_modified: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry stamped with the current time.
    #[must_use]
    pub fn now(user: User, action: AuditAction) -> Self {
        Self {
            user,
            action,
            toggle_name: None,
            value: None,
            date_modified: Utc::now(),
        }
    }

    /// Attach the toggle this entry concerns.
    #[must_use]
    pub fn with_toggle(mut self, toggle_name: Option<String>, value: Option<bool>) -> Self {
        self.toggle_name = toggle_name;
        self.value = value;
        self
    }
}

/// Post-mutation notification handed to hook handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookEvent {
    /// Name of the mutation, e.g. `updateFeatureToggle`
    #[serde(rename = "fn")]
    pub function: String,
    /// Acting user
    pub user: User,
    /// Owning application
    pub application_name: String,
    /// Affected feature
    pub feature_name: String,
    /// Affected toggle, `null` for simple features and whole-feature events
    pub toggle_name: Option<String>,
    /// New value, `null` for deletions
    pub value: Option<bool>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_hook_event_wire_shape() {
        let event = HookEvent {
            function: "updateFeatureToggle".to_string(),
            user: User::anonymous(),
            application_name: "myapp".to_string(),
            feature_name: "dark-mode".to_string(),
            toggle_name: None,
            value: Some(true),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["fn"], "updateFeatureToggle");
        assert_eq!(json["user"]["name"], "Anonymous");
        assert_eq!(json["applicationName"], "myapp");
        assert_eq!(json["featureName"], "dark-mode");
        assert!(json["toggleName"].is_null());
        assert_eq!(json["value"], true);
    }

    #[test]
    fn test_user_keeps_extra_session_fields() {
        let user: User =
            serde_json::from_str(r#"{"name":"ada","email":"ada@example.com"}"#).unwrap();
        assert_eq!(user.name, "ada");
        assert_eq!(user.extra["email"], "ada@example.com");

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["email"], "ada@example.com");
    }

    #[test]
    fn test_audit_entry_writes_absent_toggle_fields_as_null() {
        let entry = AuditEntry::now(User::anonymous(), AuditAction::Deleted);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "Deleted");
        assert_eq!(json.get("toggleName"), Some(&Value::Null));
        assert_eq!(json.get("value"), Some(&Value::Null));
        assert!(json["dateModified"].is_string());

        // Records written without the keys still decode.
        let legacy: AuditEntry = serde_json::from_str(
            r#"{"user":{"name":"ops"},"action":"Created","dateModified":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(legacy.toggle_name, None);
        assert_eq!(legacy.value, None);
    }

    #[test]
    fn test_simple_value_exposes_feature_named_toggle() {
        let toggles = ToggleValue::Simple(true).into_toggles("dark-mode");
        assert_eq!(
            toggles,
            vec![Toggle {
                name: "dark-mode".to_string(),
                value: true
            }]
        );
    }
}
