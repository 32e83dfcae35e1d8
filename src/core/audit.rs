//! Audit log - append-only trails per application and per feature.
//!
//! Entries are serialized as JSON and pushed onto the head of the scope's list,
//! so a trail always reads newest first. Appends made on behalf of a mutation go
//! through [`record`], which logs failures instead of returning them.

use crate::{
    errors::Result,
    models::AuditEntry,
    store::{
        KeyValueStore,
        keys::{application_audit_key, feature_audit_key},
    },
};
use tracing::{error, trace, warn};

/// Which trail an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditScope<'a> {
    /// `audit:<application>`
    Application(&'a str),
    /// `audit:<application>:<feature>`
    Feature {
        application: &'a str,
        feature: &'a str,
    },
}

impl AuditScope<'_> {
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Application(application) => application_audit_key(application),
            Self::Feature {
                application,
                feature,
            } => feature_audit_key(application, feature),
        }
    }
}

/// Serializes `entry` and pushes it onto the scope's trail.
pub async fn append(
    store: &dyn KeyValueStore,
    scope: AuditScope<'_>,
    entry: &AuditEntry,
) -> Result<()> {
    let key = scope.key();
    let json = serde_json::to_string(entry)?;
    store.list_push_left(&key, &json).await?;
    trace!(key = %key, action = ?entry.action, "audit entry appended");
    Ok(())
}

/// Appends on behalf of a mutation that already succeeded; failures are only logged.
pub async fn record(store: &dyn KeyValueStore, scope: AuditScope<'_>, entry: AuditEntry) {
    if let Err(e) = append(store, scope, &entry).await {
        error!(
            key = %scope.key(),
            action = ?entry.action,
            user = %entry.user.name,
            "failed to append audit entry: {}",
            e
        );
    }
}

/// Reads the whole trail of a scope. Every call re-reads the store.
pub async fn read(store: &dyn KeyValueStore, scope: AuditScope<'_>) -> Result<AuditTrail> {
    let key = scope.key();
    let raw = store.list_range(&key, 0, -1).await?;
    Ok(AuditTrail { key, raw })
}

/// A snapshot of one trail, decoded lazily, newest entry first.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    key: String,
    raw: Vec<String>,
}

impl AuditTrail {
    /// Number of stored records, including any that fail to decode.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Decoded entries; undecodable records are skipped with a warning.
    pub fn iter(&self) -> impl Iterator<Item = AuditEntry> + '_ {
        self.raw
            .iter()
            .filter_map(|record| match serde_json::from_str::<AuditEntry>(record) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key = %self.key, "skipping unreadable audit record: {}", e);
                    None
                }
            })
    }
}

impl IntoIterator for AuditTrail {
    type Item = AuditEntry;
    type IntoIter = std::vec::IntoIter<AuditEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}
