//! Administrative surface - the operations an admin API or CLI exposes.
//!
//! Routing and session extraction live outside this crate; callers hand in the
//! session user, if any, and this layer decides who the action is attributed to.

use crate::{
    context::ToggleContext,
    core::{
        application,
        audit::{self, AuditScope},
        feature, migrate,
    },
    errors::{Error, Result},
    models::{AuditEntry, Category, Feature, User},
};
use std::collections::BTreeMap;

/// Entry point for administrative operations.
#[derive(Clone)]
pub struct AdminApi {
    context: ToggleContext,
    requires_auth: bool,
}

impl AdminApi {
    /// With `requires_auth` unset every action is attributed to `Anonymous`.
    #[must_use]
    pub const fn new(context: ToggleContext, requires_auth: bool) -> Self {
        Self {
            context,
            requires_auth,
        }
    }

    #[must_use]
    pub const fn context(&self) -> &ToggleContext {
        &self.context
    }

    /// The user an action is recorded against.
    pub fn actor(&self, session: Option<&User>) -> Result<User> {
        if !self.requires_auth {
            return Ok(User::anonymous());
        }
        session
            .cloned()
            .ok_or_else(|| Error::validation("an authenticated user is required"))
    }

    pub async fn list_applications(&self) -> Result<Vec<String>> {
        application::list_applications(self.context.store.as_ref()).await
    }

    pub async fn add_application(&self, session: Option<&User>, name: &str) -> Result<()> {
        let actor = self.actor(session)?;
        application::add_application(&self.context, &actor, name).await
    }

    pub async fn delete_application(&self, session: Option<&User>, name: &str) -> Result<()> {
        let actor = self.actor(session)?;
        application::delete_application(&self.context, &actor, name).await
    }

    pub async fn get_feature_categories(
        &self,
        application: &str,
    ) -> Result<BTreeMap<u32, Category>> {
        feature::list_feature_categories(&self.context, application).await
    }

    pub async fn get_feature(&self, application: &str, feature: &str) -> Result<Feature> {
        feature::get_feature(&self.context, application, feature).await
    }

    pub async fn add_feature(
        &self,
        session: Option<&User>,
        application: &str,
        feature: &str,
        description: &str,
        category_id: u32,
    ) -> Result<()> {
        let actor = self.actor(session)?;
        feature::add_feature(
            &self.context,
            &actor,
            application,
            feature,
            description,
            category_id,
        )
        .await
    }

    pub async fn delete_feature(
        &self,
        session: Option<&User>,
        application: &str,
        feature: &str,
    ) -> Result<()> {
        let actor = self.actor(session)?;
        feature::delete_feature(&self.context, &actor, application, feature).await
    }

    pub async fn update_toggle(
        &self,
        session: Option<&User>,
        application: &str,
        feature: &str,
        value: bool,
    ) -> Result<()> {
        let actor = self.actor(session)?;
        feature::update_feature_toggle(&self.context, &actor, application, feature, value).await
    }

    pub async fn add_multi_toggle(
        &self,
        session: Option<&User>,
        application: &str,
        feature: &str,
        toggle_name: &str,
    ) -> Result<()> {
        let actor = self.actor(session)?;
        feature::add_feature_toggle(&self.context, &actor, application, feature, toggle_name)
            .await
    }

    pub async fn update_multi_toggle(
        &self,
        session: Option<&User>,
        application: &str,
        feature: &str,
        toggle_name: &str,
        value: bool,
    ) -> Result<()> {
        let actor = self.actor(session)?;
        feature::update_feature_multi_toggle(
            &self.context,
            &actor,
            application,
            feature,
            toggle_name,
            value,
        )
        .await
    }

    /// Description edits still require a session when authentication is on, even
    /// though they are not audited.
    pub async fn update_description(
        &self,
        session: Option<&User>,
        application: &str,
        feature: &str,
        description: &str,
    ) -> Result<()> {
        self.actor(session)?;
        feature::update_feature_description(&self.context, application, feature, description)
            .await
    }

    /// Feature trail, newest entry first.
    pub async fn get_audit_trail(
        &self,
        application: &str,
        feature: &str,
    ) -> Result<Vec<AuditEntry>> {
        let trail = audit::read(
            self.context.store.as_ref(),
            AuditScope::Feature {
                application,
                feature,
            },
        )
        .await?;
        Ok(trail.into_iter().collect())
    }

    /// Application trail, newest entry first.
    pub async fn get_application_audit_trail(&self, application: &str) -> Result<Vec<AuditEntry>> {
        let trail = audit::read(
            self.context.store.as_ref(),
            AuditScope::Application(application),
        )
        .await?;
        Ok(trail.into_iter().collect())
    }

    /// Rewrites legacy hash-encoded toggles of one application.
    pub async fn migrate_application(&self, application: &str) -> Result<usize> {
        migrate::migrate_legacy_toggles(&self.context, application).await
    }
}
