use super::audit::snapshot;
use super::error::{ServiceError, ServiceResult};
use super::ServiceContext;
use crate::connections::StandardsStorage;
use crate::models::{StandardEntry, UserId};
use crate::standards::parse_range_data;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Import and activation of reference standard versions.
///
/// Restricted to the configured operator accounts. Imported rows stay
/// inactive until their version is activated explicitly.
#[derive(Clone)]
pub struct StandardsAdminService {
    ctx: ServiceContext,
    operators: Arc<HashSet<UserId>>,
}

impl StandardsAdminService {
    pub fn new(ctx: ServiceContext, operators: HashSet<UserId>) -> Self {
        Self {
            ctx,
            operators: Arc::new(operators),
        }
    }

    pub fn is_operator(&self, user_id: UserId) -> bool {
        self.operators.contains(&user_id)
    }

    fn require_operator(&self, user_id: UserId) -> ServiceResult<()> {
        if self.is_operator(user_id) {
            Ok(())
        } else {
            Err(ServiceError::forbidden("standards administration is restricted"))
        }
    }

    pub async fn versions(&self, user_id: UserId) -> ServiceResult<Vec<String>> {
        self.require_operator(user_id)?;
        Ok(self.ctx.store.all_versions().await?)
    }

    /// Stores a new row as inactive. The payload must parse as range data.
    pub async fn import_entry(&self, user_id: UserId, mut entry: StandardEntry) -> ServiceResult<StandardEntry> {
        self.require_operator(user_id)?;
        if entry.version.trim().is_empty() || entry.standard_type.trim().is_empty() {
            return Err(ServiceError::validation("version and standard_type are required"));
        }
        if parse_range_data(&entry.data).is_none() {
            return Err(ServiceError::validation("data is not a valid range payload"));
        }
        entry.is_active = false;
        let stored = self.ctx.store.insert_standard(entry).await?;
        self.ctx
            .audit
            .record(user_id, "create", "health_standard", Some(stored.id), None, snapshot(&stored))
            .await;
        Ok(stored)
    }

    /// Makes `version` the only active one. Returns the number of active rows.
    pub async fn activate_version(&self, user_id: UserId, version: &str) -> ServiceResult<u64> {
        self.require_operator(user_id)?;
        let version = version.trim();
        if version.is_empty() {
            return Err(ServiceError::validation("version is required"));
        }
        let known = self.ctx.store.all_versions().await?;
        if !known.iter().any(|v| v == version) {
            return Err(ServiceError::not_found(format!("standards version {} not found", version)));
        }

        let activated = self.ctx.store.activate_version(version).await?;
        info!(version, activated, user = user_id, "activated standards version");
        self.ctx
            .audit
            .record(user_id, "activate", "health_standard", None, None, snapshot(&version))
            .await;
        Ok(activated)
    }
}
