use super::access::AccessService;
use super::audit::snapshot;
use super::error::{ServiceError, ServiceResult};
use super::feeding::MAX_FEEDING_AMOUNT;
use super::ServiceContext;
use crate::connections::PreferenceStorage;
use crate::core::EventAction;
use crate::models::{BabyId, InputMethod, UserId, UserPreference};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A partial edit. `default_amount` of zero or less clears the amount.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencePatch {
    #[serde(default)]
    pub default_amount: Option<i32>,
    #[serde(default)]
    pub adjustment_pattern: Option<i32>,
    /// `direct`, `quick` or `manual`. Blank keeps the stored value.
    #[serde(default)]
    pub input_method: Option<String>,
}

/// The caller's preference for one baby. Never stored rows read back with
/// defaults and no `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceView {
    pub user_id: UserId,
    pub baby_id: BabyId,
    pub default_amount: Option<i32>,
    pub adjustment_pattern: i32,
    pub input_method: Option<InputMethod>,
    pub updated_at: Option<NaiveDateTime>,
}

impl PreferenceView {
    fn blank(user_id: UserId, baby_id: BabyId) -> Self {
        Self {
            user_id,
            baby_id,
            default_amount: None,
            adjustment_pattern: 0,
            input_method: None,
            updated_at: None,
        }
    }
}

impl From<UserPreference> for PreferenceView {
    fn from(p: UserPreference) -> Self {
        Self {
            user_id: p.user_id,
            baby_id: p.baby_id,
            default_amount: p.default_amount,
            adjustment_pattern: p.adjustment_pattern,
            input_method: p.input_method,
            updated_at: Some(p.updated_at),
        }
    }
}

/// Per (user, baby) feeding input preferences.
#[derive(Clone)]
pub struct PreferenceService {
    ctx: ServiceContext,
    access: AccessService,
}

impl PreferenceService {
    pub fn new(ctx: ServiceContext) -> Self {
        let access = ctx.access();
        Self { ctx, access }
    }

    pub async fn get_preference(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<PreferenceView> {
        self.access.member_of(baby_id, user_id).await?;
        Ok(self
            .ctx
            .store
            .get_preference(user_id, baby_id)
            .await?
            .map(PreferenceView::from)
            .unwrap_or_else(|| PreferenceView::blank(user_id, baby_id)))
    }

    pub async fn update_preference(
        &self,
        user_id: UserId,
        baby_id: BabyId,
        patch: PreferencePatch,
    ) -> ServiceResult<PreferenceView> {
        if let Some(amount) = patch.default_amount.filter(|a| *a > MAX_FEEDING_AMOUNT) {
            return Err(ServiceError::validation(format!(
                "default amount {} is above {} ml",
                amount, MAX_FEEDING_AMOUNT
            )));
        }
        let method = match patch.input_method.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => Some(
                InputMethod::parse(raw)
                    .ok_or_else(|| ServiceError::validation(format!("unknown input method '{}'", raw)))?,
            ),
            None => None,
        };
        self.access.member_of(baby_id, user_id).await?;

        let now = self.ctx.clock.now().naive_local();
        let before = self.ctx.store.get_preference(user_id, baby_id).await?;
        let mut preference = before.clone().unwrap_or(UserPreference {
            user_id,
            baby_id,
            default_amount: None,
            adjustment_pattern: 0,
            input_method: None,
            updated_at: now,
        });
        if let Some(amount) = patch.default_amount {
            preference.default_amount = Some(amount).filter(|a| *a > 0);
        }
        if let Some(pattern) = patch.adjustment_pattern {
            preference.adjustment_pattern = pattern;
        }
        if method.is_some() {
            preference.input_method = method;
        }
        preference.updated_at = now;

        self.ctx.store.upsert_preference(preference.clone()).await?;
        info!(baby = baby_id, user = user_id, "saved feeding preference");

        let action = if before.is_some() { "update" } else { "create" };
        self.ctx
            .audit
            .record(
                user_id,
                action,
                "user_preference",
                None,
                before.as_ref().and_then(snapshot),
                snapshot(&preference),
            )
            .await;
        self.ctx
            .events
            .publish(baby_id, "preference", EventAction::Update, Some(user_id))
            .await;
        Ok(preference.into())
    }
}
