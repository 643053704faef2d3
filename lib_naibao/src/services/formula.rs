use super::access::AccessService;
use super::audit::snapshot;
use super::error::{ServiceError, ServiceResult};
use super::ServiceContext;
use crate::connections::FormulaStorage;
use crate::core::EventAction;
use crate::models::{BabyId, FormulaChoice, FormulaSelection, UserId};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormulaRequest {
    pub brand_id: u64,
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default)]
    pub age_range: Option<String>,
}

#[derive(Clone)]
pub struct FormulaService {
    ctx: ServiceContext,
    access: AccessService,
}

impl FormulaService {
    pub fn new(ctx: ServiceContext) -> Self {
        let access = ctx.access();
        Self { ctx, access }
    }

    /// Records the caller's formula choice, replacing any earlier one.
    /// Admins only.
    pub async fn select_formula(
        &self,
        user_id: UserId,
        baby_id: BabyId,
        request: FormulaRequest,
    ) -> ServiceResult<FormulaSelection> {
        if request.brand_id == 0 {
            return Err(ServiceError::validation("brand_id is required"));
        }
        self.access.admin_of(baby_id, user_id, "choose the formula").await?;

        let before = self.ctx.store.get_formula_selection(baby_id, user_id).await?;
        let choice = FormulaChoice {
            baby_id,
            user_id,
            brand_id: request.brand_id,
            series_name: trimmed(request.series_name),
            age_range: trimmed(request.age_range),
        };
        let now = self.ctx.clock.now().naive_local();
        let selection = self.ctx.store.upsert_formula_selection(choice, now).await?;
        info!(baby = baby_id, user = user_id, brand = selection.brand_id, "selected formula");

        let (action, event) = match before {
            Some(_) => ("update", EventAction::Update),
            None => ("create", EventAction::Create),
        };
        self.ctx
            .audit
            .record(
                user_id,
                action,
                "formula_selection",
                Some(selection.id),
                before.as_ref().and_then(snapshot),
                snapshot(&selection),
            )
            .await;
        self.ctx
            .events
            .publish(baby_id, "formula_selection", event, Some(selection.id))
            .await;
        Ok(selection)
    }

    /// The family's current formula.
    pub async fn current_formula(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<FormulaSelection> {
        self.access.member_of(baby_id, user_id).await?;
        self.ctx
            .store
            .current_formula(baby_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("no formula selected"))
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::MemoryStore;
    use crate::services::family::FamilyService;
    use crate::services::test_support::{context, sample_baby};
    use std::sync::Arc;

    fn request(brand_id: u64, series: &str) -> FormulaRequest {
        FormulaRequest {
            brand_id,
            series_name: Some(series.to_string()),
            age_range: Some("0-6个月".to_string()),
        }
    }

    #[tokio::test]
    async fn test_select_then_reselect_formula() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, hub) = context(store);
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        let formula = FormulaService::new(ctx);
        let mut listener = hub.register(1, baby.id).await.unwrap();

        assert!(matches!(formula.current_formula(1, baby.id).await, Err(ServiceError::NotFound(_))));

        let first = formula.select_formula(1, baby.id, request(3, " 启赋 ")).await.unwrap();
        assert_eq!(first.series_name.as_deref(), Some("启赋"));
        assert!(first.is_active);
        let event: serde_json::Value = serde_json::from_slice(&listener.outbound.recv().await.unwrap()).unwrap();
        assert_eq!((event["entity"].as_str(), event["action"].as_str()), (Some("formula_selection"), Some("create")));

        let second = formula.select_formula(1, baby.id, request(5, "飞帆")).await.unwrap();
        assert_eq!(second.brand_id, 5);
        let event: serde_json::Value = serde_json::from_slice(&listener.outbound.recv().await.unwrap()).unwrap();
        assert_eq!(event["action"], "update");

        assert_eq!(formula.current_formula(1, baby.id).await.unwrap().brand_id, 5);
    }

    #[tokio::test]
    async fn test_selection_needs_a_brand_and_an_admin() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store);
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        let formula = FormulaService::new(ctx);

        assert!(matches!(
            formula.select_formula(1, baby.id, FormulaRequest::default()).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            formula.select_formula(2, baby.id, request(3, "启赋")).await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
