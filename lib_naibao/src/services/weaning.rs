use super::access::AccessService;
use super::audit::snapshot;
use super::error::{ServiceError, ServiceResult};
use super::ServiceContext;
use crate::connections::WeaningPlanStorage;
use crate::core::EventAction;
use crate::models::{BabyId, NewWeaningPlan, PlanStatus, UserId, WeaningMode, WeaningPlan};
use crate::utils::CivilClock;
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::info;

pub const DEFAULT_DURATION_DAYS: i32 = 7;
pub const DURATION_DAYS: RangeInclusive<i32> = 3..=14;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePlanRequest {
    /// Only `alternate` is supported; blank means alternate.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub duration_days: i32,
    pub old_brand_id: u64,
    #[serde(default)]
    pub old_series_name: Option<String>,
    #[serde(default)]
    pub old_age_range: Option<String>,
    pub new_brand_id: u64,
    #[serde(default)]
    pub new_series_name: Option<String>,
    #[serde(default)]
    pub new_age_range: Option<String>,
    /// RFC 3339; defaults to now.
    #[serde(default)]
    pub start_at: Option<String>,
}

/// `pause`, `resume` or `end`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanStatusRequest {
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeaningPlanView {
    pub id: u64,
    pub baby_id: BabyId,
    pub created_by: UserId,
    pub mode: WeaningMode,
    pub duration_days: i32,
    pub old_brand_id: u64,
    pub old_series_name: Option<String>,
    pub old_age_range: Option<String>,
    pub new_brand_id: u64,
    pub new_series_name: Option<String>,
    pub new_age_range: Option<String>,
    pub start_at: DateTime<Tz>,
    pub paused_at: Option<DateTime<Tz>>,
    pub ended_at: Option<DateTime<Tz>>,
    pub status: PlanStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl WeaningPlanView {
    fn from_plan(plan: WeaningPlan, clock: &CivilClock) -> Self {
        Self {
            id: plan.id,
            baby_id: plan.baby_id,
            created_by: plan.created_by,
            mode: plan.mode,
            duration_days: plan.duration_days,
            old_brand_id: plan.old_brand_id,
            old_series_name: plan.old_series_name,
            old_age_range: plan.old_age_range,
            new_brand_id: plan.new_brand_id,
            new_series_name: plan.new_series_name,
            new_age_range: plan.new_age_range,
            start_at: clock.from_wall_clock(plan.start_at),
            paused_at: plan.paused_at.map(|t| clock.from_wall_clock(t)),
            ended_at: plan.ended_at.map(|t| clock.from_wall_clock(t)),
            status: plan.status,
            created_at: plan.created_at,
            updated_at: plan.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusAction {
    Pause,
    Resume,
    End,
}

impl StatusAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pause" => Some(StatusAction::Pause),
            "resume" => Some(StatusAction::Resume),
            "end" => Some(StatusAction::End),
            _ => None,
        }
    }
}

/// Formula switch plans. A baby has at most one current (active or paused)
/// plan; starting a new one ends the old.
#[derive(Clone)]
pub struct WeaningService {
    ctx: ServiceContext,
    access: AccessService,
}

impl WeaningService {
    pub fn new(ctx: ServiceContext) -> Self {
        let access = ctx.access();
        Self { ctx, access }
    }

    pub async fn current_plan(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<Option<WeaningPlanView>> {
        self.access.member_of(baby_id, user_id).await?;
        let plan = self.ctx.store.current_weaning_plan(baby_id).await?;
        Ok(plan.map(|p| WeaningPlanView::from_plan(p, &self.ctx.clock)))
    }

    /// Admins only.
    pub async fn create_plan(
        &self,
        user_id: UserId,
        baby_id: BabyId,
        request: CreatePlanRequest,
    ) -> ServiceResult<WeaningPlanView> {
        if request.old_brand_id == 0 || request.new_brand_id == 0 {
            return Err(ServiceError::validation("old_brand_id and new_brand_id are required"));
        }
        if request.old_brand_id == request.new_brand_id {
            return Err(ServiceError::validation("the new formula must differ from the old one"));
        }
        let mode = match request.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => raw.parse::<WeaningMode>().map_err(ServiceError::validation)?,
            None => WeaningMode::Alternate,
        };
        let duration_days = clamp_duration(request.duration_days);
        let now = self.ctx.clock.now();
        let start_at = match request.start_at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => self
                .ctx
                .clock
                .parse_rfc3339(raw)
                .map_err(|e| ServiceError::validation(e.to_string()))?,
            None => now,
        };
        self.access.admin_of(baby_id, user_id, "manage weaning plans").await?;

        let plan = NewWeaningPlan {
            baby_id,
            created_by: user_id,
            mode,
            duration_days,
            old_brand_id: request.old_brand_id,
            old_series_name: request.old_series_name,
            old_age_range: request.old_age_range,
            new_brand_id: request.new_brand_id,
            new_series_name: request.new_series_name,
            new_age_range: request.new_age_range,
            start_at: start_at.naive_local(),
        };
        let (ended, created) = self.ctx.store.start_weaning_plan(plan, now.naive_local()).await?;

        if let Some(ended) = ended {
            info!(baby = baby_id, plan = ended.id, "ended weaning plan replaced by a new one");
            self.ctx
                .audit
                .record(user_id, "update", "weaning_plan", Some(ended.id), None, snapshot(&ended))
                .await;
            self.ctx
                .events
                .publish(baby_id, "weaning_plan", EventAction::End, Some(ended.id))
                .await;
        }
        info!(baby = baby_id, plan = created.id, days = duration_days, "started weaning plan");
        self.ctx
            .audit
            .record(user_id, "create", "weaning_plan", Some(created.id), None, snapshot(&created))
            .await;
        self.ctx
            .events
            .publish(baby_id, "weaning_plan", EventAction::Create, Some(created.id))
            .await;
        Ok(WeaningPlanView::from_plan(created, &self.ctx.clock))
    }

    /// Pauses, resumes or ends the current plan. Pausing a paused plan or
    /// resuming an active one leaves it as is. Admins only.
    pub async fn update_status(
        &self,
        user_id: UserId,
        baby_id: BabyId,
        request: PlanStatusRequest,
    ) -> ServiceResult<WeaningPlanView> {
        let action = StatusAction::parse(&request.action)
            .ok_or_else(|| ServiceError::validation(format!("unknown action '{}'", request.action.trim())))?;
        self.access.admin_of(baby_id, user_id, "manage weaning plans").await?;

        let before = self
            .ctx
            .store
            .current_weaning_plan(baby_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("no current weaning plan"))?;
        let now = self.ctx.clock.now().naive_local();
        let mut plan = before.clone();
        match action {
            StatusAction::Pause if plan.status == PlanStatus::Active => {
                plan.status = PlanStatus::Paused;
                plan.paused_at = Some(now);
            }
            StatusAction::Resume if plan.status == PlanStatus::Paused => {
                plan.status = PlanStatus::Active;
                plan.paused_at = None;
            }
            StatusAction::End => {
                plan.status = PlanStatus::Ended;
                plan.ended_at = Some(now);
                plan.paused_at = None;
            }
            _ => {}
        }
        plan.updated_at = now;

        let plan = self
            .ctx
            .store
            .update_weaning_plan(&plan)
            .await?
            .ok_or_else(|| ServiceError::not_found("no current weaning plan"))?;
        info!(baby = baby_id, plan = plan.id, status = %plan.status, "updated weaning plan");
        self.ctx
            .audit
            .record(user_id, "update", "weaning_plan", Some(plan.id), snapshot(&before), snapshot(&plan))
            .await;
        let event = if plan.status == PlanStatus::Ended {
            EventAction::End
        } else {
            EventAction::Update
        };
        self.ctx
            .events
            .publish(baby_id, "weaning_plan", event, Some(plan.id))
            .await;
        Ok(WeaningPlanView::from_plan(plan, &self.ctx.clock))
    }
}

/// Non-positive means the default, anything else is held to 3-14 days.
fn clamp_duration(days: i32) -> i32 {
    let days = if days <= 0 { DEFAULT_DURATION_DAYS } else { days };
    days.clamp(*DURATION_DAYS.start(), *DURATION_DAYS.end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::MemoryStore;
    use crate::services::family::FamilyService;
    use crate::services::test_support::{context, sample_baby};
    use std::sync::Arc;

    fn switch(old: u64, new: u64) -> CreatePlanRequest {
        CreatePlanRequest {
            old_brand_id: old,
            new_brand_id: new,
            new_series_name: Some("启赋".to_string()),
            ..Default::default()
        }
    }

    fn status(action: &str) -> PlanStatusRequest {
        PlanStatusRequest { action: action.to_string() }
    }

    async fn next_event(listener: &mut crate::core::SessionRegistration) -> serde_json::Value {
        serde_json::from_slice(&listener.outbound.recv().await.unwrap()).unwrap()
    }

    #[test]
    fn test_duration_defaults_and_bounds() {
        assert_eq!(clamp_duration(0), 7);
        assert_eq!(clamp_duration(-3), 7);
        assert_eq!(clamp_duration(1), 3);
        assert_eq!(clamp_duration(10), 10);
        assert_eq!(clamp_duration(30), 14);
    }

    #[tokio::test]
    async fn test_create_plan_validates_input() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store);
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        let weaning = WeaningService::new(ctx);

        for bad in [
            switch(0, 2),
            switch(2, 2),
            CreatePlanRequest { mode: Some("mix".to_string()), ..switch(1, 2) },
            CreatePlanRequest { start_at: Some("tomorrow".to_string()), ..switch(1, 2) },
        ] {
            assert!(matches!(weaning.create_plan(1, baby.id, bad).await, Err(ServiceError::Validation(_))));
        }
        assert!(matches!(weaning.create_plan(2, baby.id, switch(1, 2)).await, Err(ServiceError::Forbidden(_))));
        assert!(weaning.current_plan(1, baby.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_plan_replaces_the_current_one() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, hub) = context(store);
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        let weaning = WeaningService::new(ctx);
        let mut listener = hub.register(1, baby.id).await.unwrap();

        let request = CreatePlanRequest {
            start_at: Some("2026-02-01T08:00:00+08:00".to_string()),
            ..switch(1, 2)
        };
        let first = weaning.create_plan(1, baby.id, request).await.unwrap();
        assert_eq!(first.mode, WeaningMode::Alternate);
        assert_eq!(first.duration_days, 7);
        assert_eq!(first.status, PlanStatus::Active);
        assert_eq!(first.start_at.to_rfc3339(), "2026-02-01T08:00:00+08:00");
        let event = next_event(&mut listener).await;
        assert_eq!((event["action"].as_str(), event["id"].as_u64()), (Some("create"), Some(first.id)));

        let second = weaning
            .create_plan(1, baby.id, CreatePlanRequest { duration_days: 20, ..switch(2, 3) })
            .await
            .unwrap();
        assert_eq!(second.duration_days, 14);
        let ended = next_event(&mut listener).await;
        assert_eq!((ended["action"].as_str(), ended["id"].as_u64()), (Some("end"), Some(first.id)));
        let created = next_event(&mut listener).await;
        assert_eq!(created["id"].as_u64(), Some(second.id));

        let current = weaning.current_plan(1, baby.id).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
    }

    #[tokio::test]
    async fn test_pause_resume_end() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store);
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        let weaning = WeaningService::new(ctx);

        assert!(matches!(
            weaning.update_status(1, baby.id, status("pause")).await,
            Err(ServiceError::NotFound(_))
        ));
        weaning.create_plan(1, baby.id, switch(1, 2)).await.unwrap();
        assert!(matches!(
            weaning.update_status(1, baby.id, status("stop")).await,
            Err(ServiceError::Validation(_))
        ));

        let paused = weaning.update_status(1, baby.id, status("pause")).await.unwrap();
        assert_eq!(paused.status, PlanStatus::Paused);
        let paused_at = paused.paused_at.unwrap();
        let again = weaning.update_status(1, baby.id, status("pause")).await.unwrap();
        assert_eq!(again.paused_at, Some(paused_at));

        let resumed = weaning.update_status(1, baby.id, status(" resume ")).await.unwrap();
        assert_eq!(resumed.status, PlanStatus::Active);
        assert!(resumed.paused_at.is_none());

        let ended = weaning.update_status(1, baby.id, status("end")).await.unwrap();
        assert_eq!(ended.status, PlanStatus::Ended);
        assert!(ended.ended_at.is_some());
        assert!(weaning.current_plan(1, baby.id).await.unwrap().is_none());
        assert!(matches!(
            weaning.update_status(1, baby.id, status("resume")).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
