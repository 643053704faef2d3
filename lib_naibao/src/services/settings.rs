use super::access::AccessService;
use super::audit::snapshot;
use super::error::{ServiceError, ServiceResult};
use super::feeding::next_feeding_for;
use super::ServiceContext;
use crate::connections::SettingsStorage;
use crate::core::EventAction;
use crate::feeding::DaySchedule;
use crate::models::{BabyId, FeedingSettings, UserId};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, rename = "day_interval")]
    pub day_interval_hours: Option<i64>,
    #[serde(default, rename = "night_interval")]
    pub night_interval_hours: Option<i64>,
    #[serde(default)]
    pub reminder_enabled: Option<bool>,
    #[serde(default, rename = "advance_minutes")]
    pub reminder_advance_minutes: Option<i64>,
    #[serde(default)]
    pub day_start_hour: Option<u32>,
    #[serde(default)]
    pub day_end_hour: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextFeeding {
    /// `YYYY-MM-DD HH:MM:SS` in the civil zone.
    pub next_feeding_time: String,
    pub next_feeding_timestamp: i64,
}

fn check<T: PartialOrd + std::fmt::Display>(field: &str, value: Option<T>, range: RangeInclusive<T>) -> ServiceResult<()> {
    match value {
        Some(v) if !range.contains(&v) => Err(ServiceError::validation(format!(
            "{} must be between {} and {}",
            field,
            range.start(),
            range.end()
        ))),
        _ => Ok(()),
    }
}

impl SettingsPatch {
    fn validate(&self) -> ServiceResult<()> {
        check("day_interval", self.day_interval_hours, 1..=5)?;
        check("night_interval", self.night_interval_hours, 3..=7)?;
        check("advance_minutes", self.reminder_advance_minutes, 5..=30)?;
        check("day_start_hour", self.day_start_hour, 0..=23)?;
        check("day_end_hour", self.day_end_hour, 1..=24)
    }

    fn apply(&self, settings: &mut FeedingSettings) {
        if let Some(v) = self.day_interval_hours {
            settings.day_interval_hours = v;
        }
        if let Some(v) = self.night_interval_hours {
            settings.night_interval_hours = v;
        }
        if let Some(v) = self.reminder_enabled {
            settings.reminder_enabled = v;
        }
        if let Some(v) = self.reminder_advance_minutes {
            settings.reminder_advance_minutes = v;
        }
        if let Some(v) = self.day_start_hour {
            settings.day_start_hour = v;
        }
        if let Some(v) = self.day_end_hour {
            settings.day_end_hour = v;
        }
    }
}

/// Per-baby feeding interval settings.
#[derive(Clone)]
pub struct SettingsService {
    ctx: ServiceContext,
    access: AccessService,
}

impl SettingsService {
    pub fn new(ctx: ServiceContext) -> Self {
        let access = ctx.access();
        Self { ctx, access }
    }

    /// Stored settings, or the defaults when none were saved.
    pub async fn get(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<FeedingSettings> {
        self.access.member_of(baby_id, user_id).await?;
        self.current(baby_id).await
    }

    /// Admins only.
    pub async fn update(&self, user_id: UserId, baby_id: BabyId, patch: SettingsPatch) -> ServiceResult<FeedingSettings> {
        patch.validate()?;
        self.access.admin_of(baby_id, user_id, "change feeding settings").await?;

        let stored = self.ctx.store.get_settings(baby_id).await?;
        let mut settings = stored.clone().unwrap_or_else(|| FeedingSettings::defaults_for(baby_id));
        patch.apply(&mut settings);
        if settings.day_start_hour >= settings.day_end_hour {
            return Err(ServiceError::validation("day_start_hour must be before day_end_hour"));
        }

        let saved = self.ctx.store.upsert_settings(settings).await?;
        let action = if stored.is_some() { "update" } else { "create" };
        self.ctx
            .audit
            .record(user_id, action, "feeding_settings", Some(baby_id), stored.as_ref().and_then(snapshot), snapshot(&saved))
            .await;
        self.ctx
            .events
            .publish(baby_id, "feeding_settings", EventAction::Update, None)
            .await;
        Ok(saved)
    }

    /// When the next feeding is due under the current settings.
    pub async fn next_feeding_time(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<NextFeeding> {
        self.access.member_of(baby_id, user_id).await?;
        let schedule = DaySchedule::from(&self.current(baby_id).await?);
        let now = self.ctx.clock.now();
        let next = next_feeding_for(self.ctx.store.as_ref(), &self.ctx.clock, baby_id, &now, &schedule).await?;
        Ok(NextFeeding {
            next_feeding_time: next.format("%Y-%m-%d %H:%M:%S").to_string(),
            next_feeding_timestamp: next.timestamp(),
        })
    }

    async fn current(&self, baby_id: BabyId) -> ServiceResult<FeedingSettings> {
        Ok(self
            .ctx
            .store
            .get_settings(baby_id)
            .await?
            .unwrap_or_else(|| FeedingSettings::defaults_for(baby_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::{MemoryStore, MembershipStorage};
    use crate::models::{Membership, Role};
    use crate::services::family::FamilyService;
    use crate::services::test_support::{context, sample_baby};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_defaults_until_saved() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store);
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        let settings = SettingsService::new(ctx);

        assert_eq!(settings.get(1, baby.id).await.unwrap(), FeedingSettings::defaults_for(baby.id));

        let patch = SettingsPatch {
            day_interval_hours: Some(2),
            day_end_hour: Some(20),
            ..Default::default()
        };
        let saved = settings.update(1, baby.id, patch).await.unwrap();
        assert_eq!(saved.day_interval_hours, 2);
        assert_eq!(saved.day_end_hour, 20);
        assert_eq!(saved.night_interval_hours, 5);
        assert_eq!(settings.get(1, baby.id).await.unwrap(), saved);
    }

    #[tokio::test]
    async fn test_out_of_range_values_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store);
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        let settings = SettingsService::new(ctx);

        let cases = [
            SettingsPatch { day_interval_hours: Some(6), ..Default::default() },
            SettingsPatch { night_interval_hours: Some(2), ..Default::default() },
            SettingsPatch { reminder_advance_minutes: Some(31), ..Default::default() },
            SettingsPatch { day_start_hour: Some(24), ..Default::default() },
            SettingsPatch { day_end_hour: Some(0), ..Default::default() },
            SettingsPatch { day_start_hour: Some(18), day_end_hour: Some(18), ..Default::default() },
        ];
        for patch in cases {
            assert!(matches!(settings.update(1, baby.id, patch).await, Err(ServiceError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_only_admins_update() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store.clone());
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        store
            .insert_membership_if_absent(Membership {
                baby_id: baby.id,
                user_id: 2,
                role: Role::Member,
                joined_at: ctx.clock.now().naive_local(),
            })
            .await
            .unwrap();
        let settings = SettingsService::new(ctx);

        assert!(settings.get(2, baby.id).await.is_ok());
        assert!(matches!(
            settings.update(2, baby.id, SettingsPatch::default()).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_next_feeding_without_history_is_one_interval_away() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store);
        let clock = ctx.clock;
        let baby = FamilyService::new(ctx.clone()).create_baby(1, sample_baby()).await.unwrap();
        let settings = SettingsService::new(ctx);

        let before = clock.now().timestamp();
        let next = settings.next_feeding_time(1, baby.id).await.unwrap();
        let delta = next.next_feeding_timestamp - before;
        assert!(delta >= 3 * 3600 - 1 && delta <= 5 * 3600 + 1, "delta {}", delta);
    }
}
