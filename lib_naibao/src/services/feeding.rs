use super::access::{is_admin, AccessService};
use super::audit::snapshot;
use super::error::{ServiceError, ServiceResult};
use super::ServiceContext;
use crate::connections::{FeedingStorage, GrowthStorage, PreferenceStorage, SettingsStorage, Store};
use crate::core::EventAction;
use crate::feeding::{
    assess_feeding, compute_next_feeding_time, compute_recommendation, DaySchedule,
    FeedingAdvisory, RecommendationInput, RecommendedAmount,
};
use crate::models::{
    Baby, BabyId, FeedingId, FeedingRecord, FeedingSettings, FeedingUpdate, InputMethod,
    NewFeeding, UserId, UserPreference,
};
use crate::utils::CivilClock;
use chrono::{DateTime, Duration, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MIN_FEEDING_AMOUNT: i32 = 10;
pub const MAX_FEEDING_AMOUNT: i32 = 300;
pub const LIST_LIMIT: usize = 100;
const MAX_ADJUSTMENT: i32 = 120;
const STATS_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateFeedingRequest {
    pub baby_id: BabyId,
    pub amount: i32,
    /// RFC 3339. Server time when absent or unparsable.
    #[serde(default)]
    pub feeding_time: Option<String>,
    #[serde(default)]
    pub formula_brand_id: Option<u64>,
    #[serde(default)]
    pub formula_series_name: Option<String>,
    #[serde(default)]
    pub scoops: Option<f64>,
    /// `direct`, `quick` or `manual`.
    #[serde(default)]
    pub input_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFeedingRequest {
    #[serde(default)]
    pub amount: Option<i32>,
    #[serde(default)]
    pub feeding_time: Option<String>,
    #[serde(default)]
    pub formula_brand_id: Option<u64>,
    #[serde(default)]
    pub formula_series_name: Option<String>,
    #[serde(default)]
    pub scoops: Option<f64>,
}

/// A feeding with its time re-attached to the civil zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedingView {
    pub id: FeedingId,
    pub baby_id: BabyId,
    pub user_id: UserId,
    pub amount: i32,
    pub feeding_time: DateTime<Tz>,
    pub formula_brand_id: Option<u64>,
    pub formula_series_name: Option<String>,
    pub scoops: Option<f64>,
    pub created_at: NaiveDateTime,
}

impl FeedingView {
    fn from_record(record: FeedingRecord, clock: &CivilClock) -> Self {
        Self {
            id: record.id,
            baby_id: record.baby_id,
            user_id: record.user_id,
            amount: record.amount,
            feeding_time: clock.from_wall_clock(record.feeding_time),
            formula_brand_id: record.formula_brand_id,
            formula_series_name: record.formula_series_name,
            scoops: record.scoops,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedingStats {
    pub today_amount: i32,
    /// Sum over the last seven days divided by seven.
    pub daily_amount: i32,
    pub remaining_times: i32,
    /// `YYYY-MM-DD HH:MM:SS` in the civil zone.
    pub next_feeding_time: String,
    pub next_feeding_timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreferenceSnapshot {
    pub default_amount: Option<i32>,
    pub adjustment_pattern: i32,
    pub input_method: Option<InputMethod>,
}

impl From<Option<&UserPreference>> for PreferenceSnapshot {
    fn from(preference: Option<&UserPreference>) -> Self {
        preference
            .map(|p| PreferenceSnapshot {
                default_amount: p.default_amount,
                adjustment_pattern: p.adjustment_pattern,
                input_method: p.input_method,
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedingStatsReport {
    pub stats: FeedingStats,
    pub recommended: RecommendedAmount,
    pub preference: PreferenceSnapshot,
    pub advisory: FeedingAdvisory,
}

/// Inclusive wall-clock bounds for listing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeedingRange {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

/// Feeding records and the statistics derived from them.
#[derive(Clone)]
pub struct FeedingService {
    ctx: ServiceContext,
    access: AccessService,
}

impl FeedingService {
    pub fn new(ctx: ServiceContext) -> Self {
        let access = ctx.access();
        Self { ctx, access }
    }

    pub async fn create_feeding(&self, user_id: UserId, request: CreateFeedingRequest) -> ServiceResult<FeedingView> {
        validate_amount(request.amount)?;
        let (baby, _) = self.access.member_of(request.baby_id, user_id).await?;

        let now = self.ctx.clock.now();
        // Computed before the write so the new record does not influence it.
        let (recommendation, _) = self.recommend(&baby, user_id, &now).await?;

        let feeding_time = self.resolve_time(request.feeding_time.as_deref(), &now);
        let record = self
            .ctx
            .store
            .insert_feeding(
                NewFeeding {
                    baby_id: baby.id,
                    user_id,
                    amount: request.amount,
                    feeding_time: feeding_time.naive_local(),
                    formula_brand_id: request.formula_brand_id,
                    formula_series_name: request.formula_series_name.filter(|s| !s.trim().is_empty()),
                    scoops: request.scoops,
                },
                now.naive_local(),
            )
            .await?;
        info!(feeding = record.id, baby = baby.id, amount = record.amount, "recorded feeding");

        self.ctx
            .audit
            .record(user_id, "create", "feeding", Some(record.id), None, snapshot(&record))
            .await;
        self.ctx
            .events
            .publish(baby.id, "feeding", EventAction::Create, Some(record.id))
            .await;

        let delta = (request.amount - recommendation.recommended).clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
        let method = request
            .input_method
            .as_deref()
            .and_then(InputMethod::parse)
            .unwrap_or(if delta == 0 { InputMethod::Direct } else { InputMethod::Quick });
        let preference = UserPreference {
            user_id,
            baby_id: baby.id,
            default_amount: Some(request.amount),
            adjustment_pattern: delta,
            input_method: Some(method),
            updated_at: now.naive_local(),
        };
        let store = Arc::clone(&self.ctx.store);
        tokio::spawn(remember_preference(store, preference));

        Ok(FeedingView::from_record(record, &self.ctx.clock))
    }

    /// Admins may edit any record of the family, members only their own.
    pub async fn update_feeding(
        &self,
        user_id: UserId,
        feeding_id: FeedingId,
        request: UpdateFeedingRequest,
    ) -> ServiceResult<FeedingView> {
        let before = self.editable(user_id, feeding_id, "edit").await?;

        let mut update = FeedingUpdate::default();
        if let Some(amount) = request.amount.filter(|a| *a > 0) {
            validate_amount(amount)?;
            update.amount = Some(amount);
        }
        if let Some(raw) = request.feeding_time.as_deref().filter(|s| !s.trim().is_empty()) {
            match self.ctx.clock.parse_rfc3339(raw) {
                Ok(parsed) => {
                    let now = self.ctx.clock.now();
                    update.feeding_time = Some(self.ctx.clock.clamp_feeding_time(parsed, now).naive_local());
                }
                Err(e) => debug!(error = %e, "ignoring unparsable feeding time"),
            }
        }
        update.formula_brand_id = request.formula_brand_id;
        update.formula_series_name = request.formula_series_name.filter(|s| !s.trim().is_empty());
        update.scoops = request.scoops;

        let after = self
            .ctx
            .store
            .update_feeding(feeding_id, update)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("feeding {} not found", feeding_id)))?;

        self.ctx
            .audit
            .record(user_id, "update", "feeding", Some(after.id), snapshot(&before), snapshot(&after))
            .await;
        self.ctx
            .events
            .publish(after.baby_id, "feeding", EventAction::Update, Some(after.id))
            .await;
        Ok(FeedingView::from_record(after, &self.ctx.clock))
    }

    pub async fn delete_feeding(&self, user_id: UserId, feeding_id: FeedingId) -> ServiceResult<()> {
        let before = self.editable(user_id, feeding_id, "delete").await?;
        if !self.ctx.store.delete_feeding(feeding_id).await? {
            return Err(ServiceError::not_found(format!("feeding {} not found", feeding_id)));
        }
        self.ctx
            .audit
            .record(user_id, "delete", "feeding", Some(before.id), snapshot(&before), None)
            .await;
        self.ctx
            .events
            .publish(before.baby_id, "feeding", EventAction::Delete, Some(before.id))
            .await;
        Ok(())
    }

    /// Newest first, at most [`LIST_LIMIT`] rows.
    pub async fn list_feedings(
        &self,
        user_id: UserId,
        baby_id: BabyId,
        range: FeedingRange,
    ) -> ServiceResult<Vec<FeedingView>> {
        self.access.member_of(baby_id, user_id).await?;
        let rows = self
            .ctx
            .store
            .list_feedings(baby_id, range.from, range.to, LIST_LIMIT)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| FeedingView::from_record(r, &self.ctx.clock))
            .collect())
    }

    pub async fn feeding_stats(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<FeedingStatsReport> {
        let (baby, _) = self.access.member_of(baby_id, user_id).await?;
        let clock = &self.ctx.clock;
        let now = clock.now();
        let upper = today_upper_bound(clock, &now);
        let start_of_day = clock.start_of_day(&now);
        let period_start = start_of_day - Duration::days(STATS_WINDOW_DAYS - 1);

        let recent = self
            .ctx
            .store
            .feedings_between(baby.id, period_start.naive_local(), upper.naive_local())
            .await?;
        let today_start = start_of_day.naive_local();
        let today_amount: i32 = recent
            .iter()
            .filter(|f| f.feeding_time >= today_start)
            .map(|f| f.amount)
            .sum();
        let week_total: i32 = recent.iter().map(|f| f.amount).sum();

        let (recommended, preference) = self.recommend(&baby, user_id, &now).await?;
        let schedule = self.schedule_for(baby.id).await?;
        let last = last_feeding_for(self.ctx.store.as_ref(), clock, baby.id, &now).await?;
        let next = compute_next_feeding_time(&now, last.as_ref(), &schedule);
        let advisory = assess_feeding(&now, last.as_ref(), &schedule, &recommended);

        Ok(FeedingStatsReport {
            stats: FeedingStats {
                today_amount,
                daily_amount: week_total / STATS_WINDOW_DAYS as i32,
                remaining_times: recommended.remaining_times,
                next_feeding_time: next.format("%Y-%m-%d %H:%M:%S").to_string(),
                next_feeding_timestamp: next.timestamp(),
            },
            recommended,
            preference: PreferenceSnapshot::from(preference.as_ref()),
            advisory,
        })
    }

    /// The engine's recommendation for `user` right now, with the
    /// preference it was based on.
    async fn recommend(
        &self,
        baby: &Baby,
        user_id: UserId,
        now: &DateTime<Tz>,
    ) -> ServiceResult<(RecommendedAmount, Option<UserPreference>)> {
        let clock = &self.ctx.clock;
        let store = &self.ctx.store;

        let schedule = self.schedule_for(baby.id).await?;
        let today = store
            .feedings_between(
                baby.id,
                clock.start_of_day(now).naive_local(),
                today_upper_bound(clock, now).naive_local(),
            )
            .await?;
        let amounts: Vec<i32> = today.iter().map(|f| f.amount).collect();
        let preference = store.get_preference(user_id, baby.id).await?;
        let weight_kg = store.latest_weight(baby.id).await?;
        let age = clock.age_of(baby.birth_date, now);

        let input = RecommendationInput {
            weight_kg,
            age_months: age.months,
            todays_amounts: &amounts,
            preferred_amount: preference.as_ref().and_then(|p| p.default_amount),
            now: *now,
            schedule,
            coefficient: self.ctx.standards.milk_by_weight_coefficient().await,
            age_reference: self.ctx.standards.milk_by_age_text(age.months).await,
        };
        Ok((compute_recommendation(&input), preference))
    }

    async fn schedule_for(&self, baby_id: BabyId) -> ServiceResult<DaySchedule> {
        let settings = self
            .ctx
            .store
            .get_settings(baby_id)
            .await?
            .unwrap_or_else(|| FeedingSettings::defaults_for(baby_id));
        Ok(DaySchedule::from(&settings))
    }

    /// Loads a record the caller may change.
    async fn editable(&self, user_id: UserId, feeding_id: FeedingId, verb: &str) -> ServiceResult<FeedingRecord> {
        let record = self
            .ctx
            .store
            .get_feeding(feeding_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("feeding {} not found", feeding_id)))?;
        let (_, member) = self.access.member_of(record.baby_id, user_id).await?;
        if !is_admin(&member) && record.user_id != user_id {
            return Err(ServiceError::forbidden(format!("members may only {} their own records", verb)));
        }
        Ok(record)
    }

    fn resolve_time(&self, raw: Option<&str>, now: &DateTime<Tz>) -> DateTime<Tz> {
        let clock = &self.ctx.clock;
        let requested = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => clock.parse_rfc3339(raw).unwrap_or_else(|e| {
                debug!(error = %e, "falling back to server time");
                *now
            }),
            None => *now,
        };
        clock.clamp_feeding_time(requested, *now)
    }
}

fn validate_amount(amount: i32) -> ServiceResult<()> {
    if !(MIN_FEEDING_AMOUNT..=MAX_FEEDING_AMOUNT).contains(&amount) {
        return Err(ServiceError::validation(format!(
            "amount must be between {} and {} ml",
            MIN_FEEDING_AMOUNT, MAX_FEEDING_AMOUNT
        )));
    }
    Ok(())
}

/// Today's records end at midnight, or at now plus the skew tolerance if
/// that comes first.
fn today_upper_bound(clock: &CivilClock, now: &DateTime<Tz>) -> DateTime<Tz> {
    let end = clock.end_of_day(now);
    let grace = *now + CivilClock::future_grace();
    if grace < end {
        grace
    } else {
        end
    }
}

/// Time of the newest feeding that is not in the future.
async fn last_feeding_for(
    store: &dyn Store,
    clock: &CivilClock,
    baby_id: BabyId,
    now: &DateTime<Tz>,
) -> ServiceResult<Option<DateTime<Tz>>> {
    let upper = *now + CivilClock::future_grace();
    Ok(store
        .latest_feeding_at_or_before(baby_id, upper.naive_local())
        .await?
        .map(|f| clock.from_wall_clock(f.feeding_time)))
}

/// Next due time from the newest feeding that is not in the future.
pub(crate) async fn next_feeding_for(
    store: &dyn Store,
    clock: &CivilClock,
    baby_id: BabyId,
    now: &DateTime<Tz>,
    schedule: &DaySchedule,
) -> ServiceResult<DateTime<Tz>> {
    let last = last_feeding_for(store, clock, baby_id, now).await?;
    Ok(compute_next_feeding_time(now, last.as_ref(), schedule))
}

async fn remember_preference(store: Arc<dyn Store>, preference: UserPreference) {
    let (user, baby) = (preference.user_id, preference.baby_id);
    match store.upsert_preference(preference).await {
        Ok(()) => debug!(user, baby, "remembered feeding preference"),
        Err(e) => warn!(error = %e, user, baby, "failed to remember feeding preference"),
    }
}
