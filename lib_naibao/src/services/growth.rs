use super::access::AccessService;
use super::audit::snapshot;
use super::error::{ServiceError, ServiceResult};
use super::ServiceContext;
use crate::connections::{FeedingStorage, GrowthStorage};
use crate::core::EventAction;
use crate::feeding::age_reference_text;
use crate::models::{BabyId, GrowthRecord, GrowthUpsert, UserId};
use crate::utils::CivilClock;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

pub(crate) const MAX_WEIGHT_KG: f64 = 50.0;
pub(crate) const MAX_HEIGHT_CM: f64 = 150.0;

#[derive(Debug, Clone, Deserialize)]
pub struct GrowthInput {
    /// `YYYY-MM-DD`.
    pub record_date: NaiveDate,
    #[serde(default, alias = "weight")]
    pub weight_kg: Option<f64>,
    #[serde(default, alias = "height")]
    pub height_cm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthReferences {
    pub milk: String,
    pub weight_gain: String,
    pub height_gain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthStats {
    pub age_in_days: i64,
    pub age_in_months: f64,
    pub current_weight: Option<f64>,
    pub current_height: Option<f64>,
    /// kg per day between the earliest and the latest record.
    pub daily_weight_gain: f64,
    /// mm per day between the earliest and the latest record.
    pub daily_height_gain: f64,
    /// ml per day over the last seven days.
    pub daily_avg_milk: f64,
    pub reference: GrowthReferences,
}

#[derive(Clone)]
pub struct GrowthService {
    ctx: ServiceContext,
    access: AccessService,
}

impl GrowthService {
    pub fn new(ctx: ServiceContext) -> Self {
        let access = ctx.access();
        Self { ctx, access }
    }

    /// One record per day: values given for an existing date replace the
    /// stored ones, omitted values are kept.
    pub async fn upsert_record(
        &self,
        user_id: UserId,
        baby_id: BabyId,
        input: GrowthInput,
    ) -> ServiceResult<GrowthRecord> {
        validate_measure("weight", input.weight_kg, MAX_WEIGHT_KG)?;
        validate_measure("height", input.height_cm, MAX_HEIGHT_CM)?;
        self.access.member_of(baby_id, user_id).await?;

        let existing = self
            .ctx
            .store
            .list_growth(baby_id)
            .await?
            .into_iter()
            .find(|r| r.record_date == input.record_date);

        let upsert = GrowthUpsert {
            baby_id,
            record_date: input.record_date,
            weight_kg: input.weight_kg.or(existing.as_ref().and_then(|r| r.weight_kg)),
            height_cm: input.height_cm.or(existing.as_ref().and_then(|r| r.height_cm)),
            recorded_by: user_id,
        };
        let record = self
            .ctx
            .store
            .upsert_growth(upsert, self.ctx.clock.now().naive_local())
            .await?;
        info!(baby = baby_id, date = %record.record_date, "saved growth record");

        let action = if existing.is_some() { "update" } else { "create" };
        self.ctx
            .audit
            .record(user_id, action, "growth", Some(record.id), existing.as_ref().and_then(snapshot), snapshot(&record))
            .await;
        self.ctx
            .events
            .publish(baby_id, "growth", EventAction::Upsert, Some(record.id))
            .await;
        Ok(record)
    }

    /// Oldest first.
    pub async fn list_records(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<Vec<GrowthRecord>> {
        self.access.member_of(baby_id, user_id).await?;
        Ok(self.ctx.store.list_growth(baby_id).await?)
    }

    pub async fn growth_stats(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<GrowthStats> {
        let (baby, _) = self.access.member_of(baby_id, user_id).await?;
        let clock = &self.ctx.clock;
        let now = clock.now();
        let age = clock.age_of(baby.birth_date, &now);

        let records = self.ctx.store.list_growth(baby_id).await?;
        let (daily_weight_gain, daily_height_gain) = match (records.first(), records.last()) {
            (Some(earliest), Some(latest)) => daily_gains(earliest, latest),
            _ => (0.0, 0.0),
        };
        let current_weight = self.ctx.store.latest_weight(baby_id).await?;
        let current_height = records.iter().rev().find_map(|r| r.height_cm);

        let recent = self
            .ctx
            .store
            .feedings_between(
                baby_id,
                (now - Duration::days(7)).naive_local(),
                (now + CivilClock::future_grace()).naive_local(),
            )
            .await?;
        let total: i32 = recent.iter().map(|f| f.amount).sum();

        let standards = &self.ctx.standards;
        let milk = standards
            .milk_by_age_text(age.months)
            .await
            .unwrap_or_else(|| age_reference_text(age.months).to_string());

        Ok(GrowthStats {
            age_in_days: age.days,
            age_in_months: age.months,
            current_weight,
            current_height,
            daily_weight_gain,
            daily_height_gain,
            daily_avg_milk: f64::from(total) / 7.0,
            reference: GrowthReferences {
                milk,
                weight_gain: standards.weight_gain_text(age.months).await,
                height_gain: standards.height_gain_text(age.months).await,
            },
        })
    }
}

pub(crate) fn validate_measure(name: &str, value: Option<f64>, max: f64) -> ServiceResult<()> {
    match value {
        Some(v) if !(v > 0.0 && v <= max) => Err(ServiceError::validation(format!(
            "{} must be greater than 0 and at most {}",
            name, max
        ))),
        _ => Ok(()),
    }
}

/// Average gain per day, weight in kg and height converted from cm to mm.
/// Zero when the span is empty or a side lacks the measure.
fn daily_gains(earliest: &GrowthRecord, latest: &GrowthRecord) -> (f64, f64) {
    let days = (latest.record_date - earliest.record_date).num_days();
    if days <= 0 {
        return (0.0, 0.0);
    }
    let days = days as f64;
    let gain = |from: Option<f64>, to: Option<f64>| match (from, to) {
        (Some(a), Some(b)) if a > 0.0 && b > 0.0 => (b - a) / days,
        _ => 0.0,
    };
    (
        gain(earliest.weight_kg, latest.weight_kg),
        gain(earliest.height_cm, latest.height_cm) * 10.0,
    )
}
