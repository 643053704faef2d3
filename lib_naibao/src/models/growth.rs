use super::{BabyId, UserId};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One calendar-day snapshot. At most one per (baby, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthRecord {
    pub id: u64,
    pub baby_id: BabyId,
    pub record_date: NaiveDate,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub recorded_by: UserId,
    pub updated_at: NaiveDateTime,
}

/// Upsert payload keyed by (baby, date).
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthUpsert {
    pub baby_id: BabyId,
    pub record_date: NaiveDate,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub recorded_by: UserId,
}
