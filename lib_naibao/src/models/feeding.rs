use super::{BabyId, FeedingId, UserId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One recorded feeding. `feeding_time` is civil wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedingRecord {
    pub id: FeedingId,
    pub baby_id: BabyId,
    pub user_id: UserId,
    /// Millilitres.
    pub amount: i32,
    pub feeding_time: NaiveDateTime,
    pub formula_brand_id: Option<u64>,
    pub formula_series_name: Option<String>,
    pub scoops: Option<f64>,
    pub created_at: NaiveDateTime,
}

/// Insert payload for [`FeedingRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeeding {
    pub baby_id: BabyId,
    pub user_id: UserId,
    pub amount: i32,
    pub feeding_time: NaiveDateTime,
    pub formula_brand_id: Option<u64>,
    pub formula_series_name: Option<String>,
    pub scoops: Option<f64>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedingUpdate {
    pub amount: Option<i32>,
    pub feeding_time: Option<NaiveDateTime>,
    pub formula_brand_id: Option<u64>,
    pub formula_series_name: Option<String>,
    pub scoops: Option<f64>,
}

/// Per-baby feeding schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedingSettings {
    pub baby_id: BabyId,
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    pub day_interval_hours: i64,
    pub night_interval_hours: i64,
    pub reminder_enabled: bool,
    pub reminder_advance_minutes: i64,
}

impl FeedingSettings {
    /// The schedule used when a baby has no stored settings.
    pub fn defaults_for(baby_id: BabyId) -> Self {
        Self {
            baby_id,
            day_start_hour: 6,
            day_end_hour: 18,
            day_interval_hours: 3,
            night_interval_hours: 5,
            reminder_enabled: true,
            reminder_advance_minutes: 15,
        }
    }
}

/// How the user entered an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    /// Accepted the recommendation unchanged.
    Direct,
    /// Used a quick-adjust control.
    Quick,
    /// Typed a value.
    Manual,
}

impl InputMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMethod::Direct => "direct",
            InputMethod::Quick => "quick",
            InputMethod::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "direct" => Some(InputMethod::Direct),
            "quick" => Some(InputMethod::Quick),
            "manual" => Some(InputMethod::Manual),
            _ => None,
        }
    }
}

/// Per (user, baby) memory of the last chosen amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: UserId,
    pub baby_id: BabyId,
    pub default_amount: Option<i32>,
    /// Signed difference between the chosen amount and the recommendation.
    pub adjustment_pattern: i32,
    pub input_method: Option<InputMethod>,
    pub updated_at: NaiveDateTime,
}
