use super::{BabyId, UserId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The formula chosen for a baby. One row per (baby, choosing user); the
/// newest active row is the baby's current formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaSelection {
    pub id: u64,
    pub baby_id: BabyId,
    pub user_id: UserId,
    pub brand_id: u64,
    pub series_name: Option<String>,
    pub age_range: Option<String>,
    pub selected_at: NaiveDateTime,
    pub is_active: bool,
}

/// Upsert payload for [`FormulaSelection`], keyed by (baby, user).
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaChoice {
    pub baby_id: BabyId,
    pub user_id: UserId,
    pub brand_id: u64,
    pub series_name: Option<String>,
    pub age_range: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Paused,
    Ended,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Paused => "paused",
            PlanStatus::Ended => "ended",
        }
    }

    /// Active and paused plans are both current.
    pub fn is_current(&self) -> bool {
        !matches!(self, PlanStatus::Ended)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(PlanStatus::Active),
            "paused" => Ok(PlanStatus::Paused),
            "ended" => Ok(PlanStatus::Ended),
            other => Err(format!("unknown plan status '{}'", other)),
        }
    }
}

/// How old and new formula are combined during the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaningMode {
    /// Whole feedings alternate between the two formulas.
    Alternate,
}

impl WeaningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeaningMode::Alternate => "alternate",
        }
    }
}

impl FromStr for WeaningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "alternate" => Ok(WeaningMode::Alternate),
            other => Err(format!("unsupported weaning mode '{}'", other)),
        }
    }
}

/// A switch from one formula to another over a number of days. The server
/// keeps the plan's state only; the daily split is worked out by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaningPlan {
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
    pub start_at: NaiveDateTime,
    pub paused_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub status: PlanStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Insert payload for [`WeaningPlan`]; starts out active.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWeaningPlan {
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
    pub start_at: NaiveDateTime,
}

impl NewWeaningPlan {
    pub fn into_plan(self, id: u64, now: NaiveDateTime) -> WeaningPlan {
        WeaningPlan {
            id,
            baby_id: self.baby_id,
            created_by: self.created_by,
            mode: self.mode,
            duration_days: self.duration_days,
            old_brand_id: self.old_brand_id,
            old_series_name: self.old_series_name,
            old_age_range: self.old_age_range,
            new_brand_id: self.new_brand_id,
            new_series_name: self.new_series_name,
            new_age_range: self.new_age_range,
            start_at: self.start_at,
            paused_at: None,
            ended_at: None,
            status: PlanStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}
