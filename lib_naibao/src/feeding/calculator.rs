use super::schedule::{compute_remaining_feedings, DaySchedule};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// ml per kg per day used when no valid coefficient is supplied.
pub const DEFAULT_COEFFICIENT: f64 = 135.0;

const MIN_PER_FEEDING: i32 = 50;
const MAX_PER_FEEDING: i32 = 200;
const DEFAULT_FEEDINGS_PER_DAY: i32 = 6;

/// How today's intake compares to the daily standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Normal,
    Low,
    High,
}

/// Everything the engine needs for one recommendation.
#[derive(Debug, Clone)]
pub struct RecommendationInput<'a> {
    /// Latest recorded weight; `None` or non-positive means estimate from age.
    pub weight_kg: Option<f64>,
    pub age_months: f64,
    /// Amounts (ml) fed so far today.
    pub todays_amounts: &'a [i32],
    /// The user's remembered amount, if any.
    pub preferred_amount: Option<i32>,
    pub now: DateTime<Tz>,
    pub schedule: DaySchedule,
    /// ml/kg/day from the standards lookup.
    pub coefficient: Option<f64>,
    /// Range text from the standards lookup.
    pub age_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAmount {
    pub recommended: i32,
    pub daily_standard: i32,
    pub daily_consumed: i32,
    pub remaining_times: i32,
    pub warning: WarningLevel,
    pub age_reference: String,
}

/// Typical weight in kg by month of age, plateauing at 10.5 kg from 11 months.
pub fn estimate_weight_by_age(age_months: f64) -> f64 {
    const TABLE: [f64; 11] = [4.1, 5.0, 6.0, 6.5, 7.0, 7.5, 8.0, 8.5, 9.0, 9.5, 10.0];
    TABLE
        .iter()
        .enumerate()
        .find(|(month, _)| age_months < (*month + 1) as f64)
        .map(|(_, kg)| *kg)
        .unwrap_or(10.5)
}

/// Daily intake range text used when the lookup has nothing.
pub fn age_reference_text(age_months: f64) -> &'static str {
    if age_months < 1.0 {
        "600-700ml/天"
    } else if age_months < 3.0 {
        "700-900ml/天"
    } else if age_months < 6.0 {
        "800-1000ml/天"
    } else {
        "900-1100ml/天"
    }
}

fn classify(consumed: i32, standard: i32) -> WarningLevel {
    if standard <= 0 {
        return WarningLevel::Normal;
    }
    let ratio = f64::from(consumed) / f64::from(standard);
    if ratio > 1.2 {
        WarningLevel::High
    } else if ratio < 0.8 {
        WarningLevel::Low
    } else {
        WarningLevel::Normal
    }
}

/// Recommends the next per-feeding amount.
///
/// While intake is below the daily standard the remainder is split over the
/// remaining feedings and clamped to 50-200 ml. Otherwise the remembered
/// preference is returned, or a sixth of the standard.
pub fn compute_recommendation(input: &RecommendationInput<'_>) -> RecommendedAmount {
    let weight = input
        .weight_kg
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or_else(|| estimate_weight_by_age(input.age_months));
    let coefficient = input
        .coefficient
        .filter(|c| c.is_finite() && *c > 0.0)
        .unwrap_or(DEFAULT_COEFFICIENT);
    let daily_standard = (weight * coefficient) as i32;

    let age_reference = input
        .age_reference
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| age_reference_text(input.age_months).to_string());

    let daily_consumed: i32 = input.todays_amounts.iter().copied().sum();
    let remaining_times =
        i32::try_from(compute_remaining_feedings(&input.now, &input.schedule)).unwrap_or(i32::MAX);

    let recommended = if remaining_times > 0 && daily_consumed < daily_standard {
        ((daily_standard - daily_consumed) / remaining_times).clamp(MIN_PER_FEEDING, MAX_PER_FEEDING)
    } else {
        input
            .preferred_amount
            .unwrap_or(daily_standard / DEFAULT_FEEDINGS_PER_DAY)
    };

    RecommendedAmount {
        recommended,
        daily_standard,
        daily_consumed,
        remaining_times,
        warning: classify(daily_consumed, daily_standard),
        age_reference,
    }
}
