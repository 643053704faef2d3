//! # Recommendation Engine
//!
//! Pure computations over a baby's day: how much to offer next, how many
//! feedings are left today, when the next one is due and whether anything
//! needs attention. Nothing here performs I/O or fails; degenerate input is
//! clamped to fallback constants.

/// Day/night schedule math.
pub mod schedule;
/// Per-feeding amount recommendation.
pub mod calculator;
/// Level and code reminders over the same inputs.
pub mod advisory;

pub use advisory::{assess_feeding, format_elapsed, AdvisoryCode, AdvisoryLevel, FeedingAdvisory};
pub use calculator::{
    age_reference_text, compute_recommendation, estimate_weight_by_age, RecommendationInput,
    RecommendedAmount, WarningLevel, DEFAULT_COEFFICIENT,
};
pub use schedule::{compute_next_feeding_time, compute_remaining_feedings, DaySchedule};
