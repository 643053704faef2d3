//! # Domain Models
//!
//! Plain data carried between the storage layer, the services and the wire.
//! Every timestamp here is a naive wall-clock value in the configured civil
//! timezone; conversion to an absolute instant goes through
//! [`crate::utils::civil_time::CivilClock`].

/// Babies, family memberships and invite codes.
pub mod baby;
/// Feeding events, schedule settings and per-user amount memory.
pub mod feeding;
/// Formula choice and formula switch plans.
pub mod formula;
/// Daily growth measurements.
pub mod growth;
/// Versioned health reference data.
pub mod standard;
/// Best-effort audit trail entries.
pub mod audit;

pub use audit::AuditEntry;
pub use baby::{Baby, InviteCode, Membership, NewBaby, Role};
pub use feeding::{
    FeedingRecord, FeedingSettings, FeedingUpdate, InputMethod, NewFeeding, UserPreference,
};
pub use formula::{
    FormulaChoice, FormulaSelection, NewWeaningPlan, PlanStatus, WeaningMode, WeaningPlan,
};
pub use growth::{GrowthRecord, GrowthUpsert};
pub use standard::{StandardEntry, StandardKind};

/// Identifier of a baby.
pub type BabyId = u64;
/// Identifier of an authenticated user.
pub type UserId = u64;
/// Identifier of a feeding record.
pub type FeedingId = u64;
