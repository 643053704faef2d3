//! # Storage Traits
//!
//! This module defines the storage abstraction traits that allow different
//! storage backends to be used interchangeably by the services.
//!
//! Timestamps cross this boundary as naive civil wall-clock values. Backends
//! must store and return them untouched; re-attaching the timezone is the
//! caller's job.

use crate::models::{
    AuditEntry, Baby, BabyId, FeedingId, FeedingRecord, FeedingSettings, FeedingUpdate,
    FormulaChoice, FormulaSelection, GrowthRecord, GrowthUpsert, InviteCode, Membership, NewBaby,
    NewFeeding, NewWeaningPlan, StandardEntry, UserId, UserPreference, WeaningPlan,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Custom error types for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String),
    #[error("Query execution failed: {0}")]
    QueryError(String),
    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Babies and their creation.
#[async_trait]
pub trait BabyStorage: Send + Sync {
    async fn get_baby(&self, baby_id: BabyId) -> StoreResult<Option<Baby>>;

    /// Creates the baby and the owner's admin membership in one transaction.
    async fn create_baby_with_admin(
        &self,
        baby: NewBaby,
        owner_id: UserId,
        now: NaiveDateTime,
    ) -> StoreResult<Baby>;

    /// Babies the user belongs to, by membership.
    async fn list_babies_for_user(&self, user_id: UserId) -> StoreResult<Vec<Baby>>;

    /// Writes the profile fields of `baby`. `None` if the row is gone.
    async fn update_baby(&self, baby: &Baby) -> StoreResult<Option<Baby>>;

    /// Removes the baby together with every row that belongs to it.
    /// Returns true if the baby existed.
    async fn delete_baby(&self, baby_id: BabyId) -> StoreResult<bool>;
}

/// The (baby, user, role) relation.
#[async_trait]
pub trait MembershipStorage: Send + Sync {
    async fn get_membership(
        &self,
        baby_id: BabyId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>>;

    /// Inserts the row unless one already exists for the pair; returns the
    /// stored row either way.
    async fn insert_membership_if_absent(&self, membership: Membership) -> StoreResult<Membership>;

    async fn list_memberships(&self, baby_id: BabyId) -> StoreResult<Vec<Membership>>;

    /// Returns the removed row, if there was one.
    async fn delete_membership(
        &self,
        baby_id: BabyId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>>;
}

#[async_trait]
pub trait FeedingStorage: Send + Sync {
    async fn insert_feeding(
        &self,
        feeding: NewFeeding,
        created_at: NaiveDateTime,
    ) -> StoreResult<FeedingRecord>;

    async fn get_feeding(&self, feeding_id: FeedingId) -> StoreResult<Option<FeedingRecord>>;

    /// Returns the updated row, or `None` if it does not exist.
    async fn update_feeding(
        &self,
        feeding_id: FeedingId,
        update: FeedingUpdate,
    ) -> StoreResult<Option<FeedingRecord>>;

    /// Returns true if a row was deleted.
    async fn delete_feeding(&self, feeding_id: FeedingId) -> StoreResult<bool>;

    /// Feedings with `from <= feeding_time < to`, oldest first.
    async fn feedings_between(
        &self,
        baby_id: BabyId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<FeedingRecord>>;

    /// The newest feeding with `feeding_time <= upper`.
    async fn latest_feeding_at_or_before(
        &self,
        baby_id: BabyId,
        upper: NaiveDateTime,
    ) -> StoreResult<Option<FeedingRecord>>;

    /// Newest first, optionally bounded (inclusive) on both ends.
    async fn list_feedings(
        &self,
        baby_id: BabyId,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
        limit: usize,
    ) -> StoreResult<Vec<FeedingRecord>>;
}

#[async_trait]
pub trait GrowthStorage: Send + Sync {
    /// Insert or update the single row for (baby, date).
    async fn upsert_growth(
        &self,
        record: GrowthUpsert,
        now: NaiveDateTime,
    ) -> StoreResult<GrowthRecord>;

    /// All records for the baby, oldest date first.
    async fn list_growth(&self, baby_id: BabyId) -> StoreResult<Vec<GrowthRecord>>;

    /// Weight from the newest record that has one.
    async fn latest_weight(&self, baby_id: BabyId) -> StoreResult<Option<f64>>;
}

#[async_trait]
pub trait SettingsStorage: Send + Sync {
    async fn get_settings(&self, baby_id: BabyId) -> StoreResult<Option<FeedingSettings>>;
    async fn upsert_settings(&self, settings: FeedingSettings) -> StoreResult<FeedingSettings>;
}

#[async_trait]
pub trait PreferenceStorage: Send + Sync {
    async fn get_preference(
        &self,
        user_id: UserId,
        baby_id: BabyId,
    ) -> StoreResult<Option<UserPreference>>;
    async fn upsert_preference(&self, preference: UserPreference) -> StoreResult<()>;
}

#[async_trait]
pub trait FormulaStorage: Send + Sync {
    async fn get_formula_selection(
        &self,
        baby_id: BabyId,
        user_id: UserId,
    ) -> StoreResult<Option<FormulaSelection>>;

    /// Inserts or replaces the (baby, user) row and marks it active.
    async fn upsert_formula_selection(
        &self,
        choice: FormulaChoice,
        now: NaiveDateTime,
    ) -> StoreResult<FormulaSelection>;

    /// The most recently selected active row of any family member.
    async fn current_formula(&self, baby_id: BabyId) -> StoreResult<Option<FormulaSelection>>;
}

#[async_trait]
pub trait WeaningPlanStorage: Send + Sync {
    /// The newest active or paused plan, by start time.
    async fn current_weaning_plan(&self, baby_id: BabyId) -> StoreResult<Option<WeaningPlan>>;

    /// Ends the current plan, if any, and inserts `plan` in one transaction.
    /// Returns the ended plan and the new one.
    async fn start_weaning_plan(
        &self,
        plan: NewWeaningPlan,
        now: NaiveDateTime,
    ) -> StoreResult<(Option<WeaningPlan>, WeaningPlan)>;

    /// Writes status, pause and end times. `None` if the row is gone.
    async fn update_weaning_plan(&self, plan: &WeaningPlan) -> StoreResult<Option<WeaningPlan>>;
}

/// Versioned health reference data.
#[async_trait]
pub trait StandardsStorage: Send + Sync {
    /// Distinct versions that have at least one active entry.
    async fn active_versions(&self) -> StoreResult<Vec<String>>;

    /// Every imported version, active or not.
    async fn all_versions(&self) -> StoreResult<Vec<String>>;

    /// Active entries of one version and type, in any order.
    async fn active_entries(
        &self,
        version: &str,
        standard_type: &str,
    ) -> StoreResult<Vec<StandardEntry>>;

    /// Imports a row. Import never changes which version is active.
    async fn insert_standard(&self, entry: StandardEntry) -> StoreResult<StandardEntry>;

    /// Marks every entry of `version` active and every other entry inactive.
    /// Returns the number of entries now active.
    async fn activate_version(&self, version: &str) -> StoreResult<u64>;
}

#[async_trait]
pub trait InviteStorage: Send + Sync {
    async fn insert_invite(&self, invite: InviteCode) -> StoreResult<InviteCode>;
    async fn get_invite(&self, code: &str) -> StoreResult<Option<InviteCode>>;
}

#[async_trait]
pub trait AuditStorage: Send + Sync {
    async fn append_audit(&self, entry: AuditEntry) -> StoreResult<()>;
}

/// Everything a full backend provides.
pub trait Store:
    BabyStorage
    + MembershipStorage
    + FeedingStorage
    + GrowthStorage
    + SettingsStorage
    + PreferenceStorage
    + FormulaStorage
    + WeaningPlanStorage
    + StandardsStorage
    + InviteStorage
    + AuditStorage
{
}

impl<T> Store for T where
    T: BabyStorage
        + MembershipStorage
        + FeedingStorage
        + GrowthStorage
        + SettingsStorage
        + PreferenceStorage
        + FormulaStorage
        + WeaningPlanStorage
        + StandardsStorage
        + InviteStorage
        + AuditStorage
{
}
