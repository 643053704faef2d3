//! # In-Memory Store
//!
//! A complete [`Store`](super::Store) kept in process memory behind one
//! `RwLock`. Every trait method takes the lock once, so multi-row writes such
//! as [`BabyStorage::create_baby_with_admin`] are atomic.

use super::store::{
    AuditStorage, BabyStorage, FeedingStorage, FormulaStorage, GrowthStorage, InviteStorage,
    MembershipStorage, PreferenceStorage, SettingsStorage, StandardsStorage, StoreResult,
    WeaningPlanStorage,
};
use crate::models::{
    AuditEntry, Baby, BabyId, FeedingId, FeedingRecord, FeedingSettings, FeedingUpdate,
    FormulaChoice, FormulaSelection, GrowthRecord, GrowthUpsert, InviteCode, Membership, NewBaby,
    NewFeeding, NewWeaningPlan, PlanStatus, Role, StandardEntry, UserId, UserPreference,
    WeaningPlan,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    babies: HashMap<BabyId, Baby>,
    memberships: HashMap<(BabyId, UserId), Membership>,
    feedings: HashMap<FeedingId, FeedingRecord>,
    growth: HashMap<(BabyId, NaiveDate), GrowthRecord>,
    settings: HashMap<BabyId, FeedingSettings>,
    preferences: HashMap<(UserId, BabyId), UserPreference>,
    formulas: HashMap<(BabyId, UserId), FormulaSelection>,
    weaning_plans: HashMap<u64, WeaningPlan>,
    standards: Vec<StandardEntry>,
    invites: HashMap<String, InviteCode>,
    audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn current_plan_id(&self, baby_id: BabyId) -> Option<u64> {
        self.weaning_plans
            .values()
            .filter(|p| p.baby_id == baby_id && p.status.is_current())
            .max_by_key(|p| (p.start_at, p.id))
            .map(|p| p.id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a baby row without a membership, the shape of legacy data.
    pub async fn insert_legacy_baby(&self, baby: NewBaby, owner_id: UserId, now: NaiveDateTime) -> Baby {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let row = Baby {
            id,
            name: baby.name,
            gender: baby.gender,
            birth_date: baby.birth_date,
            birth_time: baby.birth_time,
            owner_id,
            created_at: now,
        };
        state.babies.insert(id, row.clone());
        row
    }

    /// Stores a reference row exactly as given, including its active flag.
    pub async fn seed_standard(&self, mut entry: StandardEntry) -> StandardEntry {
        let mut state = self.state.write().await;
        entry.id = state.allocate_id();
        state.standards.push(entry.clone());
        entry
    }

    /// Snapshot of the audit trail, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.read().await.audit.clone()
    }
}

#[async_trait]
impl BabyStorage for MemoryStore {
    async fn get_baby(&self, baby_id: BabyId) -> StoreResult<Option<Baby>> {
        Ok(self.state.read().await.babies.get(&baby_id).cloned())
    }

    async fn create_baby_with_admin(
        &self,
        baby: NewBaby,
        owner_id: UserId,
        now: NaiveDateTime,
    ) -> StoreResult<Baby> {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let row = Baby {
            id,
            name: baby.name,
            gender: baby.gender,
            birth_date: baby.birth_date,
            birth_time: baby.birth_time,
            owner_id,
            created_at: now,
        };
        state.babies.insert(id, row.clone());
        state.memberships.insert(
            (id, owner_id),
            Membership {
                baby_id: id,
                user_id: owner_id,
                role: Role::Admin,
                joined_at: now,
            },
        );
        Ok(row)
    }

    async fn list_babies_for_user(&self, user_id: UserId) -> StoreResult<Vec<Baby>> {
        let state = self.state.read().await;
        let mut babies: Vec<Baby> = state
            .babies
            .values()
            .filter(|b| b.owner_id == user_id || state.memberships.contains_key(&(b.id, user_id)))
            .cloned()
            .collect();
        babies.sort_by_key(|b| b.id);
        Ok(babies)
    }

    async fn update_baby(&self, baby: &Baby) -> StoreResult<Option<Baby>> {
        let mut state = self.state.write().await;
        let Some(row) = state.babies.get_mut(&baby.id) else {
            return Ok(None);
        };
        row.name = baby.name.clone();
        row.gender = baby.gender.clone();
        row.birth_date = baby.birth_date;
        row.birth_time = baby.birth_time;
        Ok(Some(row.clone()))
    }

    async fn delete_baby(&self, baby_id: BabyId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.babies.remove(&baby_id).is_none() {
            return Ok(false);
        }
        state.memberships.retain(|(baby, _), _| *baby != baby_id);
        state.feedings.retain(|_, f| f.baby_id != baby_id);
        state.growth.retain(|(baby, _), _| *baby != baby_id);
        state.settings.remove(&baby_id);
        state.preferences.retain(|(_, baby), _| *baby != baby_id);
        state.formulas.retain(|(baby, _), _| *baby != baby_id);
        state.weaning_plans.retain(|_, p| p.baby_id != baby_id);
        state.invites.retain(|_, i| i.baby_id != baby_id);
        Ok(true)
    }
}

#[async_trait]
impl MembershipStorage for MemoryStore {
    async fn get_membership(
        &self,
        baby_id: BabyId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .state
            .read()
            .await
            .memberships
            .get(&(baby_id, user_id))
            .cloned())
    }

    async fn insert_membership_if_absent(&self, membership: Membership) -> StoreResult<Membership> {
        let mut state = self.state.write().await;
        let stored = state
            .memberships
            .entry((membership.baby_id, membership.user_id))
            .or_insert(membership);
        Ok(stored.clone())
    }

    async fn list_memberships(&self, baby_id: BabyId) -> StoreResult<Vec<Membership>> {
        let state = self.state.read().await;
        let mut rows: Vec<Membership> = state
            .memberships
            .values()
            .filter(|m| m.baby_id == baby_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.joined_at, m.user_id));
        Ok(rows)
    }

    async fn delete_membership(
        &self,
        baby_id: BabyId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>> {
        Ok(self.state.write().await.memberships.remove(&(baby_id, user_id)))
    }
}

#[async_trait]
impl FeedingStorage for MemoryStore {
    async fn insert_feeding(
        &self,
        feeding: NewFeeding,
        created_at: NaiveDateTime,
    ) -> StoreResult<FeedingRecord> {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let row = FeedingRecord {
            id,
            baby_id: feeding.baby_id,
            user_id: feeding.user_id,
            amount: feeding.amount,
            feeding_time: feeding.feeding_time,
            formula_brand_id: feeding.formula_brand_id,
            formula_series_name: feeding.formula_series_name,
            scoops: feeding.scoops,
            created_at,
        };
        state.feedings.insert(id, row.clone());
        Ok(row)
    }

    async fn get_feeding(&self, feeding_id: FeedingId) -> StoreResult<Option<FeedingRecord>> {
        Ok(self.state.read().await.feedings.get(&feeding_id).cloned())
    }

    async fn update_feeding(
        &self,
        feeding_id: FeedingId,
        update: FeedingUpdate,
    ) -> StoreResult<Option<FeedingRecord>> {
        let mut state = self.state.write().await;
        let Some(row) = state.feedings.get_mut(&feeding_id) else {
            return Ok(None);
        };
        if let Some(amount) = update.amount {
            row.amount = amount;
        }
        if let Some(time) = update.feeding_time {
            row.feeding_time = time;
        }
        if update.formula_brand_id.is_some() {
            row.formula_brand_id = update.formula_brand_id;
        }
        if update.formula_series_name.is_some() {
            row.formula_series_name = update.formula_series_name;
        }
        if update.scoops.is_some() {
            row.scoops = update.scoops;
        }
        Ok(Some(row.clone()))
    }

    async fn delete_feeding(&self, feeding_id: FeedingId) -> StoreResult<bool> {
        Ok(self.state.write().await.feedings.remove(&feeding_id).is_some())
    }

    async fn feedings_between(
        &self,
        baby_id: BabyId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<FeedingRecord>> {
        let state = self.state.read().await;
        let mut rows: Vec<FeedingRecord> = state
            .feedings
            .values()
            .filter(|f| f.baby_id == baby_id && f.feeding_time >= from && f.feeding_time < to)
            .cloned()
            .collect();
        rows.sort_by_key(|f| (f.feeding_time, f.id));
        Ok(rows)
    }

    async fn latest_feeding_at_or_before(
        &self,
        baby_id: BabyId,
        upper: NaiveDateTime,
    ) -> StoreResult<Option<FeedingRecord>> {
        let state = self.state.read().await;
        Ok(state
            .feedings
            .values()
            .filter(|f| f.baby_id == baby_id && f.feeding_time <= upper)
            .max_by_key(|f| (f.feeding_time, f.id))
            .cloned())
    }

    async fn list_feedings(
        &self,
        baby_id: BabyId,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
        limit: usize,
    ) -> StoreResult<Vec<FeedingRecord>> {
        let state = self.state.read().await;
        let mut rows: Vec<FeedingRecord> = state
            .feedings
            .values()
            .filter(|f| f.baby_id == baby_id)
            .filter(|f| from.map_or(true, |lo| f.feeding_time >= lo))
            .filter(|f| to.map_or(true, |hi| f.feeding_time <= hi))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.feeding_time, b.id).cmp(&(a.feeding_time, a.id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl GrowthStorage for MemoryStore {
    async fn upsert_growth(
        &self,
        record: GrowthUpsert,
        now: NaiveDateTime,
    ) -> StoreResult<GrowthRecord> {
        let mut state = self.state.write().await;
        let key = (record.baby_id, record.record_date);
        if let Some(existing) = state.growth.get_mut(&key) {
            existing.weight_kg = record.weight_kg;
            existing.height_cm = record.height_cm;
            existing.recorded_by = record.recorded_by;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let id = state.allocate_id();
        let row = GrowthRecord {
            id,
            baby_id: record.baby_id,
            record_date: record.record_date,
            weight_kg: record.weight_kg,
            height_cm: record.height_cm,
            recorded_by: record.recorded_by,
            updated_at: now,
        };
        state.growth.insert(key, row.clone());
        Ok(row)
    }

    async fn list_growth(&self, baby_id: BabyId) -> StoreResult<Vec<GrowthRecord>> {
        let state = self.state.read().await;
        let mut rows: Vec<GrowthRecord> = state
            .growth
            .values()
            .filter(|g| g.baby_id == baby_id)
            .cloned()
            .collect();
        rows.sort_by_key(|g| g.record_date);
        Ok(rows)
    }

    async fn latest_weight(&self, baby_id: BabyId) -> StoreResult<Option<f64>> {
        let state = self.state.read().await;
        Ok(state
            .growth
            .values()
            .filter(|g| g.baby_id == baby_id && g.weight_kg.is_some())
            .max_by_key(|g| g.record_date)
            .and_then(|g| g.weight_kg))
    }
}

#[async_trait]
impl SettingsStorage for MemoryStore {
    async fn get_settings(&self, baby_id: BabyId) -> StoreResult<Option<FeedingSettings>> {
        Ok(self.state.read().await.settings.get(&baby_id).cloned())
    }

    async fn upsert_settings(&self, settings: FeedingSettings) -> StoreResult<FeedingSettings> {
        self.state
            .write()
            .await
            .settings
            .insert(settings.baby_id, settings.clone());
        Ok(settings)
    }
}

#[async_trait]
impl PreferenceStorage for MemoryStore {
    async fn get_preference(
        &self,
        user_id: UserId,
        baby_id: BabyId,
    ) -> StoreResult<Option<UserPreference>> {
        Ok(self
            .state
            .read()
            .await
            .preferences
            .get(&(user_id, baby_id))
            .cloned())
    }

    async fn upsert_preference(&self, preference: UserPreference) -> StoreResult<()> {
        self.state
            .write()
            .await
            .preferences
            .insert((preference.user_id, preference.baby_id), preference);
        Ok(())
    }
}

#[async_trait]
impl FormulaStorage for MemoryStore {
    async fn get_formula_selection(
        &self,
        baby_id: BabyId,
        user_id: UserId,
    ) -> StoreResult<Option<FormulaSelection>> {
        Ok(self.state.read().await.formulas.get(&(baby_id, user_id)).cloned())
    }

    async fn upsert_formula_selection(
        &self,
        choice: FormulaChoice,
        now: NaiveDateTime,
    ) -> StoreResult<FormulaSelection> {
        let mut state = self.state.write().await;
        let key = (choice.baby_id, choice.user_id);
        let id = match state.formulas.get(&key) {
            Some(existing) => existing.id,
            None => state.allocate_id(),
        };
        let row = FormulaSelection {
            id,
            baby_id: choice.baby_id,
            user_id: choice.user_id,
            brand_id: choice.brand_id,
            series_name: choice.series_name,
            age_range: choice.age_range,
            selected_at: now,
            is_active: true,
        };
        state.formulas.insert(key, row.clone());
        Ok(row)
    }

    async fn current_formula(&self, baby_id: BabyId) -> StoreResult<Option<FormulaSelection>> {
        let state = self.state.read().await;
        Ok(state
            .formulas
            .values()
            .filter(|f| f.baby_id == baby_id && f.is_active)
            .max_by_key(|f| (f.selected_at, f.id))
            .cloned())
    }
}

#[async_trait]
impl WeaningPlanStorage for MemoryStore {
    async fn current_weaning_plan(&self, baby_id: BabyId) -> StoreResult<Option<WeaningPlan>> {
        let state = self.state.read().await;
        Ok(state
            .current_plan_id(baby_id)
            .and_then(|id| state.weaning_plans.get(&id))
            .cloned())
    }

    async fn start_weaning_plan(
        &self,
        plan: NewWeaningPlan,
        now: NaiveDateTime,
    ) -> StoreResult<(Option<WeaningPlan>, WeaningPlan)> {
        let mut state = self.state.write().await;
        let mut ended = None;
        if let Some(id) = state.current_plan_id(plan.baby_id) {
            if let Some(existing) = state.weaning_plans.get_mut(&id) {
                existing.status = PlanStatus::Ended;
                existing.ended_at = Some(now);
                existing.paused_at = None;
                existing.updated_at = now;
                ended = Some(existing.clone());
            }
        }
        let id = state.allocate_id();
        let created = plan.into_plan(id, now);
        state.weaning_plans.insert(id, created.clone());
        Ok((ended, created))
    }

    async fn update_weaning_plan(&self, plan: &WeaningPlan) -> StoreResult<Option<WeaningPlan>> {
        let mut state = self.state.write().await;
        let Some(row) = state.weaning_plans.get_mut(&plan.id) else {
            return Ok(None);
        };
        row.status = plan.status;
        row.paused_at = plan.paused_at;
        row.ended_at = plan.ended_at;
        row.updated_at = plan.updated_at;
        Ok(Some(row.clone()))
    }
}

#[async_trait]
impl StandardsStorage for MemoryStore {
    async fn active_versions(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let versions: BTreeSet<String> = state
            .standards
            .iter()
            .filter(|e| e.is_active)
            .map(|e| e.version.clone())
            .collect();
        Ok(versions.into_iter().collect())
    }

    async fn all_versions(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let versions: BTreeSet<String> =
            state.standards.iter().map(|e| e.version.clone()).collect();
        Ok(versions.into_iter().collect())
    }

    async fn active_entries(
        &self,
        version: &str,
        standard_type: &str,
    ) -> StoreResult<Vec<StandardEntry>> {
        let state = self.state.read().await;
        Ok(state
            .standards
            .iter()
            .filter(|e| e.is_active && e.version == version && e.standard_type == standard_type)
            .cloned()
            .collect())
    }

    async fn insert_standard(&self, mut entry: StandardEntry) -> StoreResult<StandardEntry> {
        let mut state = self.state.write().await;
        entry.id = state.allocate_id();
        entry.is_active = false;
        state.standards.push(entry.clone());
        Ok(entry)
    }

    async fn activate_version(&self, version: &str) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let mut activated = 0;
        for entry in state.standards.iter_mut() {
            entry.is_active = entry.version == version;
            if entry.is_active {
                activated += 1;
            }
        }
        Ok(activated)
    }
}

#[async_trait]
impl InviteStorage for MemoryStore {
    async fn insert_invite(&self, invite: InviteCode) -> StoreResult<InviteCode> {
        self.state
            .write()
            .await
            .invites
            .insert(invite.code.clone(), invite.clone());
        Ok(invite)
    }

    async fn get_invite(&self, code: &str) -> StoreResult<Option<InviteCode>> {
        Ok(self.state.read().await.invites.get(code).cloned())
    }
}

#[async_trait]
impl AuditStorage for MemoryStore {
    async fn append_audit(&self, entry: AuditEntry) -> StoreResult<()> {
        self.state.write().await.audit.push(entry);
        Ok(())
    }
}
