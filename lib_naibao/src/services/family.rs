use super::access::AccessService;
use super::audit::snapshot;
use super::error::{ServiceError, ServiceResult};
use super::growth::{validate_measure, GrowthInput, GrowthService, MAX_HEIGHT_CM, MAX_WEIGHT_KG};
use super::ServiceContext;
use crate::connections::{BabyStorage, GrowthStorage, InviteStorage, MembershipStorage};
use crate::core::EventAction;
use crate::models::{Baby, BabyId, InviteCode, Membership, NewBaby, Role, UserId};
use chrono::{Duration, NaiveDate, NaiveTime};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const INVITE_CODE_LEN: usize = 8;
pub const INVITE_TTL_DAYS: i64 = 7;
const INVITE_ATTEMPTS: usize = 5;

/// A baby with its derived age and latest weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BabyProfile {
    #[serde(flatten)]
    pub baby: Baby,
    pub age_in_days: i64,
    pub age_in_months: f64,
    pub current_weight: Option<f64>,
}

/// Profile edits. Absent or blank fields keep the stored value. A weight or
/// height is written to today's growth record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BabyPatch {
    #[serde(default, alias = "nickname")]
    pub name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub birth_time: Option<NaiveTime>,
    #[serde(default)]
    pub current_weight: Option<f64>,
    #[serde(default)]
    pub current_height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InviteIssued {
    pub code: String,
    /// RFC 3339 in the civil zone.
    pub expires_at: String,
}

/// Babies, families and invitations.
#[derive(Clone)]
pub struct FamilyService {
    ctx: ServiceContext,
    access: AccessService,
    growth: GrowthService,
}

impl FamilyService {
    pub fn new(ctx: ServiceContext) -> Self {
        let access = ctx.access();
        let growth = GrowthService::new(ctx.clone());
        Self { ctx, access, growth }
    }

    /// Creates the baby with the caller as its admin.
    pub async fn create_baby(&self, user_id: UserId, mut request: NewBaby) -> ServiceResult<Baby> {
        request.name = request.name.trim().to_string();
        if request.name.is_empty() {
            return Err(ServiceError::validation("name is required"));
        }
        let now = self.ctx.clock.now();
        if request.birth_date > now.date_naive() {
            return Err(ServiceError::validation("birth date cannot be in the future"));
        }

        let baby = self
            .ctx
            .store
            .create_baby_with_admin(request, user_id, now.naive_local())
            .await?;
        info!(baby = baby.id, user = user_id, "created baby");
        self.ctx
            .audit
            .record(user_id, "create", "baby", Some(baby.id), None, snapshot(&baby))
            .await;
        Ok(baby)
    }

    pub async fn list_babies(&self, user_id: UserId) -> ServiceResult<Vec<BabyProfile>> {
        let babies = self.ctx.store.list_babies_for_user(user_id).await?;
        let mut profiles = Vec::with_capacity(babies.len());
        for baby in babies {
            profiles.push(self.profile(baby).await?);
        }
        Ok(profiles)
    }

    pub async fn get_baby(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<BabyProfile> {
        let (baby, _) = self.access.member_of(baby_id, user_id).await?;
        self.profile(baby).await
    }

    /// Admins only.
    pub async fn update_baby(&self, user_id: UserId, baby_id: BabyId, patch: BabyPatch) -> ServiceResult<BabyProfile> {
        validate_measure("weight", patch.current_weight, MAX_WEIGHT_KG)?;
        validate_measure("height", patch.current_height, MAX_HEIGHT_CM)?;
        let (before, _) = self.access.admin_of(baby_id, user_id, "edit the baby").await?;
        let now = self.ctx.clock.now();

        let mut baby = before.clone();
        if let Some(name) = non_blank(patch.name) {
            baby.name = name;
        }
        if let Some(gender) = non_blank(patch.gender) {
            baby.gender = Some(gender);
        }
        if let Some(birth_date) = patch.birth_date {
            if birth_date > now.date_naive() {
                return Err(ServiceError::validation("birth date cannot be in the future"));
            }
            baby.birth_date = birth_date;
        }
        if let Some(birth_time) = patch.birth_time {
            baby.birth_time = Some(birth_time);
        }

        let baby = self
            .ctx
            .store
            .update_baby(&baby)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("baby {} not found", baby_id)))?;
        info!(baby = baby.id, user = user_id, "updated baby");
        self.ctx
            .audit
            .record(user_id, "update", "baby", Some(baby.id), snapshot(&before), snapshot(&baby))
            .await;
        self.ctx
            .events
            .publish(baby.id, "baby", EventAction::Update, Some(baby.id))
            .await;

        if patch.current_weight.is_some() || patch.current_height.is_some() {
            let today = GrowthInput {
                record_date: now.date_naive(),
                weight_kg: patch.current_weight,
                height_cm: patch.current_height,
            };
            self.growth.upsert_record(user_id, baby.id, today).await?;
        }
        self.profile(baby).await
    }

    /// Removes the baby with all of its records. Admins only.
    pub async fn delete_baby(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<()> {
        let (baby, _) = self.access.admin_of(baby_id, user_id, "delete the baby").await?;
        if !self.ctx.store.delete_baby(baby.id).await? {
            return Err(ServiceError::not_found(format!("baby {} not found", baby_id)));
        }
        info!(baby = baby.id, user = user_id, "deleted baby");
        self.ctx
            .audit
            .record(user_id, "delete", "baby", Some(baby.id), snapshot(&baby), None)
            .await;
        self.ctx
            .events
            .publish(baby.id, "baby", EventAction::Delete, Some(baby.id))
            .await;
        Ok(())
    }

    /// Takes `target` out of the family. Admins only; nobody removes
    /// themselves or the baby's creator. Removing a non-member succeeds.
    pub async fn remove_member(&self, user_id: UserId, baby_id: BabyId, target: UserId) -> ServiceResult<()> {
        if target == 0 {
            return Err(ServiceError::validation("invalid user id"));
        }
        if target == user_id {
            return Err(ServiceError::validation("cannot remove yourself"));
        }
        let (baby, _) = self.access.admin_of(baby_id, user_id, "remove members").await?;
        if target == baby.owner_id {
            return Err(ServiceError::validation("the baby's creator cannot be removed"));
        }

        let Some(removed) = self.ctx.store.delete_membership(baby.id, target).await? else {
            return Ok(());
        };
        info!(baby = baby.id, user = user_id, removed = target, "removed family member");
        self.ctx
            .audit
            .record(user_id, "delete", "family_member", Some(target), snapshot(&removed), None)
            .await;
        self.ctx
            .events
            .publish(baby.id, "family_member", EventAction::Delete, Some(target))
            .await;
        Ok(())
    }

    async fn profile(&self, baby: Baby) -> ServiceResult<BabyProfile> {
        let age = self.ctx.clock.age_of(baby.birth_date, &self.ctx.clock.now());
        let current_weight = self.ctx.store.latest_weight(baby.id).await?;
        Ok(BabyProfile {
            baby,
            age_in_days: age.days,
            age_in_months: age.months,
            current_weight,
        })
    }

    /// Issues an invitation code. Admins only.
    pub async fn create_invite(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<InviteIssued> {
        self.access.admin_of(baby_id, user_id, "invite members").await?;

        let now = self.ctx.clock.now();
        let expires_at = now + Duration::days(INVITE_TTL_DAYS);
        for _ in 0..INVITE_ATTEMPTS {
            let code = generate_invite_code();
            if self.ctx.store.get_invite(&code).await?.is_some() {
                continue;
            }
            let invite = self
                .ctx
                .store
                .insert_invite(InviteCode {
                    code,
                    baby_id,
                    created_by: user_id,
                    expires_at: expires_at.naive_local(),
                    created_at: now.naive_local(),
                })
                .await?;
            self.ctx
                .audit
                .record(user_id, "create", "invite_code", None, None, snapshot(&invite))
                .await;
            return Ok(InviteIssued {
                code: invite.code,
                expires_at: expires_at.to_rfc3339(),
            });
        }

        warn!(baby = baby_id, "invite code space exhausted after retries");
        Err(ServiceError::validation("could not allocate an invite code, try again"))
    }

    /// Joins the caller to the invited family as a member.
    ///
    /// Redeeming again as an existing member succeeds without changes.
    pub async fn redeem_invite(&self, user_id: UserId, code: &str) -> ServiceResult<Baby> {
        let code = code.trim();
        if code.len() != INVITE_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ServiceError::validation("malformed invite code"));
        }

        let invite = self
            .ctx
            .store
            .get_invite(code)
            .await?
            .ok_or_else(|| ServiceError::not_found("invite code not found"))?;
        let now = self.ctx.clock.now();
        if self.ctx.clock.from_wall_clock(invite.expires_at) <= now {
            return Err(ServiceError::validation("invite code has expired"));
        }
        let baby = self.access.load_baby(invite.baby_id).await?;

        if self.ctx.store.get_membership(baby.id, user_id).await?.is_some() {
            return Ok(baby);
        }

        let member = self
            .ctx
            .store
            .insert_membership_if_absent(Membership {
                baby_id: baby.id,
                user_id,
                role: Role::Member,
                joined_at: now.naive_local(),
            })
            .await?;
        info!(baby = baby.id, user = user_id, "joined family by invite");
        self.ctx
            .audit
            .record(user_id, "create", "family_member", Some(user_id), None, snapshot(&member))
            .await;
        self.ctx
            .events
            .publish(baby.id, "family_member", EventAction::Create, Some(user_id))
            .await;
        Ok(baby)
    }

    pub async fn list_members(&self, user_id: UserId, baby_id: BabyId) -> ServiceResult<Vec<Membership>> {
        self.access.member_of(baby_id, user_id).await?;
        Ok(self.ctx.store.list_memberships(baby_id).await?)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn generate_invite_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::MemoryStore;
    use crate::services::test_support::{context, sample_baby};
    use std::sync::Arc;

    #[test]
    fn test_invite_codes_are_uppercase_alphanumeric() {
        for _ in 0..50 {
            let code = generate_invite_code();
            assert_eq!(code.len(), INVITE_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[tokio::test]
    async fn test_create_baby_makes_creator_admin() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store.clone());
        let family = FamilyService::new(ctx);

        let baby = family.create_baby(1, sample_baby()).await.unwrap();
        let members = family.list_members(1, baby.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, Role::Admin);
        assert_eq!(store.audit_entries().await.len(), 1);

        let mut blank = sample_baby();
        blank.name = "  ".to_string();
        assert!(matches!(family.create_baby(1, blank).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_invite_round_trip_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store);
        let family = FamilyService::new(ctx);
        let baby = family.create_baby(1, sample_baby()).await.unwrap();

        let invite = family.create_invite(1, baby.id).await.unwrap();
        let joined = family.redeem_invite(2, &invite.code).await.unwrap();
        assert_eq!(joined.id, baby.id);
        family.redeem_invite(2, &invite.code).await.unwrap();

        let members = family.list_members(2, baby.id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().any(|m| m.user_id == 2 && m.role == Role::Member));

        // members cannot invite
        assert!(matches!(family.create_invite(2, baby.id).await, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_unknown_malformed_and_expired_codes_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store.clone());
        let clock = ctx.clock;
        let family = FamilyService::new(ctx);
        let baby = family.create_baby(1, sample_baby()).await.unwrap();

        assert!(matches!(family.redeem_invite(2, "ABCDEFGH").await, Err(ServiceError::NotFound(_))));
        assert!(matches!(family.redeem_invite(2, "abc").await, Err(ServiceError::Validation(_))));

        let past = clock.now() - Duration::days(1);
        store
            .insert_invite(InviteCode {
                code: "EXPIRED1".to_string(),
                baby_id: baby.id,
                created_by: 1,
                expires_at: past.naive_local(),
                created_at: (past - Duration::days(7)).naive_local(),
            })
            .await
            .unwrap();
        assert!(matches!(family.redeem_invite(2, "EXPIRED1").await, Err(ServiceError::Validation(_))));
    }

    async fn with_member(family: &FamilyService, admin: UserId, member: UserId) -> Baby {
        let baby = family.create_baby(admin, sample_baby()).await.unwrap();
        let invite = family.create_invite(admin, baby.id).await.unwrap();
        family.redeem_invite(member, &invite.code).await.unwrap();
        baby
    }

    #[tokio::test]
    async fn test_admin_updates_profile_and_todays_growth() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, hub) = context(store.clone());
        let family = FamilyService::new(ctx);
        let baby = with_member(&family, 1, 2).await;
        let mut listener = hub.register(2, baby.id).await.unwrap();

        let patch = BabyPatch {
            name: Some("  Mimi ".to_string()),
            gender: Some("   ".to_string()),
            current_weight: Some(5.4),
            ..Default::default()
        };
        let profile = family.update_baby(1, baby.id, patch).await.unwrap();
        assert_eq!(profile.baby.name, "Mimi");
        assert_eq!(profile.baby.gender, baby.gender);
        assert_eq!(profile.current_weight, Some(5.4));
        assert_eq!(store.list_growth(baby.id).await.unwrap().len(), 1);

        let event: serde_json::Value = serde_json::from_slice(&listener.outbound.recv().await.unwrap()).unwrap();
        assert_eq!((event["entity"].as_str(), event["action"].as_str()), (Some("baby"), Some("update")));

        assert!(matches!(
            family.update_baby(2, baby.id, BabyPatch::default()).await,
            Err(ServiceError::Forbidden(_))
        ));
        let future = BabyPatch {
            birth_date: Some(profile.baby.birth_date + Duration::days(365)),
            ..Default::default()
        };
        assert!(matches!(family.update_baby(1, baby.id, future).await, Err(ServiceError::Validation(_))));
        let heavy = BabyPatch { current_weight: Some(80.0), ..Default::default() };
        assert!(matches!(family.update_baby(1, baby.id, heavy).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_only_admins_delete_babies() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, hub) = context(store.clone());
        let family = FamilyService::new(ctx);
        let baby = with_member(&family, 1, 2).await;
        let mut listener = hub.register(1, baby.id).await.unwrap();

        assert!(matches!(family.delete_baby(2, baby.id).await, Err(ServiceError::Forbidden(_))));
        family.delete_baby(1, baby.id).await.unwrap();

        let event: serde_json::Value = serde_json::from_slice(&listener.outbound.recv().await.unwrap()).unwrap();
        assert_eq!(event["action"], "delete");
        assert!(matches!(family.get_baby(1, baby.id).await, Err(ServiceError::NotFound(_))));
        assert!(family.list_babies(2).await.unwrap().is_empty());
        let last = store.audit_entries().await.pop().unwrap();
        assert_eq!((last.action.as_str(), last.entity.as_str()), ("delete", "baby"));
    }

    #[tokio::test]
    async fn test_member_removal_rules() {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _hub) = context(store.clone());
        let clock = ctx.clock;
        let family = FamilyService::new(ctx);
        let baby = with_member(&family, 1, 2).await;
        let invite = family.create_invite(1, baby.id).await.unwrap();
        family.redeem_invite(3, &invite.code).await.unwrap();
        store
            .insert_membership_if_absent(Membership {
                baby_id: baby.id,
                user_id: 4,
                role: Role::Admin,
                joined_at: clock.now().naive_local(),
            })
            .await
            .unwrap();

        assert!(matches!(family.remove_member(1, baby.id, 1).await, Err(ServiceError::Validation(_))));
        assert!(matches!(family.remove_member(2, baby.id, 3).await, Err(ServiceError::Forbidden(_))));
        // a second admin still cannot remove the creator
        assert!(matches!(family.remove_member(4, baby.id, 1).await, Err(ServiceError::Validation(_))));

        family.remove_member(1, baby.id, 3).await.unwrap();
        family.remove_member(1, baby.id, 3).await.unwrap();
        assert!(matches!(family.get_baby(3, baby.id).await, Err(ServiceError::Forbidden(_))));
        assert_eq!(family.list_members(1, baby.id).await.unwrap().len(), 3);
    }
}
