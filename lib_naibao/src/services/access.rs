use super::error::{ServiceError, ServiceResult};
use crate::connections::{BabyStorage, MembershipStorage, Store};
use crate::models::{Baby, BabyId, Membership, Role, UserId};
use crate::utils::CivilClock;
use std::sync::Arc;
use tracing::{info, warn};

/// Resolves who may act on a baby.
#[derive(Clone)]
pub struct AccessService {
    store: Arc<dyn Store>,
    clock: CivilClock,
}

impl AccessService {
    pub fn new(store: Arc<dyn Store>, clock: CivilClock) -> Self {
        Self { store, clock }
    }

    pub async fn load_baby(&self, baby_id: BabyId) -> ServiceResult<Baby> {
        self.store
            .get_baby(baby_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("baby {} not found", baby_id)))
    }

    /// The caller's membership of `baby`.
    ///
    /// An owner without a membership row (data from before families existed)
    /// is backfilled as admin. Everyone else without a row is refused.
    pub async fn ensure_member(&self, baby: &Baby, user_id: UserId) -> ServiceResult<Membership> {
        if let Some(member) = self.store.get_membership(baby.id, user_id).await? {
            return Ok(member);
        }
        if baby.owner_id != user_id {
            return Err(ServiceError::forbidden("not a member of this family"));
        }

        let backfill = Membership {
            baby_id: baby.id,
            user_id,
            role: Role::Admin,
            joined_at: self.clock.now().naive_local(),
        };
        match self.store.insert_membership_if_absent(backfill.clone()).await {
            Ok(stored) => {
                info!(baby = baby.id, user = user_id, "backfilled owner membership");
                Ok(stored)
            }
            Err(e) => {
                warn!(error = %e, baby = baby.id, user = user_id, "owner membership backfill failed");
                Ok(backfill)
            }
        }
    }

    /// Loads the baby and checks membership in one step.
    pub async fn member_of(&self, baby_id: BabyId, user_id: UserId) -> ServiceResult<(Baby, Membership)> {
        let baby = self.load_baby(baby_id).await?;
        let member = self.ensure_member(&baby, user_id).await?;
        Ok((baby, member))
    }

    /// Like [`member_of`](Self::member_of) but requires the admin role.
    pub async fn admin_of(&self, baby_id: BabyId, user_id: UserId, what: &str) -> ServiceResult<(Baby, Membership)> {
        let (baby, member) = self.member_of(baby_id, user_id).await?;
        if !is_admin(&member) {
            return Err(ServiceError::forbidden(format!("only family admins may {}", what)));
        }
        Ok((baby, member))
    }
}

pub fn is_admin(member: &Membership) -> bool {
    member.role == Role::Admin
}
