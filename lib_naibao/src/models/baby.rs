use super::{BabyId, UserId};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tracked infant. Age is derived on read and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baby {
    pub id: BabyId,
    pub name: String,
    pub gender: Option<String>,
    pub birth_date: NaiveDate,
    pub birth_time: Option<NaiveTime>,
    /// The creating user. Legacy rows may lack a matching membership.
    pub owner_id: UserId,
    pub created_at: NaiveDateTime,
}

/// Insert payload for [`Baby`]; the id is assigned by storage.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBaby {
    pub name: String,
    pub gender: Option<String>,
    pub birth_date: NaiveDate,
    pub birth_time: Option<NaiveTime>,
}

/// Role of a user within one baby's family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            "guest" => Ok(Role::Guest),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// One row of the (baby, user) membership relation. Unique per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub baby_id: BabyId,
    pub user_id: UserId,
    pub role: Role,
    pub joined_at: NaiveDateTime,
}

/// A short code that lets another user join a baby's family as a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteCode {
    pub code: String,
    pub baby_id: BabyId,
    pub created_by: UserId,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}
