use super::UserId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A before/after snapshot of a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: UserId,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<u64>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub at: NaiveDateTime,
}
