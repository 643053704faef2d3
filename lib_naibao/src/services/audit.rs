use crate::connections::{AuditStorage, Store};
use crate::models::{AuditEntry, UserId};
use crate::utils::CivilClock;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Appends operation records to the audit trail. Failures are logged and
/// never reach the caller.
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn Store>,
    clock: CivilClock,
}

impl AuditSink {
    pub fn new(store: Arc<dyn Store>, clock: CivilClock) -> Self {
        Self { store, clock }
    }

    pub async fn record(
        &self,
        user_id: UserId,
        action: &str,
        entity: &str,
        entity_id: Option<u64>,
        before: Option<Value>,
        after: Option<Value>,
    ) {
        let entry = AuditEntry {
            user_id,
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id,
            before,
            after,
            at: self.clock.now().naive_local(),
        };
        if let Err(e) = self.store.append_audit(entry).await {
            warn!(error = %e, action, entity, "failed to write audit entry");
        }
    }
}

/// JSON image of a row for the audit trail.
pub fn snapshot<T: Serialize + ?Sized>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}
