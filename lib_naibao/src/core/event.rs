use super::hub::{BroadcastTarget, Hub};
use crate::models::BabyId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Delete,
    Upsert,
    End,
}

/// The JSON message pushed to subscribed clients after a mutation.
///
/// ```json
/// {"type":"event","baby_id":7,"entity":"feeding","action":"create","id":42,"timestamp":1769932800}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub baby_id: BabyId,
    pub entity: String,
    pub action: EventAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Unix seconds.
    pub timestamp: i64,
}

impl EventEnvelope {
    pub fn new(baby_id: BabyId, entity: &str, action: EventAction, id: Option<u64>, timestamp: i64) -> Self {
        Self {
            kind: "event".to_string(),
            baby_id,
            entity: entity.to_string(),
            action,
            id,
            timestamp,
        }
    }
}

/// Serializes envelopes and hands them to the hub. Never fails the caller.
#[derive(Clone)]
pub struct EventPublisher {
    hub: Hub,
}

impl EventPublisher {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub async fn publish(&self, baby_id: BabyId, entity: &str, action: EventAction, id: Option<u64>) {
        let envelope = EventEnvelope::new(baby_id, entity, action, id, Utc::now().timestamp());
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, entity, "failed to encode realtime event");
                return;
            }
        };
        if let Err(e) = self.hub.broadcast(BroadcastTarget::Baby(baby_id), payload).await {
            warn!(error = %e, entity, baby = baby_id, "realtime event not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hub::HubConfig;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_envelope_wire_shape() {
        let with_id = EventEnvelope::new(7, "feeding", EventAction::Create, Some(42), 1_769_932_800);
        assert_eq!(
            serde_json::to_string(&with_id).unwrap(),
            r#"{"type":"event","baby_id":7,"entity":"feeding","action":"create","id":42,"timestamp":1769932800}"#
        );
        let without_id = EventEnvelope::new(7, "feeding_settings", EventAction::Update, None, 1);
        let text = serde_json::to_string(&without_id).unwrap();
        assert!(!text.contains("\"id\""));
        assert!(text.contains(r#""action":"update""#));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribed_session() {
        let (hub, _task) = Hub::spawn(HubConfig::default(), CancellationToken::new());
        let mut reg = hub.register(1, 9).await.unwrap();
        EventPublisher::new(hub.clone())
            .publish(9, "growth", EventAction::Upsert, Some(3))
            .await;
        let raw = reg.outbound.recv().await.unwrap();
        let envelope: EventEnvelope = serde_json::from_slice(&raw).unwrap();
        assert_eq!(envelope.baby_id, 9);
        assert_eq!(envelope.action, EventAction::Upsert);
        assert_eq!(envelope.id, Some(3));
    }
}
