//! # Services
//!
//! Request-level operations behind the HTTP surface. Each service checks
//! family membership, validates input, writes through the storage
//! collaborator, then records an audit entry and publishes a realtime event.
//! Audit and event delivery are best effort and never fail a request.

/// Membership resolution and role checks.
pub mod access;
/// Best-effort audit trail.
pub mod audit;
pub mod error;
/// Babies, invitations and family members.
pub mod family;
/// Feeding records, recommendation and statistics.
pub mod feeding;
/// The family's formula choice.
pub mod formula;
/// Growth records and gain statistics.
pub mod growth;
/// Per-user feeding input preferences.
pub mod preferences;
/// Feeding interval settings and the next due time.
pub mod settings;
/// Reference standard import and activation.
pub mod standards;
/// Formula switch plans.
pub mod weaning;

pub use access::{is_admin, AccessService};
pub use audit::AuditSink;
pub use error::{ServiceError, ServiceResult};
pub use family::{BabyPatch, BabyProfile, FamilyService, InviteIssued};
pub use feeding::{
    CreateFeedingRequest, FeedingRange, FeedingService, FeedingStats, FeedingStatsReport,
    FeedingView, PreferenceSnapshot, UpdateFeedingRequest,
};
pub use formula::{FormulaRequest, FormulaService};
pub use growth::{GrowthInput, GrowthService, GrowthStats};
pub use preferences::{PreferencePatch, PreferenceService, PreferenceView};
pub use settings::{NextFeeding, SettingsPatch, SettingsService};
pub use standards::StandardsAdminService;
pub use weaning::{CreatePlanRequest, PlanStatusRequest, WeaningPlanView, WeaningService};

use crate::connections::Store;
use crate::core::EventPublisher;
use crate::models::UserId;
use crate::standards::StandardsLookup;
use crate::utils::CivilClock;
use std::collections::HashSet;
use std::sync::Arc;

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn Store>,
    pub clock: CivilClock,
    pub events: EventPublisher,
    pub standards: StandardsLookup,
    pub audit: AuditSink,
}

impl ServiceContext {
    pub fn new(store: Arc<dyn Store>, clock: CivilClock, events: EventPublisher) -> Self {
        Self {
            standards: StandardsLookup::new(Arc::clone(&store)),
            audit: AuditSink::new(Arc::clone(&store), clock),
            store,
            clock,
            events,
        }
    }

    pub fn access(&self) -> AccessService {
        AccessService::new(Arc::clone(&self.store), self.clock)
    }
}

/// Every service, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub access: AccessService,
    pub family: FamilyService,
    pub feeding: FeedingService,
    pub formula: FormulaService,
    pub growth: GrowthService,
    pub preferences: PreferenceService,
    pub settings: SettingsService,
    pub standards: StandardsAdminService,
    pub weaning: WeaningService,
}

impl Services {
    pub fn new(ctx: ServiceContext, operators: HashSet<UserId>) -> Self {
        Self {
            access: ctx.access(),
            family: FamilyService::new(ctx.clone()),
            feeding: FeedingService::new(ctx.clone()),
            formula: FormulaService::new(ctx.clone()),
            growth: GrowthService::new(ctx.clone()),
            preferences: PreferenceService::new(ctx.clone()),
            settings: SettingsService::new(ctx.clone()),
            weaning: WeaningService::new(ctx.clone()),
            standards: StandardsAdminService::new(ctx, operators),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ServiceContext;
    use crate::connections::MemoryStore;
    use crate::core::{EventPublisher, Hub, HubConfig};
    use crate::models::NewBaby;
    use crate::utils::CivilClock;
    use chrono::Duration;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    /// A context over `store` with a running hub. Keep the hub alive for the test.
    pub fn context(store: Arc<MemoryStore>) -> (ServiceContext, Hub) {
        let (hub, _task) = Hub::spawn(HubConfig::default(), CancellationToken::new());
        let ctx = ServiceContext::new(store, CivilClock::default(), EventPublisher::new(hub.clone()));
        (ctx, hub)
    }

    /// A two month old baby.
    pub fn sample_baby() -> NewBaby {
        NewBaby {
            name: "Doudou".to_string(),
            gender: Some("girl".to_string()),
            birth_date: CivilClock::default().now().date_naive() - Duration::days(60),
            birth_time: None,
        }
    }
}
