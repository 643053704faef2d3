use lib_naibao::auth::TokenService;
use lib_naibao::core::{Hub, SessionConfig};
use lib_naibao::services::Services;
use lib_naibao::utils::CivilClock;
use std::sync::Arc;

/// Everything a handler needs, shared behind one `Arc`.
pub struct AppState {
    pub services: Services,
    pub tokens: TokenService,
    pub hub: Hub,
    pub session_config: SessionConfig,
    pub clock: CivilClock,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        services: Services,
        tokens: TokenService,
        hub: Hub,
        session_config: SessionConfig,
        clock: CivilClock,
    ) -> SharedState {
        Arc::new(Self {
            services,
            tokens,
            hub,
            session_config,
            clock,
        })
    }
}
