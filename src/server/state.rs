use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::matchmaking::SignalingHub;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Present only when a JWT secret is configured
    pub jwt_validator: Option<Arc<JwtValidator>>,
    pub hub: Arc<SignalingHub>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let jwt_validator = JwtValidator::from_config(&settings.jwt).map(Arc::new);
        let hub = Arc::new(SignalingHub::from_config(&settings.websocket));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            hub,
            start_time: Instant::now(),
        }
    }
}
