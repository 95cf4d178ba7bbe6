//! Application state shared across routes

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::game::{GameSession, SessionHandle};
use crate::util::rate_limit::{create_limiter, Limiter, ADMIN_RATE_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: SessionHandle,
    pub admin_limiter: Arc<Limiter>,
}

impl AppState {
    /// Build the state and the session task that still has to be spawned
    pub fn new(config: Config) -> (Self, GameSession) {
        let config = Arc::new(config);

        // One session per server process
        let seed = rand::random::<u64>();
        let (session, handle) = GameSession::new(Uuid::new_v4(), seed, config.session.clone());

        let state = Self {
            config,
            session: handle,
            admin_limiter: create_limiter(ADMIN_RATE_LIMIT),
        };

        (state, session)
    }
}
