//! Shared application state

use std::sync::Arc;

use chatline_core::{ConnectionRegistry, MessageRelay, PgChatStore, PresenceTracker};
use sqlx::PgPool;

use crate::auth::JwtManager;
use crate::config::Config;

/// State shared by every handler and the WebSocket layer
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<PgChatStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub relay: MessageRelay<PgChatStore>,
    pub jwt: JwtManager,
}

impl AppState {
    pub fn new(config: &Config, pool: PgPool) -> Self {
        let store = Arc::new(PgChatStore::new(pool.clone()));
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = PresenceTracker::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.presence_auto_revert_away,
        );
        let relay = MessageRelay::new(Arc::clone(&store), Arc::clone(&registry), presence);

        Self {
            pool,
            store,
            registry,
            relay,
            jwt: JwtManager::new(&config.jwt_secret),
        }
    }
}
