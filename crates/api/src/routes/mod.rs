//! API routes

pub mod agents;
pub mod chats;
pub mod health;
pub mod notifications;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/chats/messages", post(chats::send_message))
        .route("/chats/claim", post(chats::claim_next))
        .route("/chats/:id", get(chats::get_chat))
        .route("/chats/:id/end", post(chats::end_chat))
        .route("/chats/:id/assign", post(chats::assign_chat))
        .route("/queue", get(chats::get_queue))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/agents/status", post(agents::set_status))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        // Health check at root level for infrastructure monitoring; the
        // WebSocket endpoint authenticates itself via query token
        .route("/health", get(health::health))
        .route("/ws", get(ws_handler))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
