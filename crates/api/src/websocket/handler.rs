//! WebSocket handler for Axum
//!
//! Handles WebSocket connections, authentication, and event routing.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use chatline_core::{Audience, ChatStore, ClientEvent, Connection, ServerEvent};
use chatline_shared::CoreResult;

use crate::{auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: String,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
/// Authenticates via query parameter token instead of middleware Extension
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let auth = match state.jwt.authenticate(&params.token) {
        Ok(auth) => auth,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket auth failed: invalid token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    tracing::info!(user_id = %auth.user_id, "WebSocket connection upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, auth, state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, auth: AuthUser, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for events destined to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn = state
        .registry
        .add_connection(Connection::new(auth.user_id, tx))
        .await;
    let session_id = conn.session_id;

    // Send connection acknowledgment
    let _ = conn.send(ServerEvent::Connected { session_id });

    // Spawn task to forward events to the client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming frames
    while let Some(msg) = receiver.next().await {
        if let Ok(msg) = msg {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        handle_client_event(event, Arc::clone(&conn), auth, &state).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = ?e,
                            message = %text,
                            "Failed to parse client event"
                        );
                        let _ = conn.send(ServerEvent::Error {
                            message: "Invalid event format".to_string(),
                        });
                    }
                },
                Message::Close(_) => {
                    tracing::info!(session_id = %session_id, "WebSocket close frame received");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // Axum handles ping/pong automatically
                }
                _ => {} // Ignore binary messages
            }
        }
    }

    // Cleanup on disconnect
    tracing::info!(session_id = %session_id, user_id = %auth.user_id, "WebSocket connection closing");
    state.registry.remove_connection(&session_id).await;
    send_task.abort();
}

/// Handle client event
async fn handle_client_event(
    event: ClientEvent,
    conn: Arc<Connection>,
    auth: AuthUser,
    state: &AppState,
) {
    use ClientEvent::*;

    match event {
        JoinChat { chat_id } => match verify_chat_access(state, auth, chat_id).await {
            Ok(true) => {
                state.registry.join_chat(chat_id, Arc::clone(&conn)).await;
            }
            Ok(false) => {
                let _ = conn.send(ServerEvent::Error {
                    message: "Access denied to chat".to_string(),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, chat_id = %chat_id, "Failed to verify chat access");
                let _ = conn.send(ServerEvent::Error {
                    message: "Failed to verify access".to_string(),
                });
            }
        },

        LeaveChat { chat_id } => {
            state.registry.leave_chat(&chat_id, &conn.session_id).await;
        }

        TypingStart { chat_id } => {
            state
                .registry
                .publish(
                    ServerEvent::UserTyping {
                        chat_id,
                        user_id: auth.user_id,
                    },
                    Audience::Chat(chat_id),
                )
                .await;
        }

        TypingStop { chat_id } => {
            state
                .registry
                .publish(
                    ServerEvent::UserStopTyping {
                        chat_id,
                        user_id: auth.user_id,
                    },
                    Audience::Chat(chat_id),
                )
                .await;
        }

        SetStatus { status } => {
            if !auth.is_agent() {
                let _ = conn.send(ServerEvent::Error {
                    message: "Only agents carry an availability status".to_string(),
                });
                return;
            }
            if let Err(e) = state.relay.presence().set_status(auth.user_id, status).await {
                tracing::warn!(error = %e, user_id = %auth.user_id, "Failed to update status");
                let _ = conn.send(ServerEvent::Error {
                    message: "Failed to update status".to_string(),
                });
            }
        }

        Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}

/// Clients may join their own chats; agents may preview any chat
async fn verify_chat_access(state: &AppState, auth: AuthUser, chat_id: Uuid) -> CoreResult<bool> {
    let Some(chat) = state.store.get_chat(chat_id).await? else {
        return Ok(false);
    };
    Ok(auth.is_agent() || chat.client_id == auth.user_id)
}
