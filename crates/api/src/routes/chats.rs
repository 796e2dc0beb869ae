//! Chat routes
//!
//! This module exposes the engine's message, lifecycle and queue operations.

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatline_core::{AssignmentOutcome, ChatStore, MessageDraft, QueueEntry};
use chatline_shared::{Attachment, Chat, ChatMessage};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Omit to let the engine resolve the target chat (client reuse,
    /// agent pull-from-queue)
    pub chat_id: Option<Uuid>,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeResponse {
    Assigned { agent_id: Uuid },
    Queued { position: i64 },
    Existing,
}

impl From<AssignmentOutcome> for OutcomeResponse {
    fn from(outcome: AssignmentOutcome) -> Self {
        match outcome {
            AssignmentOutcome::Assigned { agent_id } => OutcomeResponse::Assigned { agent_id },
            AssignmentOutcome::Queued { position } => OutcomeResponse::Queued { position },
            AssignmentOutcome::Existing => OutcomeResponse::Existing,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub chat: Chat,
    pub message: ChatMessage,
    #[serde(flatten)]
    pub assignment: OutcomeResponse,
}

#[derive(Debug, Serialize)]
pub struct ChatWithMessages {
    #[serde(flatten)]
    pub chat: Chat,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub queued: Vec<QueueEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AssignRequest {
    /// Target agent for a manual override; omit to let the engine pick
    pub agent_id: Option<Uuid>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Send a message as the authenticated user
///
/// Clients reach their open chat (or open a new one); agents with no
/// `chat_id` pull the oldest waiting chat instead.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<DeliveryResponse>> {
    let delivery = state
        .relay
        .relay(MessageDraft {
            sender_id: auth.user_id,
            sender_role: auth.role,
            body: req.body,
            attachment: req.attachment,
            chat_id: req.chat_id,
        })
        .await?;

    Ok(Json(DeliveryResponse {
        chat: delivery.chat,
        message: delivery.message,
        assignment: delivery.outcome.into(),
    }))
}

/// Agent pulls the oldest waiting chat
pub async fn claim_next(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Chat>> {
    if !auth.is_agent() {
        return Err(ApiError::Forbidden);
    }

    let chat = state.relay.claim_next(auth.user_id).await?;
    Ok(Json(chat))
}

/// Get a chat with its ordered messages
pub async fn get_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<Json<ChatWithMessages>> {
    let chat = state
        .store
        .get_chat(chat_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Clients only see their own chats; agents may preview any
    if !auth.is_agent() && chat.client_id != auth.user_id {
        return Err(ApiError::NotFound);
    }

    let messages = state.store.list_messages(chat_id).await?;
    Ok(Json(ChatWithMessages { chat, messages }))
}

/// End a chat
pub async fn end_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<Json<Chat>> {
    let chat = state
        .store
        .get_chat(chat_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !auth.is_agent() && chat.client_id != auth.user_id {
        return Err(ApiError::NotFound);
    }

    let chat = state.relay.end_chat(chat_id).await?;

    tracing::info!(
        chat_id = %chat_id,
        user_id = %auth.user_id,
        "chat ended via api"
    );

    Ok(Json(chat))
}

/// Assign a waiting chat: engine-selected, or manual with `agent_id`
pub async fn assign_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Chat>> {
    if !auth.is_agent() {
        return Err(ApiError::Forbidden);
    }

    let chat = match req.agent_id {
        Some(agent_id) => state.relay.assign_manual(chat_id, agent_id).await?,
        None => state.relay.assign_chat(chat_id).await?,
    };

    tracing::info!(
        chat_id = %chat_id,
        assigned_to = ?chat.agent_id,
        assigned_by = %auth.user_id,
        "chat assigned via api"
    );

    Ok(Json(chat))
}

/// Current waiting queue with positions (operator view)
pub async fn get_queue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<QueueResponse>> {
    if !auth.is_agent() {
        return Err(ApiError::Forbidden);
    }

    let queued = state.relay.queue().entries().await?;
    Ok(Json(QueueResponse { queued }))
}
