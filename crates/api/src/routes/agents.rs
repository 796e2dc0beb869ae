//! Agent presence routes

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};

use chatline_shared::AgentStatus;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: AgentStatus,
}

#[derive(Debug, Serialize)]
pub struct SetStatusResponse {
    pub status: AgentStatus,
}

/// Agent changes their own availability
///
/// A manual `away` set here is sticky: ending chats will not flip the agent
/// back to `available` unless the deployment opts into auto-revert.
pub async fn set_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SetStatusRequest>,
) -> ApiResult<Json<SetStatusResponse>> {
    if !auth.is_agent() {
        return Err(ApiError::Forbidden);
    }

    state
        .relay
        .presence()
        .set_status(auth.user_id, req.status)
        .await?;

    Ok(Json(SetStatusResponse { status: req.status }))
}
