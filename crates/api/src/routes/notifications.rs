//! Notification routes

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use chatline_core::ChatStore;
use chatline_shared::Notification;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// List the caller's notifications, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<NotificationsResponse>> {
    let notifications = state.store.list_notifications(auth.user_id).await?;
    Ok(Json(NotificationsResponse { notifications }))
}

/// Mark one of the caller's notifications as read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let updated = state
        .store
        .mark_notification_read(notification_id, auth.user_id)
        .await?;
    if !updated {
        return Err(ApiError::NotFound);
    }

    Ok(Json(StatusResponse { status: "ok" }))
}
