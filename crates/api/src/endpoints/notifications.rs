//! Notifications endpoints.

use axum::{Json, Router, extract::State, routing::post};
use rewear_common::AppResult;
use rewear_core::{ListNotificationsInput, NotificationView};
use serde::Deserialize;

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{ApiResponse, CountResponse},
};

/// Mark as read request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadRequest {
    pub notification_id: String,
}

/// List notifications, newest first.
async fn get_notifications(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListNotificationsInput>,
) -> AppResult<ApiResponse<Vec<NotificationView>>> {
    let notifications = state.notification_service.list(&actor, req).await?;
    Ok(ApiResponse::ok(notifications))
}

/// Count unread notifications.
async fn unread_count(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.unread_count(&actor).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Mark a notification and its duplicates as read.
async fn mark_as_read(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<MarkAsReadRequest>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state
        .notification_service
        .mark_read(&actor, &req.notification_id)
        .await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Mark all notifications as read.
async fn mark_all_as_read(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.mark_all_read(&actor).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(get_notifications))
        .route("/unread-count", post(unread_count))
        .route("/mark-as-read", post(mark_as_read))
        .route("/mark-all-as-read", post(mark_all_as_read))
}
