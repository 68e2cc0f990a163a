//! Feed endpoints.

use axum::{Json, Router, extract::State, routing::post};
use rewear_common::AppResult;
use rewear_core::PageRequest;
use rewear_db::entities::feed_item;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Feed items of followed sellers, newest first.
async fn timeline(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(page): Json<PageRequest>,
) -> AppResult<ApiResponse<Vec<feed_item::Model>>> {
    let items = state.notification_service.timeline(&actor, page).await?;
    Ok(ApiResponse::ok(items))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/timeline", post(timeline))
}
