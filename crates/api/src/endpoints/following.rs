//! Following endpoints.

use axum::{Json, Router, extract::State, routing::post};
use rewear_common::AppResult;
use rewear_db::entities::following;
use serde::Deserialize;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Follow request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub user_id: String,
}

/// Follow a user.
async fn follow(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<FollowRequest>,
) -> AppResult<ApiResponse<following::Model>> {
    let edge = state.following_service.follow(&actor, &req.user_id).await?;
    Ok(ApiResponse::ok(edge))
}

/// Unfollow a user.
async fn unfollow(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<FollowRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .following_service
        .unfollow(&actor, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(follow))
        .route("/delete", post(unfollow))
}
