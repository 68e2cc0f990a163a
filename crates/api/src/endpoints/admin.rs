//! Admin moderation endpoints.

use axum::{Json, Router, extract::State, routing::post};
use rewear_common::AppResult;
use rewear_core::{DecisionInput, DecisionOutcome, PageRequest};
use rewear_db::entities::{article, moderation_log};
use serde::Deserialize;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Moderation history request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub article_id: String,
}

/// Listings awaiting moderation, oldest first.
async fn queue(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(page): Json<PageRequest>,
) -> AppResult<ApiResponse<Vec<article::Model>>> {
    let pending = state.moderation_service.list_pending(&actor, page).await?;
    Ok(ApiResponse::ok(pending))
}

/// Approve or reject a pending listing.
async fn decide(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<DecisionInput>,
) -> AppResult<ApiResponse<DecisionOutcome>> {
    let outcome = state.moderation_service.decide(&actor, input).await?;
    Ok(ApiResponse::ok(outcome))
}

/// Moderation ledger of one listing.
async fn history(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<HistoryRequest>,
) -> AppResult<ApiResponse<Vec<moderation_log::Model>>> {
    let logs = state
        .moderation_service
        .history(&actor, &req.article_id)
        .await?;
    Ok(ApiResponse::ok(logs))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/moderation/queue", post(queue))
        .route("/moderation/decide", post(decide))
        .route("/moderation/history", post(history))
}
