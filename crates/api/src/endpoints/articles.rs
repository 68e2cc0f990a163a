//! Listing endpoints.

use axum::{Json, Router, extract::State, routing::post};
use rewear_common::AppResult;
use rewear_db::entities::article;
use serde::Deserialize;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Mark sold request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSoldRequest {
    pub article_id: String,
}

/// Mark an approved listing as sold.
async fn mark_sold(
    AuthUser(actor): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<MarkSoldRequest>,
) -> AppResult<ApiResponse<article::Model>> {
    let article = state
        .listing_service
        .mark_sold(&actor, &req.article_id)
        .await?;
    Ok(ApiResponse::ok(article))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/mark-sold", post(mark_sold))
}
