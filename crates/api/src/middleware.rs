//! API middleware.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use rewear_core::{Actor, FollowingService, ListingService, ModerationService, NotificationService};
use rewear_db::stores::UserStore;
use tracing::warn;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub moderation_service: ModerationService,
    pub following_service: FollowingService,
    pub notification_service: NotificationService,
    pub listing_service: ListingService,
    pub users: Arc<dyn UserStore>,
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <token>` to an [`Actor`]. Requests
/// without a valid token pass through unauthenticated.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.users.find_by_token(token).await {
            Ok(Some(user)) => {
                req.extensions_mut().insert(Actor::new(user.id, user.role));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to resolve session token"),
        }
    }

    next.run(req).await
}
