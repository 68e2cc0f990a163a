//! API endpoints.

#![allow(missing_docs)]

mod admin;
mod articles;
mod feed;
mod following;
mod notifications;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/admin", admin::router())
        .nest("/articles", articles::router())
        .nest("/feed", feed::router())
        .nest("/following", following::router())
        .nest("/notifications", notifications::router())
}
