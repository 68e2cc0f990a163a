//! HTTP API layer for rewear.
//!
//! JSON endpoints over the core services:
//!
//! - **Endpoints**: moderation queue, following, notifications, feed, listings
//! - **Extractors**: authenticated caller
//! - **Middleware**: bearer token authentication
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};
