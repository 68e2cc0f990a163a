//! Core business logic for rewear: moderation, social graph and fan-out.

pub mod pagination;
pub mod policy;
pub mod retry;
pub mod services;

pub use pagination::PageRequest;
pub use policy::{Action, Actor, authorize};
pub use retry::{DeadLetterEntry, RetryConfig};
pub use services::*;
