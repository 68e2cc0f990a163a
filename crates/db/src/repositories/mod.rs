//! Repository layer for database operations.

mod article;
mod following;
mod notification;
mod user;

pub use article::{ArticleRepository, ArticleTransaction};
pub use following::FollowingRepository;
pub use notification::NotificationRepository;
pub use user::UserRepository;
