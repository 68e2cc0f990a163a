//! `SeaORM` entities.

pub mod article;
pub mod article_promotion;
pub mod feed_item;
pub mod following;
pub mod moderation_log;
pub mod notification;
pub mod user;

pub use article::Entity as Article;
pub use article_promotion::Entity as ArticlePromotion;
pub use feed_item::Entity as FeedItem;
pub use following::Entity as Following;
pub use moderation_log::Entity as ModerationLog;
pub use notification::Entity as Notification;
pub use user::Entity as User;
