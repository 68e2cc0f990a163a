//! Storage contracts consumed by the engine.
//!
//! Services hold these as `Arc<dyn ...>` so the `SeaORM` repositories can be
//! swapped for the in-memory stores in tests.

use async_trait::async_trait;
use rewear_common::AppResult;
use sea_orm::prelude::DateTimeWithTimeZone;

use crate::entities::{
    article::{self, ArticleStatus},
    article_promotion, feed_item, following, moderation_log, notification, user,
};

/// Status write applied by a moderation decision.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: ArticleStatus,
    pub is_available: bool,
    pub published_at: Option<DateTimeWithTimeZone>,
    pub moderation_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub updated_at: DateTimeWithTimeZone,
}

/// Listing store: articles, their promotions and the moderation ledger.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Find a listing by ID.
    async fn get_by_id(&self, id: &str) -> AppResult<Option<article::Model>>;

    /// Listings awaiting moderation, oldest first.
    async fn list_pending(&self, limit: u64, offset: u64) -> AppResult<Vec<article::Model>>;

    /// Moderation ledger of a listing, oldest first.
    async fn list_moderation_logs(&self, article_id: &str)
    -> AppResult<Vec<moderation_log::Model>>;

    /// Promotions attached to a listing.
    async fn list_promotions_by_article(
        &self,
        article_id: &str,
    ) -> AppResult<Vec<article_promotion::Model>>;

    /// Flip an approved, available listing to sold.
    ///
    /// Returns `None` when the listing was not approved and available at the
    /// time of the write.
    async fn mark_sold(
        &self,
        id: &str,
        now: DateTimeWithTimeZone,
    ) -> AppResult<Option<article::Model>>;

    /// Open a unit of work. Dropping it without [`ListingTransaction::commit`]
    /// discards every write made through it.
    async fn begin(&self) -> AppResult<Box<dyn ListingTransaction>>;
}

/// One atomic unit of work against the listing store.
#[async_trait]
pub trait ListingTransaction: Send {
    /// Find a listing by ID inside the transaction.
    async fn get_by_id(&mut self, id: &str) -> AppResult<Option<article::Model>>;

    /// Apply `update` only while the listing is still pending moderation.
    ///
    /// Returns `false` when no row matched, i.e. another decision won.
    async fn update_status(&mut self, id: &str, update: StatusUpdate) -> AppResult<bool>;

    /// Promotions attached to a listing.
    async fn list_promotions_by_article(
        &mut self,
        article_id: &str,
    ) -> AppResult<Vec<article_promotion::Model>>;

    /// Activate the given promotions with a window starting at `now`.
    async fn activate_promotions(
        &mut self,
        promotions: &[article_promotion::Model],
        now: DateTimeWithTimeZone,
    ) -> AppResult<Vec<article_promotion::Model>>;

    /// Append a row to the moderation ledger.
    async fn insert_moderation_log(
        &mut self,
        log: moderation_log::Model,
    ) -> AppResult<moderation_log::Model>;

    /// Make every write of this unit of work durable.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Social graph store: directed follow edges.
#[async_trait]
pub trait SocialGraphStore: Send + Sync {
    /// IDs of every user following `user_id`.
    async fn list_follower_ids(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// IDs of every user that `user_id` follows.
    async fn list_following_ids(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// Create an edge. A duplicate pair fails with `InvalidOperation`.
    async fn create_edge(&self, edge: following::Model) -> AppResult<following::Model>;

    /// Delete an edge. Returns whether one existed.
    async fn delete_edge(&self, follower_id: &str, following_id: &str) -> AppResult<bool>;

    /// Whether `follower_id` follows `following_id`.
    async fn edge_exists(&self, follower_id: &str, following_id: &str) -> AppResult<bool>;
}

/// Notification and feed store.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Write one feed item.
    async fn insert_feed_item(&self, item: feed_item::Model) -> AppResult<feed_item::Model>;

    /// Write a batch of notifications in one round-trip. Rows whose id already
    /// exists are skipped. Returns rows written.
    async fn insert_notifications_batch(&self, batch: Vec<notification::Model>)
    -> AppResult<u64>;

    /// Find a notification by ID.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<notification::Model>>;

    /// Notifications of a user, newest first, one row per dedup key.
    ///
    /// Duplicates collapse to their newest row before paging.
    async fn list_notifications(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>>;

    /// Unread notifications of a user, counted once per dedup key.
    async fn count_unread(&self, user_id: &str) -> AppResult<u64>;

    /// Mark every unread row sharing the dedup key of `notification` as read.
    async fn mark_read(
        &self,
        notification: &notification::Model,
        now: DateTimeWithTimeZone,
    ) -> AppResult<u64>;

    /// Mark every unread notification of a user as read.
    async fn mark_all_read(&self, user_id: &str, now: DateTimeWithTimeZone) -> AppResult<u64>;

    /// Feed items produced by any of `actor_ids`, newest first.
    async fn list_feed_items(
        &self,
        actor_ids: &[String],
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<feed_item::Model>>;

    /// Delete feed items created before `cutoff`.
    async fn delete_feed_items_before(&self, cutoff: DateTimeWithTimeZone) -> AppResult<u64>;

    /// Delete read notifications created before `cutoff`. Unread rows are kept.
    async fn delete_read_notifications_before(
        &self,
        cutoff: DateTimeWithTimeZone,
    ) -> AppResult<u64>;
}

/// Read access to users, owned by the authentication layer.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Resolve a session token.
    async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>>;

    /// Users with the given IDs, in no particular order.
    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>>;
}
