//! In-memory stores with fault injection.
//!
//! Behave like the `SeaORM` repositories, including transactional rollback of
//! listing writes, so service tests can run without `PostgreSQL`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rewear_common::{AppError, AppResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::entities::{
    article::{self, ArticleStatus},
    article_promotion, feed_item, following, moderation_log, notification, user,
};
use crate::stores::{
    ListingStore, ListingTransaction, NotificationStore, SocialGraphStore, StatusUpdate,
    UserStore,
};

fn injected(what: &str) -> AppError {
    AppError::Persistence(format!("injected failure: {what}"))
}

/// Decrement `counter` if positive. Returns whether it was.
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ==================== Listings ====================

#[derive(Debug, Clone, Default)]
struct ListingState {
    articles: HashMap<String, article::Model>,
    promotions: Vec<article_promotion::Model>,
    logs: Vec<moderation_log::Model>,
}

#[derive(Debug, Default)]
struct ListingFaults {
    fail_next_log_insert: AtomicBool,
    lose_next_status_race: AtomicBool,
    transaction_stall_ms: AtomicU64,
}

/// In-memory listing store.
///
/// A transaction holds the store lock from `begin` until it is committed or
/// dropped, so concurrent decisions on the same store are serialized.
#[derive(Debug, Clone, Default)]
pub struct MemoryListingStore {
    state: Arc<Mutex<ListingState>>,
    faults: Arc<ListingFaults>,
}

impl MemoryListingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_article(&self, article: article::Model) {
        self.state
            .lock()
            .await
            .articles
            .insert(article.id.clone(), article);
    }

    pub async fn insert_promotion(&self, promotion: article_promotion::Model) {
        self.state.lock().await.promotions.push(promotion);
    }

    pub async fn article(&self, id: &str) -> Option<article::Model> {
        self.state.lock().await.articles.get(id).cloned()
    }

    pub async fn promotions(&self, article_id: &str) -> Vec<article_promotion::Model> {
        self.state
            .lock()
            .await
            .promotions
            .iter()
            .filter(|p| p.article_id == article_id)
            .cloned()
            .collect()
    }

    pub async fn logs(&self) -> Vec<moderation_log::Model> {
        self.state.lock().await.logs.clone()
    }

    /// Make the next moderation log insert fail.
    pub fn fail_next_log_insert(&self) {
        self.faults.fail_next_log_insert.store(true, Ordering::SeqCst);
    }

    /// Make the next conditional status write affect no rows, as if another
    /// decision committed between the read and the write.
    pub fn lose_next_status_race(&self) {
        self.faults.lose_next_status_race.store(true, Ordering::SeqCst);
    }

    /// Sleep inside every transaction before the status write.
    pub fn stall_transactions(&self, stall: Duration) {
        let ms = u64::try_from(stall.as_millis()).unwrap_or(u64::MAX);
        self.faults.transaction_stall_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn get_by_id(&self, id: &str) -> AppResult<Option<article::Model>> {
        Ok(self.article(id).await)
    }

    async fn list_pending(&self, limit: u64, offset: u64) -> AppResult<Vec<article::Model>> {
        let state = self.state.lock().await;
        let mut pending: Vec<_> = state
            .articles
            .values()
            .filter(|a| a.status == ArticleStatus::PendingModeration)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(page(pending, limit, offset))
    }

    async fn list_moderation_logs(
        &self,
        article_id: &str,
    ) -> AppResult<Vec<moderation_log::Model>> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|l| l.article_id == article_id)
            .cloned()
            .collect())
    }

    async fn list_promotions_by_article(
        &self,
        article_id: &str,
    ) -> AppResult<Vec<article_promotion::Model>> {
        Ok(self.promotions(article_id).await)
    }

    async fn mark_sold(
        &self,
        id: &str,
        now: DateTimeWithTimeZone,
    ) -> AppResult<Option<article::Model>> {
        let mut state = self.state.lock().await;
        let Some(article) = state.articles.get_mut(id) else {
            return Ok(None);
        };
        if article.status != ArticleStatus::Approved || !article.is_available {
            return Ok(None);
        }

        article.status = ArticleStatus::Sold;
        article.is_available = false;
        article.updated_at = Some(now);
        Ok(Some(article.clone()))
    }

    async fn begin(&self) -> AppResult<Box<dyn ListingTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryListingTransaction {
            guard,
            staged,
            faults: Arc::clone(&self.faults),
        }))
    }
}

/// Staged copy of the listing state. Written back on commit only.
pub struct MemoryListingTransaction {
    guard: OwnedMutexGuard<ListingState>,
    staged: ListingState,
    faults: Arc<ListingFaults>,
}

#[async_trait]
impl ListingTransaction for MemoryListingTransaction {
    async fn get_by_id(&mut self, id: &str) -> AppResult<Option<article::Model>> {
        Ok(self.staged.articles.get(id).cloned())
    }

    async fn update_status(&mut self, id: &str, update: StatusUpdate) -> AppResult<bool> {
        let stall = self.faults.transaction_stall_ms.load(Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }

        if self.faults.lose_next_status_race.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let Some(article) = self.staged.articles.get_mut(id) else {
            return Ok(false);
        };
        if article.status != ArticleStatus::PendingModeration {
            return Ok(false);
        }

        article.status = update.status;
        article.is_available = update.is_available;
        article.published_at = update.published_at;
        article.moderation_notes = update.moderation_notes;
        article.rejection_reason = update.rejection_reason;
        article.updated_at = Some(update.updated_at);
        Ok(true)
    }

    async fn list_promotions_by_article(
        &mut self,
        article_id: &str,
    ) -> AppResult<Vec<article_promotion::Model>> {
        Ok(self
            .staged
            .promotions
            .iter()
            .filter(|p| p.article_id == article_id)
            .cloned()
            .collect())
    }

    async fn activate_promotions(
        &mut self,
        promotions: &[article_promotion::Model],
        now: DateTimeWithTimeZone,
    ) -> AppResult<Vec<article_promotion::Model>> {
        let ids: HashSet<&str> = promotions.iter().map(|p| p.id.as_str()).collect();
        let mut activated = Vec::with_capacity(ids.len());

        for promotion in &mut self.staged.promotions {
            if ids.contains(promotion.id.as_str()) {
                *promotion = promotion.activated_at(now)?;
                activated.push(promotion.clone());
            }
        }

        Ok(activated)
    }

    async fn insert_moderation_log(
        &mut self,
        log: moderation_log::Model,
    ) -> AppResult<moderation_log::Model> {
        if self.faults.fail_next_log_insert.swap(false, Ordering::SeqCst) {
            return Err(injected("moderation log insert"));
        }

        self.staged.logs.push(log.clone());
        Ok(log)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let Self {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}

// ==================== Social graph ====================

/// In-memory follow edges.
#[derive(Debug, Clone, Default)]
pub struct MemorySocialGraph {
    edges: Arc<Mutex<Vec<following::Model>>>,
    fail_reads: Arc<AtomicU32>,
}

impl MemorySocialGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` follower lookups fail.
    pub fn fail_next_reads(&self, n: u32) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    pub async fn edge_count(&self) -> usize {
        self.edges.lock().await.len()
    }
}

#[async_trait]
impl SocialGraphStore for MemorySocialGraph {
    async fn list_follower_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        if take(&self.fail_reads) {
            return Err(injected("follower lookup"));
        }

        let edges = self.edges.lock().await;
        Ok(edges
            .iter()
            .filter(|e| e.following_id == user_id)
            .map(|e| e.follower_id.clone())
            .collect())
    }

    async fn list_following_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        let edges = self.edges.lock().await;
        Ok(edges
            .iter()
            .filter(|e| e.follower_id == user_id)
            .map(|e| e.following_id.clone())
            .collect())
    }

    async fn create_edge(&self, edge: following::Model) -> AppResult<following::Model> {
        let mut edges = self.edges.lock().await;
        if edges
            .iter()
            .any(|e| e.follower_id == edge.follower_id && e.following_id == edge.following_id)
        {
            return Err(AppError::InvalidOperation(
                "Already following this user".to_string(),
            ));
        }

        edges.push(edge.clone());
        Ok(edge)
    }

    async fn delete_edge(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        let mut edges = self.edges.lock().await;
        let before = edges.len();
        edges.retain(|e| !(e.follower_id == follower_id && e.following_id == following_id));
        Ok(edges.len() < before)
    }

    async fn edge_exists(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        let edges = self.edges.lock().await;
        Ok(edges
            .iter()
            .any(|e| e.follower_id == follower_id && e.following_id == following_id))
    }
}

// ==================== Notifications ====================

#[derive(Debug, Default)]
struct NotificationFaults {
    fail_feed_item: AtomicBool,
    fail_batches: AtomicU32,
    fail_batches_after_write: AtomicU32,
    stall_batches: AtomicU32,
    stall_ms: AtomicU64,
}

#[derive(Debug, Default)]
struct NotificationState {
    notifications: Vec<notification::Model>,
    feed_items: Vec<feed_item::Model>,
    batch_sizes: Vec<usize>,
}

/// In-memory notifications and feed items.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotificationStore {
    state: Arc<Mutex<NotificationState>>,
    faults: Arc<NotificationFaults>,
}

impl MemoryNotificationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<notification::Model> {
        self.state.lock().await.notifications.clone()
    }

    pub async fn feed_items(&self) -> Vec<feed_item::Model> {
        self.state.lock().await.feed_items.clone()
    }

    /// Sizes of every batch write attempted, in order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().await.batch_sizes.clone()
    }

    pub async fn insert_notification(&self, model: notification::Model) {
        self.state.lock().await.notifications.push(model);
    }

    pub async fn insert_feed_item_raw(&self, item: feed_item::Model) {
        self.state.lock().await.feed_items.push(item);
    }

    /// Make the next feed item insert fail.
    pub fn fail_next_feed_item(&self) {
        self.faults.fail_feed_item.store(true, Ordering::SeqCst);
    }

    /// Make the next `n` batch writes fail without writing anything.
    pub fn fail_next_batches(&self, n: u32) {
        self.faults.fail_batches.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` batch writes persist their rows and then fail.
    pub fn fail_next_batches_after_write(&self, n: u32) {
        self.faults.fail_batches_after_write.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` batch writes sleep for `stall` first.
    pub fn stall_next_batches(&self, n: u32, stall: Duration) {
        let ms = u64::try_from(stall.as_millis()).unwrap_or(u64::MAX);
        self.faults.stall_ms.store(ms, Ordering::SeqCst);
        self.faults.stall_batches.store(n, Ordering::SeqCst);
    }
}

fn page<T>(items: Vec<T>, limit: u64, offset: u64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit).collect()
}

fn newest_first(a: &notification::Model, b: &notification::Model) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert_feed_item(&self, item: feed_item::Model) -> AppResult<feed_item::Model> {
        if self.faults.fail_feed_item.swap(false, Ordering::SeqCst) {
            return Err(injected("feed item insert"));
        }

        self.state.lock().await.feed_items.push(item.clone());
        Ok(item)
    }

    async fn insert_notifications_batch(
        &self,
        batch: Vec<notification::Model>,
    ) -> AppResult<u64> {
        self.state.lock().await.batch_sizes.push(batch.len());

        if take(&self.faults.stall_batches) {
            let ms = self.faults.stall_ms.load(Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if take(&self.faults.fail_batches) {
            return Err(injected("notification batch"));
        }

        let mut state = self.state.lock().await;
        let existing: HashSet<String> = state.notifications.iter().map(|n| n.id.clone()).collect();
        let fresh: Vec<_> = batch
            .into_iter()
            .filter(|n| !existing.contains(&n.id))
            .collect();
        let written = fresh.len() as u64;
        state.notifications.extend(fresh);
        drop(state);

        if take(&self.faults.fail_batches_after_write) {
            return Err(injected("notification batch acknowledgement"));
        }

        Ok(written)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<notification::Model>> {
        let state = self.state.lock().await;
        Ok(state.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        rows.sort_by(newest_first);

        let mut seen = HashSet::new();
        rows.retain(|n| seen.insert(n.dedup_key()));

        Ok(page(rows, limit, offset))
    }

    async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        let state = self.state.lock().await;
        let keys: HashSet<_> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .map(notification::Model::dedup_key)
            .collect();

        Ok(keys.len() as u64)
    }

    async fn mark_read(
        &self,
        target: &notification::Model,
        now: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let key = target.dedup_key();
        let mut state = self.state.lock().await;
        let mut updated = 0;

        for n in &mut state.notifications {
            if !n.is_read && n.dedup_key() == key {
                n.is_read = true;
                n.read_at = Some(now);
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn mark_all_read(&self, user_id: &str, now: DateTimeWithTimeZone) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let mut updated = 0;

        for n in &mut state.notifications {
            if n.user_id == user_id && !n.is_read {
                n.is_read = true;
                n.read_at = Some(now);
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn list_feed_items(
        &self,
        actor_ids: &[String],
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<feed_item::Model>> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .feed_items
            .iter()
            .filter(|i| actor_ids.contains(&i.user_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(page(items, limit, offset))
    }

    async fn delete_feed_items_before(&self, cutoff: DateTimeWithTimeZone) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.feed_items.len();
        state.feed_items.retain(|i| i.created_at >= cutoff);
        Ok((before - state.feed_items.len()) as u64)
    }

    async fn delete_read_notifications_before(
        &self,
        cutoff: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.notifications.len();
        state
            .notifications
            .retain(|n| !n.is_read || n.created_at >= cutoff);
        Ok((before - state.notifications.len()) as u64)
    }
}

// ==================== Users ====================

/// In-memory users.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<Mutex<Vec<user::Model>>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: user::Model) {
        self.users.lock().await.push(user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|u| u.token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        let users = self.users.lock().await;
        Ok(users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::{article::ImageList, notification::NotificationType};
    use chrono::Utc;

    fn pending_article(id: &str) -> article::Model {
        article::Model {
            id: id.to_string(),
            seller_id: "seller1".to_string(),
            category_id: "shoes".to_string(),
            title: "Sneakers".to_string(),
            description: None,
            images: ImageList::default(),
            price: 2000,
            status: ArticleStatus::PendingModeration,
            is_available: false,
            moderation_notes: None,
            rejection_reason: None,
            published_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn approve() -> StatusUpdate {
        StatusUpdate {
            status: ArticleStatus::Approved,
            is_available: true,
            published_at: Some(Utc::now().into()),
            moderation_notes: None,
            rejection_reason: None,
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryListingStore::new();
        store.insert_article(pending_article("a1")).await;

        {
            let mut txn = store.begin().await.unwrap();
            assert!(txn.update_status("a1", approve()).await.unwrap());
        }

        let article = store.article("a1").await.unwrap();
        assert_eq!(article.status, ArticleStatus::PendingModeration);
    }

    #[tokio::test]
    async fn test_committed_transaction_persists_writes() {
        let store = MemoryListingStore::new();
        store.insert_article(pending_article("a1")).await;

        let mut txn = store.begin().await.unwrap();
        assert!(txn.update_status("a1", approve()).await.unwrap());
        txn.commit().await.unwrap();

        let article = store.article("a1").await.unwrap();
        assert_eq!(article.status, ArticleStatus::Approved);
        assert!(article.is_available);
    }

    #[tokio::test]
    async fn test_unread_count_collapses_duplicates() {
        let store = MemoryNotificationStore::new();
        let now: DateTimeWithTimeZone = Utc::now().into();

        for id in ["n1", "n2"] {
            store
                .insert_notification(notification::Model {
                    id: id.to_string(),
                    notification_type: NotificationType::NewArticleFromFollowed,
                    title: "New article".to_string(),
                    message: "m".to_string(),
                    user_id: "u1".to_string(),
                    actor_id: None,
                    entity_id: Some("a1".to_string()),
                    entity_type: Some("article".to_string()),
                    is_read: false,
                    read_at: None,
                    created_at: now,
                })
                .await;
        }

        assert_eq!(store.count_unread("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_batches_counts_down() {
        let store = MemoryNotificationStore::new();
        store.fail_next_batches(1);

        assert!(store.insert_notifications_batch(vec![]).await.is_err());
        assert_eq!(store.insert_notifications_batch(vec![]).await.unwrap(), 0);
    }
}
