//! Listing service.

use std::sync::Arc;

use chrono::Utc;
use rewear_common::{AppError, AppResult};
use rewear_db::{entities::article, stores::ListingStore};
use tracing::{info, warn};

use crate::policy::{Action, Actor, authorize};
use crate::services::fan_out::{FanOutEvent, FanOutQueue};

/// Listing service for seller-side operations.
#[derive(Clone)]
pub struct ListingService {
    listings: Arc<dyn ListingStore>,
    fan_out: Option<Arc<dyn FanOutQueue>>,
}

impl ListingService {
    /// Create a new listing service.
    #[must_use]
    pub fn new(listings: Arc<dyn ListingStore>) -> Self {
        Self {
            listings,
            fan_out: None,
        }
    }

    /// Set the queue sold listings are published to.
    pub fn set_fan_out(&mut self, fan_out: Arc<dyn FanOutQueue>) {
        self.fan_out = Some(fan_out);
    }

    /// Mark an approved, available listing as sold.
    ///
    /// Only the seller or an admin may do this.
    pub async fn mark_sold(&self, actor: &Actor, article_id: &str) -> AppResult<article::Model> {
        authorize(actor.role, Action::MarkSold)?;

        let article = self
            .listings
            .get_by_id(article_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Listing {article_id}")))?;

        if article.seller_id != actor.user_id && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "Only the seller can mark a listing as sold".to_string(),
            ));
        }

        let Some(sold) = self.listings.mark_sold(article_id, Utc::now().into()).await? else {
            return Err(AppError::InvalidStateTransition(format!(
                "listing {} is {:?} and cannot be sold",
                article.id, article.status
            )));
        };

        info!(article_id = %sold.id, seller_id = %sold.seller_id, "Listing marked as sold");

        if let Some(ref fan_out) = self.fan_out
            && let Err(e) = fan_out
                .enqueue_fan_out(FanOutEvent::article_sold(&sold))
                .await
        {
            warn!(article_id = %sold.id, error = %e, "Failed to enqueue fan-out");
        }

        Ok(sold)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fan_out::FanOutKind;
    use async_trait::async_trait;
    use rewear_db::entities::{
        article::{ArticleStatus, ImageList},
        user::UserRole,
    };
    use rewear_db::memory::MemoryListingStore;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingQueue {
        events: Mutex<Vec<FanOutEvent>>,
    }

    #[async_trait]
    impl FanOutQueue for RecordingQueue {
        async fn enqueue_fan_out(&self, event: FanOutEvent) -> AppResult<()> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    fn listing(id: &str, status: ArticleStatus) -> article::Model {
        article::Model {
            id: id.to_string(),
            seller_id: "seller1".to_string(),
            category_id: "coats".to_string(),
            title: "Wool coat".to_string(),
            description: None,
            images: ImageList::default(),
            price: 12000,
            status,
            is_available: status == ArticleStatus::Approved,
            moderation_notes: None,
            rejection_reason: None,
            published_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    async fn setup(status: ArticleStatus) -> (ListingService, MemoryListingStore, Arc<RecordingQueue>) {
        let store = MemoryListingStore::new();
        store.insert_article(listing("a1", status)).await;

        let queue = Arc::new(RecordingQueue::default());
        let mut service = ListingService::new(Arc::new(store.clone()));
        service.set_fan_out(queue.clone());

        (service, store, queue)
    }

    #[tokio::test]
    async fn test_seller_marks_sold_and_publishes() {
        let (service, store, queue) = setup(ArticleStatus::Approved).await;

        let sold = service
            .mark_sold(&Actor::new("seller1", UserRole::User), "a1")
            .await
            .unwrap();

        assert_eq!(sold.status, ArticleStatus::Sold);
        assert!(!sold.is_available);
        assert!(store.article("a1").await.unwrap().availability_is_consistent());

        let events = queue.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, FanOutKind::ArticleSold);
    }

    #[tokio::test]
    async fn test_admin_may_mark_sold() {
        let (service, _, _) = setup(ArticleStatus::Approved).await;

        let sold = service
            .mark_sold(&Actor::new("admin1", UserRole::Admin), "a1")
            .await
            .unwrap();

        assert_eq!(sold.status, ArticleStatus::Sold);
    }

    #[tokio::test]
    async fn test_non_owner_is_forbidden() {
        let (service, store, queue) = setup(ArticleStatus::Approved).await;

        let result = service
            .mark_sold(&Actor::new("stranger", UserRole::Moderator), "a1")
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(store.article("a1").await.unwrap().status, ArticleStatus::Approved);
        assert!(queue.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_listing_cannot_be_sold() {
        let (service, _, queue) = setup(ArticleStatus::PendingModeration).await;

        let result = service
            .mark_sold(&Actor::new("seller1", UserRole::User), "a1")
            .await;

        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))));
        assert!(queue.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_selling_twice_fails() {
        let (service, _, _) = setup(ArticleStatus::Approved).await;
        let seller = Actor::new("seller1", UserRole::User);

        service.mark_sold(&seller, "a1").await.unwrap();
        let second = service.mark_sold(&seller, "a1").await;

        assert!(matches!(second, Err(AppError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn test_unknown_listing_is_not_found() {
        let (service, _, _) = setup(ArticleStatus::Approved).await;

        let result = service
            .mark_sold(&Actor::new("seller1", UserRole::User), "missing")
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
