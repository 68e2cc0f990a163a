//! Fan-out dispatcher.
//!
//! Turns one publishing event into a single feed item plus one notification
//! per follower. Notifications are written in fixed-size batches, each with
//! its own timeout; failed batches are retried with backoff and whatever is
//! still undelivered is reported back so the job layer can resume it later.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rewear_common::{AppError, AppResult, IdGenerator, config::FanOutConfig};
use rewear_db::{
    entities::{
        article,
        feed_item::{self, FeedItemType},
        notification::{self, NotificationType},
    },
    stores::{NotificationStore, SocialGraphStore},
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::retry::{DeadLetterEntry, RetryConfig};

/// Kind of publishing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanOutKind {
    NewArticle,
    ArticleSold,
}

/// A publishing event to propagate to the actor's audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutEvent {
    pub kind: FanOutKind,
    /// The seller
    pub actor_id: String,
    pub article_id: String,
    pub article_title: String,
}

impl FanOutEvent {
    #[must_use]
    pub fn new_article(article: &article::Model) -> Self {
        Self::from_article(FanOutKind::NewArticle, article)
    }

    #[must_use]
    pub fn article_sold(article: &article::Model) -> Self {
        Self::from_article(FanOutKind::ArticleSold, article)
    }

    fn from_article(kind: FanOutKind, article: &article::Model) -> Self {
        Self {
            kind,
            actor_id: article.seller_id.clone(),
            article_id: article.id.clone(),
            article_title: article.title.clone(),
        }
    }
}

/// Sink for fan-out events.
///
/// Implemented by the in-process job service and by the Redis-backed queue,
/// so publishers never run a fan-out inline.
#[async_trait]
pub trait FanOutQueue: Send + Sync {
    /// Enqueue a fresh fan-out of `event`.
    async fn enqueue_fan_out(&self, event: FanOutEvent) -> AppResult<()>;
}

/// Queue that drops every event.
#[derive(Clone, Default)]
pub struct NoOpFanOutQueue;

#[async_trait]
impl FanOutQueue for NoOpFanOutQueue {
    async fn enqueue_fan_out(&self, _event: FanOutEvent) -> AppResult<()> {
        Ok(())
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Feed item written by this dispatch, if any.
    pub feed_item_id: Option<String>,
    /// Recipients whose batch was acknowledged.
    pub delivered: usize,
    /// Recipients still owed a notification.
    pub remaining: Vec<String>,
}

impl FanOutReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }

    /// `FanOutPartialFailure` when recipients remain.
    pub fn into_result(self) -> AppResult<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(AppError::FanOutPartialFailure {
                delivered: self.delivered,
                remaining: self.remaining.len(),
            })
        }
    }
}

/// What the job layer should do after running a fan-out job.
#[derive(Debug)]
pub enum FanOutStep {
    Done(FanOutReport),
    /// Run again after `delay`. `recipients` is `None` when the whole event
    /// has to be replayed, feed item included.
    Retry {
        recipients: Option<Vec<String>>,
        attempt: u32,
        delay: Duration,
    },
    DeadLetter(DeadLetterEntry<FanOutEvent>),
}

/// Fan-out dispatcher.
#[derive(Clone)]
pub struct FanOutDispatcher {
    graph: Arc<dyn SocialGraphStore>,
    store: Arc<dyn NotificationStore>,
    config: FanOutConfig,
    batch_retry: RetryConfig,
    job_retry: RetryConfig,
    id_gen: IdGenerator,
}

impl FanOutDispatcher {
    #[must_use]
    pub fn new(
        graph: Arc<dyn SocialGraphStore>,
        store: Arc<dyn NotificationStore>,
        config: FanOutConfig,
    ) -> Self {
        Self {
            graph,
            store,
            batch_retry: RetryConfig::for_batches(&config),
            job_retry: RetryConfig::for_jobs(&config),
            config,
            id_gen: IdGenerator::new(),
        }
    }

    /// Run a full fan-out: one feed item, then every follower notification.
    ///
    /// Fails only before any notification is attempted. Undelivered
    /// recipients are reported in [`FanOutReport::remaining`].
    pub async fn dispatch(&self, event: &FanOutEvent) -> AppResult<FanOutReport> {
        match event.kind {
            FanOutKind::NewArticle => {
                let followers = self.graph.list_follower_ids(&event.actor_id).await?;
                let item = self.write_feed_item(event, FeedItemType::NewArticle).await?;

                let mut report = self.deliver(event, followers).await;
                report.feed_item_id = Some(item.id);
                Ok(report)
            }
            FanOutKind::ArticleSold => {
                let item = self.write_feed_item(event, FeedItemType::ArticleSold).await?;

                Ok(FanOutReport {
                    feed_item_id: Some(item.id),
                    ..FanOutReport::default()
                })
            }
        }
    }

    /// Deliver notifications to `recipients` only. The feed item is not
    /// written again.
    pub async fn resume(&self, event: &FanOutEvent, recipients: Vec<String>) -> FanOutReport {
        self.deliver(event, recipients).await
    }

    /// Run attempt number `attempt` (0-indexed) of a fan-out job and decide
    /// what happens next.
    pub async fn run_job(
        &self,
        event: &FanOutEvent,
        recipients: Option<Vec<String>>,
        attempt: u32,
    ) -> FanOutStep {
        let result = match recipients {
            Some(recipients) => Ok(self.resume(event, recipients).await),
            None => self.dispatch(event).await,
        };

        let (retry_with, failure) = match result {
            Ok(report) if report.is_complete() => {
                info!(
                    article_id = %event.article_id,
                    kind = ?event.kind,
                    delivered = report.delivered,
                    "Fan-out completed"
                );
                return FanOutStep::Done(report);
            }
            Ok(report) => {
                let failure = AppError::FanOutPartialFailure {
                    delivered: report.delivered,
                    remaining: report.remaining.len(),
                };
                (Some(report.remaining), failure)
            }
            Err(e) => (None, e),
        };

        let attempts_made = attempt + 1;
        if self.job_retry.should_retry(attempts_made) {
            let delay = self.job_retry.delay_for_attempt(attempt);
            warn!(
                article_id = %event.article_id,
                attempt = attempts_made,
                delay = ?delay,
                error = %failure,
                "Fan-out incomplete, scheduling retry"
            );
            FanOutStep::Retry {
                recipients: retry_with,
                attempt: attempts_made,
                delay,
            }
        } else {
            error!(
                article_id = %event.article_id,
                attempts = attempts_made,
                error = %failure,
                "Fan-out exhausted retries, dead-lettering"
            );
            FanOutStep::DeadLetter(DeadLetterEntry::new(
                event.clone(),
                attempts_made,
                failure.to_string(),
            ))
        }
    }

    async fn write_feed_item(
        &self,
        event: &FanOutEvent,
        item_type: FeedItemType,
    ) -> AppResult<feed_item::Model> {
        self.store
            .insert_feed_item(feed_item::Model {
                id: self.id_gen.generate(),
                item_type,
                user_id: event.actor_id.clone(),
                article_id: Some(event.article_id.clone()),
                content: Some(event.article_title.clone()),
                created_at: Utc::now().into(),
            })
            .await
    }

    async fn deliver(&self, event: &FanOutEvent, recipients: Vec<String>) -> FanOutReport {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let rows: Vec<_> = recipients
            .into_iter()
            .map(|recipient| self.build_notification(event, recipient, now))
            .collect();

        // Holds at most one entry per batch; row ids survive retries.
        let mut work: VecDeque<(Vec<notification::Model>, u32)> = rows
            .chunks(self.config.batch_size.max(1))
            .map(|chunk| (chunk.to_vec(), 0))
            .collect();

        let mut report = FanOutReport::default();

        while let Some((batch, attempt)) = work.pop_front() {
            if attempt > 0 {
                tokio::time::sleep(self.batch_retry.delay_for_attempt(attempt - 1)).await;
            }

            let size = batch.len();
            let write = self.store.insert_notifications_batch(batch.clone());
            let failure = match tokio::time::timeout(self.config.batch_timeout(), write).await {
                Ok(Ok(_)) => {
                    report.delivered += size;
                    debug!(article_id = %event.article_id, size, "Notification batch written");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "batch write timed out after {}ms",
                    self.config.batch_timeout_ms
                ),
            };

            let attempts_made = attempt + 1;
            if self.batch_retry.should_retry(attempts_made) {
                warn!(
                    article_id = %event.article_id,
                    size,
                    attempt = attempts_made,
                    error = %failure,
                    "Notification batch failed, requeueing"
                );
                work.push_back((batch, attempts_made));
            } else {
                warn!(
                    article_id = %event.article_id,
                    size,
                    error = %failure,
                    "Notification batch gave up"
                );
                report
                    .remaining
                    .extend(batch.into_iter().map(|n| n.user_id));
            }
        }

        report
    }

    fn build_notification(
        &self,
        event: &FanOutEvent,
        recipient: String,
        now: DateTimeWithTimeZone,
    ) -> notification::Model {
        notification::Model {
            id: self.id_gen.generate(),
            notification_type: NotificationType::NewArticleFromFollowed,
            title: "New listing from a seller you follow".to_string(),
            message: format!("\"{}\" is now available", event.article_title),
            user_id: recipient,
            actor_id: Some(event.actor_id.clone()),
            entity_id: Some(event.article_id.clone()),
            entity_type: Some("article".to_string()),
            is_read: false,
            read_at: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rewear_db::entities::following;
    use rewear_db::memory::{MemoryNotificationStore, MemorySocialGraph};
    use std::collections::HashSet;

    fn test_config() -> FanOutConfig {
        FanOutConfig {
            batch_size: 500,
            batch_timeout_ms: 50,
            max_batch_attempts: 3,
            max_job_attempts: 2,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 5,
        }
    }

    fn event(kind: FanOutKind) -> FanOutEvent {
        FanOutEvent {
            kind,
            actor_id: "seller".to_string(),
            article_id: "a1".to_string(),
            article_title: "Linen shirt".to_string(),
        }
    }

    async fn setup(
        followers: usize,
    ) -> (FanOutDispatcher, MemorySocialGraph, MemoryNotificationStore) {
        let graph = MemorySocialGraph::new();
        for i in 0..followers {
            graph
                .create_edge(following::Model {
                    id: format!("edge{i}"),
                    follower_id: format!("follower{i}"),
                    following_id: "seller".to_string(),
                    created_at: Utc::now().into(),
                })
                .await
                .unwrap();
        }

        let store = MemoryNotificationStore::new();
        let dispatcher = FanOutDispatcher::new(
            Arc::new(graph.clone()),
            Arc::new(store.clone()),
            test_config(),
        );

        (dispatcher, graph, store)
    }

    fn distinct_recipients(rows: &[notification::Model]) -> usize {
        rows.iter().map(|n| n.user_id.as_str()).collect::<HashSet<_>>().len()
    }

    #[tokio::test]
    async fn test_zero_followers_writes_only_feed_item() {
        let (dispatcher, _, store) = setup(0).await;

        let report = dispatcher.dispatch(&event(FanOutKind::NewArticle)).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.delivered, 0);
        assert_eq!(store.feed_items().await.len(), 1);
        assert!(store.notifications().await.is_empty());
        assert!(store.batch_sizes().await.is_empty());
    }

    #[tokio::test]
    async fn test_followers_are_written_in_batches() {
        let (dispatcher, _, store) = setup(1201).await;

        let report = dispatcher.dispatch(&event(FanOutKind::NewArticle)).await.unwrap();

        assert_eq!(report.delivered, 1201);
        assert_eq!(store.batch_sizes().await, vec![500, 500, 201]);
        assert_eq!(store.feed_items().await.len(), 1);

        let rows = store.notifications().await;
        assert_eq!(rows.len(), 1201);
        assert_eq!(distinct_recipients(&rows), 1201);
        assert!(rows.iter().all(|n| {
            n.notification_type == NotificationType::NewArticleFromFollowed
                && n.entity_id.as_deref() == Some("a1")
                && n.entity_type.as_deref() == Some("article")
                && n.actor_id.as_deref() == Some("seller")
        }));
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried() {
        let (dispatcher, _, store) = setup(700).await;
        store.fail_next_batches(1);

        let report = dispatcher.dispatch(&event(FanOutKind::NewArticle)).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.delivered, 700);
        assert_eq!(store.batch_sizes().await, vec![500, 200, 500]);
        assert_eq!(store.notifications().await.len(), 700);
    }

    #[tokio::test]
    async fn test_lost_acknowledgement_does_not_duplicate_rows() {
        let (dispatcher, _, store) = setup(30).await;
        store.fail_next_batches_after_write(1);

        let report = dispatcher.dispatch(&event(FanOutKind::NewArticle)).await.unwrap();

        assert!(report.is_complete());
        let rows = store.notifications().await;
        assert_eq!(rows.len(), 30);
        assert_eq!(distinct_recipients(&rows), 30);
    }

    #[tokio::test]
    async fn test_timed_out_batch_is_retried() {
        let (dispatcher, _, store) = setup(10).await;
        store.stall_next_batches(1, Duration::from_millis(500));

        let report = dispatcher.dispatch(&event(FanOutKind::NewArticle)).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(store.batch_sizes().await, vec![10, 10]);
        assert_eq!(store.notifications().await.len(), 10);
    }

    #[tokio::test]
    async fn test_exhausted_batch_reports_partial_failure() {
        let (dispatcher, _, store) = setup(1).await;
        store.fail_next_batches(3);

        let report = dispatcher.dispatch(&event(FanOutKind::NewArticle)).await.unwrap();

        assert_eq!(store.batch_sizes().await, vec![1, 1, 1]);
        assert_eq!(report.remaining, vec!["follower0".to_string()]);
        assert!(report.feed_item_id.is_some());
        assert!(matches!(
            report.into_result(),
            Err(AppError::FanOutPartialFailure {
                delivered: 0,
                remaining: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_resume_does_not_rewrite_feed_item() {
        let (dispatcher, _, store) = setup(0).await;

        let report = dispatcher
            .resume(
                &event(FanOutKind::NewArticle),
                vec!["u1".to_string(), "u2".to_string()],
            )
            .await;

        assert_eq!(report.delivered, 2);
        assert!(report.feed_item_id.is_none());
        assert!(store.feed_items().await.is_empty());
        assert_eq!(store.notifications().await.len(), 2);
    }

    #[tokio::test]
    async fn test_run_job_retries_remaining_then_dead_letters() {
        let (dispatcher, _, store) = setup(5).await;
        store.fail_next_batches(3);

        let step = dispatcher
            .run_job(&event(FanOutKind::NewArticle), None, 0)
            .await;
        let FanOutStep::Retry {
            recipients,
            attempt,
            ..
        } = step
        else {
            panic!("expected a retry, got {step:?}");
        };
        assert_eq!(attempt, 1);
        assert_eq!(recipients.as_ref().map(Vec::len), Some(5));

        store.fail_next_batches(3);
        let step = dispatcher
            .run_job(&event(FanOutKind::NewArticle), recipients, attempt)
            .await;

        let FanOutStep::DeadLetter(entry) = step else {
            panic!("expected a dead letter, got {step:?}");
        };
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.job.article_id, "a1");
        assert_eq!(store.feed_items().await.len(), 1);
    }

    #[tokio::test]
    async fn test_follower_lookup_failure_replays_whole_event() {
        let (dispatcher, graph, store) = setup(3).await;
        graph.fail_next_reads(1);

        let step = dispatcher
            .run_job(&event(FanOutKind::NewArticle), None, 0)
            .await;

        assert!(matches!(
            step,
            FanOutStep::Retry {
                recipients: None,
                attempt: 1,
                ..
            }
        ));
        assert!(store.feed_items().await.is_empty());
    }

    #[tokio::test]
    async fn test_article_sold_writes_single_feed_item() {
        let (dispatcher, _, store) = setup(20).await;

        let report = dispatcher
            .dispatch(&event(FanOutKind::ArticleSold))
            .await
            .unwrap();

        assert!(report.is_complete());
        let items = store.feed_items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type, FeedItemType::ArticleSold);
        assert!(store.notifications().await.is_empty());
    }
}
