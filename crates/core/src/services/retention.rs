//! Retention service: prunes expired feed items and read notifications.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rewear_common::{AppResult, config::RetentionConfig};
use rewear_db::stores::NotificationStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A unit of retention work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupTask {
    /// Delete feed items older than `feed_item_days`.
    FeedItems,
    /// Delete read notifications older than `read_notification_days`.
    ReadNotifications,
    /// Both of the above.
    All,
}

/// Rows removed by one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub feed_items_deleted: u64,
    pub notifications_deleted: u64,
}

/// Retention service.
#[derive(Clone)]
pub struct RetentionService {
    notifications: Arc<dyn NotificationStore>,
    config: RetentionConfig,
}

impl RetentionService {
    #[must_use]
    pub fn new(notifications: Arc<dyn NotificationStore>, config: RetentionConfig) -> Self {
        Self {
            notifications,
            config,
        }
    }

    /// Run every cleanup task.
    pub async fn run_cleanup(&self) -> AppResult<RetentionReport> {
        self.run(CleanupTask::All).await
    }

    /// Run one cleanup task. Unread notifications are never deleted.
    pub async fn run(&self, task: CleanupTask) -> AppResult<RetentionReport> {
        let mut report = RetentionReport::default();

        if matches!(task, CleanupTask::FeedItems | CleanupTask::All) {
            let cutoff = Utc::now() - Duration::days(i64::from(self.config.feed_item_days));
            report.feed_items_deleted = self
                .notifications
                .delete_feed_items_before(cutoff.into())
                .await?;
        }

        if matches!(task, CleanupTask::ReadNotifications | CleanupTask::All) {
            let cutoff =
                Utc::now() - Duration::days(i64::from(self.config.read_notification_days));
            report.notifications_deleted = self
                .notifications
                .delete_read_notifications_before(cutoff.into())
                .await?;
        }

        if report != RetentionReport::default() {
            info!(
                feed_items = report.feed_items_deleted,
                notifications = report.notifications_deleted,
                "Retention cleanup removed expired rows"
            );
        }

        Ok(report)
    }
}
