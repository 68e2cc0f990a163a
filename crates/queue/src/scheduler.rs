//! Periodic retention jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rewear_common::config::RetentionConfig;
use rewear_core::{CleanupTask, JobSender, RetentionService};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledJob {
    /// Delete expired feed items.
    PruneFeedItems,
    /// Delete expired read notifications.
    PruneReadNotifications,
}

impl ScheduledJob {
    const ALL: [Self; 2] = [Self::PruneFeedItems, Self::PruneReadNotifications];

    const fn task(self) -> CleanupTask {
        match self {
            Self::PruneFeedItems => CleanupTask::FeedItems,
            Self::PruneReadNotifications => CleanupTask::ReadNotifications,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between retention runs (default: 1 hour).
    pub cleanup_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl From<&RetentionConfig> for SchedulerConfig {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            cleanup_interval: config.cleanup_interval(),
        }
    }
}

/// Job executor trait for scheduled jobs.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Execute a scheduled job. Returns the number of rows removed, or zero
    /// when the work was handed off to a queue.
    async fn execute(&self, job: ScheduledJob) -> Result<u64, JobError>;
}

/// Runs retention inline.
#[async_trait]
impl JobExecutor for RetentionService {
    async fn execute(&self, job: ScheduledJob) -> Result<u64, JobError> {
        let report = self.run(job.task()).await?;
        Ok(report.feed_items_deleted + report.notifications_deleted)
    }
}

/// Hands retention off to the in-process job queue.
#[async_trait]
impl JobExecutor for JobSender {
    async fn execute(&self, job: ScheduledJob) -> Result<u64, JobError> {
        self.cleanup(job.task()).await?;
        Ok(0)
    }
}

/// Run the scheduler with the given configuration and executor.
///
/// The first run happens immediately. Abort the returned handle to stop.
pub fn run_scheduler<E: JobExecutor + 'static>(
    config: SchedulerConfig,
    executor: Arc<E>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(config.cleanup_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            for job in ScheduledJob::ALL {
                match executor.execute(job).await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!(job = ?job, count, "Retention job removed rows");
                        }
                    }
                    Err(e) => {
                        tracing::error!(job = ?job, error = %e, "Retention job failed");
                    }
                }
            }
        }
    })
}
