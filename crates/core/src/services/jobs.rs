//! In-process job queue for background work.
//!
//! Fan-out and retention run here when no durable queue is configured. Jobs
//! are drained by a small worker pool; incomplete fan-outs are re-enqueued
//! after a backoff delay.

use std::sync::Arc;

use async_trait::async_trait;
use rewear_common::{AppError, AppResult};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::retry::DeadLetterEntry;
use crate::services::fan_out::{FanOutDispatcher, FanOutEvent, FanOutQueue, FanOutStep};
use crate::services::retention::{CleanupTask, RetentionService};

/// Maximum number of concurrent job workers.
const MAX_WORKERS: usize = 4;

/// Channel buffer size for jobs.
const JOB_BUFFER_SIZE: usize = 1000;

/// Job types that can be processed.
#[derive(Debug, Clone)]
pub enum Job {
    /// Propagate a publishing event. `recipients` is set when resuming a
    /// partially delivered fan-out.
    FanOut {
        event: FanOutEvent,
        recipients: Option<Vec<String>>,
        attempt: u32,
    },
    /// Prune expired rows.
    Cleanup { task: CleanupTask },
}

/// Fan-out jobs that exhausted their retries.
#[derive(Clone, Default)]
pub struct DeadLetters {
    entries: Arc<Mutex<Vec<DeadLetterEntry<FanOutEvent>>>>,
}

impl DeadLetters {
    pub async fn push(&self, entry: DeadLetterEntry<FanOutEvent>) {
        self.entries.lock().await.push(entry);
    }

    pub async fn entries(&self) -> Vec<DeadLetterEntry<FanOutEvent>> {
        self.entries.lock().await.clone()
    }
}

/// Job sender for enqueueing jobs.
#[derive(Clone)]
pub struct JobSender {
    sender: mpsc::Sender<Job>,
}

impl JobSender {
    /// Enqueue a job for processing.
    pub async fn enqueue(&self, job: Job) -> AppResult<()> {
        self.sender
            .send(job)
            .await
            .map_err(|_| AppError::Queue("Job queue is closed".to_string()))
    }

    /// Enqueue a cleanup job.
    pub async fn cleanup(&self, task: CleanupTask) -> AppResult<()> {
        self.enqueue(Job::Cleanup { task }).await
    }
}

#[async_trait]
impl FanOutQueue for JobSender {
    /// Never waits for buffer space. When the channel is full the job is
    /// handed to a task that waits instead.
    async fn enqueue_fan_out(&self, event: FanOutEvent) -> AppResult<()> {
        let job = Job::FanOut {
            event,
            recipients: None,
            attempt: 0,
        };

        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                warn!("Job queue is full, deferring fan-out");
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    if sender.send(job).await.is_err() {
                        error!("Job queue closed before deferred fan-out was enqueued");
                    }
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(AppError::Queue("Job queue is closed".to_string())),
        }
    }
}

/// Job worker context containing services needed for job processing.
#[derive(Clone, Default)]
pub struct JobWorkerContext {
    pub dispatcher: Option<FanOutDispatcher>,
    pub retention: Option<RetentionService>,
    pub dead_letters: DeadLetters,
}

/// Job processing service.
pub struct JobService {
    sender: mpsc::Sender<Job>,
    receiver: mpsc::Receiver<Job>,
}

impl JobService {
    /// Create a new job service.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(JOB_BUFFER_SIZE)
    }

    /// Create a job service whose channel buffers `capacity` jobs.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self { sender, receiver }
    }

    /// Get a job sender for enqueueing jobs.
    #[must_use]
    pub fn sender(&self) -> JobSender {
        JobSender {
            sender: self.sender.clone(),
        }
    }

    /// Start the job processor with the given context.
    ///
    /// The processor stops once every [`JobSender`] is dropped.
    pub fn start(self, context: JobWorkerContext) -> JoinHandle<()> {
        let Self { sender, receiver } = self;
        let retry_sender = sender.downgrade();
        drop(sender);
        let context = Arc::new(context);

        tokio::spawn(async move {
            info!("Job worker starting with {} workers", MAX_WORKERS);
            run_job_processor(receiver, retry_sender, context).await;
            info!("Job worker stopped");
        })
    }
}

impl Default for JobService {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the job processor.
async fn run_job_processor(
    mut receiver: mpsc::Receiver<Job>,
    retry_sender: mpsc::WeakSender<Job>,
    context: Arc<JobWorkerContext>,
) {
    let semaphore = Arc::new(Semaphore::new(MAX_WORKERS));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let ctx = context.clone();
        let retry_sender = retry_sender.clone();

        tokio::spawn(async move {
            let _permit = permit;
            process_job(job, &ctx, retry_sender).await;
        });
    }
}

/// Process a single job.
async fn process_job(job: Job, context: &JobWorkerContext, retry_sender: mpsc::WeakSender<Job>) {
    match job {
        Job::FanOut {
            event,
            recipients,
            attempt,
        } => {
            process_fan_out(context, event, recipients, attempt, retry_sender).await;
        }
        Job::Cleanup { task } => {
            process_cleanup(context, task).await;
        }
    }
}

/// Process a fan-out job.
async fn process_fan_out(
    context: &JobWorkerContext,
    event: FanOutEvent,
    recipients: Option<Vec<String>>,
    attempt: u32,
    retry_sender: mpsc::WeakSender<Job>,
) {
    let Some(ref dispatcher) = context.dispatcher else {
        debug!("Fan-out dispatcher not available, skipping event");
        return;
    };

    match dispatcher.run_job(&event, recipients, attempt).await {
        FanOutStep::Done(_) => {}
        FanOutStep::Retry {
            recipients,
            attempt,
            delay,
        } => {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;

                let Some(sender) = retry_sender.upgrade() else {
                    warn!(article_id = %event.article_id, "Job queue closed, dropping fan-out retry");
                    return;
                };

                let article_id = event.article_id.clone();
                let job = Job::FanOut {
                    event,
                    recipients,
                    attempt,
                };
                if sender.send(job).await.is_err() {
                    error!(article_id = %article_id, "Failed to re-enqueue fan-out");
                }
            });
        }
        FanOutStep::DeadLetter(entry) => {
            context.dead_letters.push(entry).await;
        }
    }
}

/// Process a cleanup job.
async fn process_cleanup(context: &JobWorkerContext, task: CleanupTask) {
    let Some(ref retention) = context.retention else {
        debug!("Retention service not available, skipping cleanup");
        return;
    };

    match retention.run(task).await {
        Ok(report) => {
            debug!(
                task = ?task,
                feed_items = report.feed_items_deleted,
                notifications = report.notifications_deleted,
                "Cleanup finished"
            );
        }
        Err(e) => {
            error!(task = ?task, error = %e, "Cleanup failed");
        }
    }
}
