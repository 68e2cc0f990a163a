//! Fan-out worker.

use std::time::Duration;

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use chrono::{DateTime, Utc};
use rewear_core::{FanOutDispatcher, FanOutStep};
use tracing::{debug, error, info};

use crate::jobs::FanOutJob;

/// Context for the fan-out worker.
#[derive(Clone)]
pub struct FanOutWorkerContext {
    pub dispatcher: FanOutDispatcher,
    /// Storage follow-up attempts are scheduled on.
    pub storage: RedisStorage<FanOutJob>,
}

impl FanOutWorkerContext {
    /// Create a new fan-out worker context.
    #[must_use]
    pub const fn new(dispatcher: FanOutDispatcher, storage: RedisStorage<FanOutJob>) -> Self {
        Self {
            dispatcher,
            storage,
        }
    }
}

/// Worker function for fan-out jobs.
///
/// An incomplete fan-out is scheduled on the storage as a follow-up job
/// before this one is acknowledged. A job that exhausted its attempts fails,
/// which leaves it in the storage's failed set.
///
/// # Errors
/// Returns an error if the fan-out was dead-lettered or the follow-up could
/// not be scheduled; apalis then keeps this job.
pub async fn fan_out_worker(job: FanOutJob, ctx: Data<FanOutWorkerContext>) -> Result<(), Error> {
    info!(
        article_id = %job.event.article_id,
        kind = ?job.event.kind,
        attempt = job.attempt,
        "Running fan-out"
    );

    match ctx
        .dispatcher
        .run_job(&job.event, job.recipients.clone(), job.attempt)
        .await
    {
        FanOutStep::Done(_) => Ok(()),
        FanOutStep::Retry {
            recipients,
            attempt,
            delay,
        } => {
            let article_id = job.event.article_id.clone();
            let run_at = retry_at(Utc::now(), delay);
            let retry = FanOutJob::retry(job.event, recipients, attempt);

            ctx.storage
                .clone()
                .schedule(retry, run_at)
                .await
                .map_err(|e| {
                    error!(article_id = %article_id, error = %e, "Failed to schedule fan-out retry");
                    let reason: Box<dyn std::error::Error + Send + Sync> =
                        format!("failed to schedule fan-out retry: {e}").into();
                    Error::Failed(reason.into())
                })?;

            debug!(article_id = %article_id, attempt, run_at, "Scheduled fan-out retry");
            Ok(())
        }
        FanOutStep::DeadLetter(entry) => {
            let reason: Box<dyn std::error::Error + Send + Sync> = format!(
                "fan-out for {} failed after {} attempts: {}",
                entry.job.article_id, entry.attempts, entry.last_error
            )
            .into();
            Err(Error::Failed(reason.into()))
        }
    }
}

/// Unix timestamp a follow-up becomes due, rounded up to whole seconds.
fn retry_at(now: DateTime<Utc>, delay: Duration) -> i64 {
    let secs = delay
        .as_secs()
        .saturating_add(u64::from(delay.subsec_nanos() > 0));
    now.timestamp()
        .saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))
}
