//! Redis-backed fan-out queue.
//!
//! Pushes fan-out events to an apalis Redis storage for the fan-out worker
//! to process.

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use async_trait::async_trait;
use rewear_common::{AppError, AppResult, config::RedisConfig};
use rewear_core::{FanOutEvent, FanOutQueue};
use tracing::debug;

use crate::jobs::FanOutJob;

/// Open the apalis storage holding fan-out jobs.
pub async fn fan_out_storage(config: &RedisConfig) -> AppResult<RedisStorage<FanOutJob>> {
    let client = redis::Client::open(config.url.as_str())
        .map_err(|e| AppError::Config(format!("Invalid Redis URL: {e}")))?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .map_err(|e| AppError::Queue(format!("Failed to connect to Redis: {e}")))?;

    let namespace = format!("{}:fan_out", config.prefix);
    Ok(RedisStorage::new_with_config(
        conn,
        apalis_redis::Config::default().set_namespace(&namespace),
    ))
}

/// Redis-backed fan-out queue.
#[derive(Clone)]
pub struct RedisFanOutQueue {
    storage: RedisStorage<FanOutJob>,
}

impl RedisFanOutQueue {
    /// Create a new Redis fan-out queue.
    #[must_use]
    pub const fn new(storage: RedisStorage<FanOutJob>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl FanOutQueue for RedisFanOutQueue {
    async fn enqueue_fan_out(&self, event: FanOutEvent) -> AppResult<()> {
        let article_id = event.article_id.clone();

        self.storage
            .clone()
            .push(FanOutJob::new(event))
            .await
            .map_err(|e| AppError::Queue(format!("Failed to queue fan-out: {e}")))?;

        debug!(article_id = %article_id, "Queued fan-out job");
        Ok(())
    }
}
