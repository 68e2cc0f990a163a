//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::*;
use chrono::Utc;
use rewear_common::config::{FanOutConfig, RedisConfig};
use rewear_core::{FanOutDispatcher, FanOutEvent, FanOutKind, FanOutQueue};
use rewear_db::entities::following;
use rewear_db::memory::{MemoryNotificationStore, MemorySocialGraph};
use rewear_db::stores::SocialGraphStore;
use rewear_queue::{
    FanOutJob, FanOutWorkerContext, RedisFanOutQueue, fan_out_storage, fan_out_worker,
};

fn redis_config() -> RedisConfig {
    RedisConfig {
        url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        prefix: format!("rewear-test-{}", Utc::now().timestamp_micros()),
    }
}

fn event() -> FanOutEvent {
    FanOutEvent {
        kind: FanOutKind::NewArticle,
        actor_id: "seller1".to_string(),
        article_id: "a1".to_string(),
        article_title: "Wool coat".to_string(),
    }
}

async fn follower_graph() -> MemorySocialGraph {
    let graph = MemorySocialGraph::new();
    for follower in ["f1", "f2"] {
        graph
            .create_edge(following::Model {
                id: format!("edge-{follower}"),
                follower_id: follower.to_string(),
                following_id: "seller1".to_string(),
                created_at: Utc::now().into(),
            })
            .await
            .unwrap();
    }
    graph
}

/// Test that the fan-out storage connects.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_connection() {
    let storage = fan_out_storage(&redis_config()).await;
    assert!(storage.is_ok(), "Failed to connect to Redis: {:?}", storage.err());
}

/// Test that an enqueued event is delivered by the apalis worker.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_enqueued_fan_out_is_processed_by_worker() {
    let storage = fan_out_storage(&redis_config()).await.unwrap();

    let graph = follower_graph().await;
    let store = MemoryNotificationStore::new();
    let dispatcher = FanOutDispatcher::new(
        Arc::new(graph),
        Arc::new(store.clone()),
        FanOutConfig::default(),
    );

    RedisFanOutQueue::new(storage.clone())
        .enqueue_fan_out(event())
        .await
        .unwrap();

    let ctx = FanOutWorkerContext::new(dispatcher, storage.clone());
    let worker = tokio::spawn(async move {
        Monitor::new()
            .register(
                WorkerBuilder::new("fan-out-test")
                    .data(ctx)
                    .backend(storage)
                    .build_fn(fan_out_worker),
            )
            .run()
            .await
    });

    tokio::time::timeout(Duration::from_secs(10), async {
        while store.notifications().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(store.feed_items().await.len(), 1);
    worker.abort();
}

/// Test that an incomplete fan-out is stored as a follow-up job before the
/// worker returns, so a fresh worker finishes it.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_incomplete_fan_out_survives_worker_restart() {
    let config = redis_config();
    let store = MemoryNotificationStore::new();
    let dispatcher = FanOutDispatcher::new(
        Arc::new(follower_graph().await),
        Arc::new(store.clone()),
        FanOutConfig {
            batch_size: 100,
            batch_timeout_ms: 1000,
            max_batch_attempts: 1,
            max_job_attempts: 3,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 10,
        },
    );

    store.fail_next_batches(1);
    let first_run = FanOutWorkerContext::new(
        dispatcher.clone(),
        fan_out_storage(&config).await.unwrap(),
    );
    fan_out_worker(FanOutJob::new(event()), Data::new(first_run))
        .await
        .unwrap();

    assert_eq!(store.feed_items().await.len(), 1);
    assert!(store.notifications().await.is_empty());

    let storage = fan_out_storage(&config).await.unwrap();
    let ctx = FanOutWorkerContext::new(dispatcher, storage.clone());
    let worker = tokio::spawn(async move {
        Monitor::new()
            .register(
                WorkerBuilder::new("fan-out-restart-test")
                    .data(ctx)
                    .backend(storage)
                    .build_fn(fan_out_worker),
            )
            .run()
            .await
    });

    tokio::time::timeout(Duration::from_secs(15), async {
        while store.notifications().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    let mut recipients: Vec<_> = store
        .notifications()
        .await
        .into_iter()
        .map(|n| n.user_id)
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec!["f1", "f2"]);
    assert_eq!(store.feed_items().await.len(), 1);
    worker.abort();
}
