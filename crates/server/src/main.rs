//! rewear server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use apalis::prelude::*;
use axum::{Router, middleware};
use rewear_api::{AppState, auth_middleware, router as api_router};
use rewear_common::Config;
use rewear_core::{
    FanOutDispatcher, FanOutQueue, FollowingService, JobService, JobWorkerContext, ListingService,
    ModerationService, NotificationService, RetentionService,
};
use rewear_db::repositories::{
    ArticleRepository, FollowingRepository, NotificationRepository, UserRepository,
};
use rewear_queue::{
    FanOutWorkerContext, RedisFanOutQueue, SchedulerConfig, fan_out_storage, fan_out_worker,
    run_scheduler,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rewear=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting rewear server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(rewear_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    rewear_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let listings = Arc::new(ArticleRepository::new(Arc::clone(&db)));
    let graph = Arc::new(FollowingRepository::new(Arc::clone(&db)));
    let notifications = Arc::new(NotificationRepository::new(Arc::clone(&db)));
    let users = Arc::new(UserRepository::new(Arc::clone(&db)));

    let dispatcher = FanOutDispatcher::new(
        graph.clone(),
        notifications.clone(),
        config.fan_out.clone(),
    );
    let retention = RetentionService::new(notifications.clone(), config.retention.clone());
    let scheduler_config = SchedulerConfig::from(&config.retention);

    // Start the fan-out worker and the retention scheduler
    let fan_out: Arc<dyn FanOutQueue> = if let Some(redis) = &config.redis {
        info!("Connecting to Redis job queue...");
        let storage = fan_out_storage(redis).await?;
        info!("Connected to Redis job queue");

        let ctx = FanOutWorkerContext::new(dispatcher, storage.clone());
        let worker_storage = storage.clone();
        tokio::spawn(async move {
            let monitor = Monitor::new().register({
                WorkerBuilder::new("fan-out")
                    .data(ctx)
                    .backend(worker_storage)
                    .build_fn(fan_out_worker)
            });

            if let Err(e) = monitor.run().await {
                error!(error = %e, "Fan-out worker failed");
            }
        });

        run_scheduler(scheduler_config, Arc::new(retention));
        Arc::new(RedisFanOutQueue::new(storage))
    } else {
        warn!("Redis not configured, running fan-out in-process");
        let jobs = JobService::new();
        let sender = jobs.sender();
        jobs.start(JobWorkerContext {
            dispatcher: Some(dispatcher),
            retention: Some(retention),
            ..Default::default()
        });

        run_scheduler(scheduler_config, Arc::new(sender.clone()));
        Arc::new(sender)
    };
    info!("Fan-out worker started");

    // Initialize services
    let mut moderation_service = ModerationService::new(
        listings.clone(),
        config.moderation.transaction_timeout(),
    );
    moderation_service.set_fan_out(fan_out.clone());

    let mut listing_service = ListingService::new(listings);
    listing_service.set_fan_out(fan_out);

    let state = AppState {
        moderation_service,
        following_service: FollowingService::new(graph.clone(), notifications.clone()),
        notification_service: NotificationService::new(notifications, graph, users.clone()),
        listing_service,
        users,
    };

    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
