use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contentpipe_db::PgBacklog;
use contentpipe_store::HttpContentStore;
use contentpipe_worker::capabilities::ThumbnailFunction;
use contentpipe_worker::config::WorkerConfig;
use contentpipe_worker::executor::Executor;
use contentpipe_worker::limiter::QueueLimiter;
use contentpipe_worker::poller::{IntentPoller, PollerConfig};
use contentpipe_worker::registry::CapabilityRegistry;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contentpipe_worker=debug,contentpipe_db=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        content_api_url = %config.content_api_url,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    let backlog = PgBacklog::new(pool);
    backlog
        .migrate()
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Content store client ---
    let store = HttpContentStore::new(&config.content_api_url)
        .expect("Failed to build content store client");

    // --- Capability registry ---
    let mut registry = CapabilityRegistry::new();
    registry.register(ThumbnailFunction::NAME, Arc::new(ThumbnailFunction));
    let registry = Arc::new(registry);
    tracing::info!(capabilities = ?registry.supported_names(), "Capability registry built");

    // --- Poller ---
    let executor = Arc::new(Executor::new(Arc::new(store), config.worker_id.clone()));
    let limiter = Arc::new(QueueLimiter::new(
        &config.queue_limits,
        config.default_queue_limit,
    ));
    let poller = IntentPoller::new(
        Arc::new(backlog),
        registry,
        executor,
        limiter,
        PollerConfig::from(&config),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // Runs until cancelled, then drains in-flight attempts.
    poller.run(cancel).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the worker
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
