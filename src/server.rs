/// Server setup and initialization
///
/// Wires together all components: database pool, customer store, notification
/// dispatcher, and HTTP routes. Owns the process lifecycle: schema creation at
/// startup, graceful shutdown and pool close at exit.

use crate::{
    api::customers::{create_customer_routes, AppState},
    config::Config,
    customer::{database::open_pool, storage::CustomerStorage},
    runtime::notifier::{NotificationDispatcher, UniformDelay},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build shared application state from configuration
///
/// Opens the pool, creates the schema if absent and sets up the dispatcher
/// with a delay source drawn from the notification config.
pub async fn create_state(config: &Config) -> Result<AppState> {
    tracing::info!("🏗️ Initializing customer store");
    let pool = open_pool(&config.database).await?;
    let storage = CustomerStorage::new(pool);

    tracing::info!("📋 Ensuring customers schema exists");
    storage
        .init_schema()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize customers schema: {}", e))?;

    tracing::info!(
        "📨 Initializing notification dispatcher ({} + 0..{} units of {:?})",
        config.notification.base_units,
        config.notification.jitter_units,
        config.notification.unit
    );
    let delay = Arc::new(UniformDelay::from_config(&config.notification));
    let notifier = NotificationDispatcher::new(storage.clone(), delay);

    Ok(AppState::new(storage, notifier, config.auth.clone()))
}

/// Create the main Axum router from prepared state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint (ungated)
        .route("/healthz", get(health_check))
        // Customer API routes
        .merge(create_customer_routes(state.clone()))
        .with_state(state)
}

/// Start the HTTP server with the given configuration
///
/// Serves until Ctrl-C / SIGTERM, then closes the pool. Notification tasks
/// still waiting out their delay are abandoned at that point and their
/// customers keep `sms_sent = false`.
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting customer notification server...");

    let state = create_state(&config).await?;
    let app = create_router(state.clone());
    tracing::info!("✅ Application initialized successfully");

    // Bind to the configured address
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let pending = state.notifier.in_flight();
    if pending > 0 {
        tracing::warn!("⚠️ Shutting down with {} pending SMS notifications; they will not be recorded", pending);
    }

    state.storage.close().await;
    tracing::info!("👋 Server stopped");

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("❌ Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("❌ Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("🛑 Shutdown signal received");
}
