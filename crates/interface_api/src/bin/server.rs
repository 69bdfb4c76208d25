//! Maji Core - API Server Binary
//!
//! This binary starts the HTTP API server for the water billing core.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin maji-api
//!
//! # Run with environment variables
//! API_HOST=0.0.0.0 API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin maji-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` - PostgreSQL connection string (optional; omit to run in-memory)
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_GRACE_DAYS` - Late-submission grace period in days (default: 3)
//! * `API_RETRY_SWEEP_SECS` - Notification sweep interval in seconds (default: 60)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use core_kernel::SystemClock;
use interface_api::{config::ApiConfig, create_router, AppState};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main entry point for the API server.
///
/// Initializes logging, loads configuration, optionally connects to
/// PostgreSQL, and starts the HTTP server with a background notification
/// sweep task.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - Database connection or migrations fail
/// - Server fails to bind to the configured address
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting Maji Core API Server"
    );

    // The pool is optional: without API_DATABASE_URL the server runs on the
    // in-process books alone.
    let pool = match &config.database_url {
        Some(url) => {
            let pool = create_database_pool(url).await?;
            run_migrations(&pool).await?;
            Some(pool)
        }
        None => {
            tracing::warn!("no database configured, running in-memory only");
            None
        }
    };

    let state = AppState::new(Arc::new(SystemClock), pool, config.clone());

    spawn_sweep_task(state.clone(), config.retry_sweep_secs);

    let app = create_router(state);

    let addr: SocketAddr = config.server_addr().parse()?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// # Arguments
///
/// * `log_level` - The minimum log level to output (trace, debug, info, warn, error)
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Creates a PostgreSQL connection pool.
///
/// # Arguments
///
/// * `database_url` - PostgreSQL connection string
///
/// # Errors
///
/// Returns error if connection to database fails
async fn create_database_pool(database_url: &str) -> Result<sqlx::PgPool, sqlx::Error> {
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    tracing::info!("Database connection established");
    Ok(pool)
}

/// Runs database migrations using SQLx.
///
/// # Arguments
///
/// * `pool` - Database connection pool
///
/// # Errors
///
/// Returns error if migrations fail to apply
async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    infra_db::MIGRATOR.run(pool).await?;
    tracing::info!("Database ready");
    Ok(())
}

/// Drives the periodic sweeps on a fixed interval.
///
/// Each pass moves overdue OPEN cycles into review, dispatches every
/// notification attempt that is due, and writes the touched records
/// through, the same work the manual sweep endpoint does.
fn spawn_sweep_task(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;

            let mut core = state.core.write().await;
            let overdue = core.sweep_overdue_cycles();
            let alerts_before = core.alerts().len();
            let orders = core.sweep_notifications();
            let mut changed = Vec::new();
            for order in &orders {
                if let Ok(record) = core.outbox.message(order.message_id) {
                    changed.push(record.clone());
                }
            }
            for alert in &core.alerts()[alerts_before..] {
                if let Ok(record) = core.outbox.message(alert.message_id) {
                    changed.push(record.clone());
                }
            }
            drop(core);

            for cycle in &overdue {
                if let Err(e) = state.persist.cycle_updated(cycle).await {
                    tracing::error!(error = %e, cycle = %cycle.id, "sweep write-through failed");
                }
            }
            for record in &changed {
                if let Err(e) = state.persist.notification_updated(record).await {
                    tracing::error!(error = %e, message = %record.id, "sweep write-through failed");
                }
            }

            if !orders.is_empty() {
                // TODO: hand the orders to a real SMS gateway adapter once
                // one is configured; until then delivery callbacks come in
                // through the API.
                tracing::info!(dispatched = orders.len(), "notification sweep pass");
            }
        }
    });
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// This enables graceful shutdown of the server, allowing in-flight
/// requests to complete before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
