//! HTTP API Layer
//!
//! This crate provides the REST API for the water billing core using Axum.
//!
//! # Architecture
//!
//! - **CoreService**: the in-process authoritative books behind one lock
//! - **Handlers**: request handlers for each domain
//! - **Persistence**: write-through of accepted mutations to PostgreSQL
//! - **Middleware**: authentication, authorization, tracing, audit logging
//! - **DTOs**: request/response data transfer objects
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod persistence;
pub mod state;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use core_kernel::Clock;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{cycles, health, ledger, metering, notify, sync};
use crate::middleware::{audit_middleware, auth_middleware};
use crate::persistence::Persistence;
use crate::state::CoreService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RwLock<CoreService>>,
    pub persist: Arc<Persistence>,
    /// Present when write-through persistence is configured
    pub pool: Option<PgPool>,
    pub config: ApiConfig,
}

impl AppState {
    /// Builds the shared state; without a pool every write-through is a
    /// no-op and the in-process books are the only store.
    pub fn new(clock: Arc<dyn Clock>, pool: Option<PgPool>, config: ApiConfig) -> Self {
        let persist = match &pool {
            Some(pool) => Persistence::new(pool.clone()),
            None => Persistence::disabled(),
        };
        Self {
            core: Arc::new(RwLock::new(CoreService::new(clock, &config))),
            persist: Arc::new(persist),
            pool,
            config,
        }
    }
}

/// Creates the main API router
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    // Cycle routes
    let cycle_routes = Router::new()
        .route("/", post(cycles::schedule_cycles))
        .route("/", get(cycles::list_cycles))
        .route("/:id", get(cycles::get_cycle))
        .route("/:id/transition", post(cycles::transition_cycle));

    // Assignment routes
    let assignment_routes = Router::new()
        .route("/", post(metering::assign_meter))
        .route("/:id/end", post(metering::end_assignment));

    // Reading routes
    let reading_routes = Router::new()
        .route("/", post(metering::submit_reading))
        .route("/:id", get(metering::get_reading))
        .route("/:id/approve", post(metering::approve_reading))
        .route("/:id/reject", post(metering::reject_reading))
        .route("/:id/rollover", post(metering::verify_rollover));

    // Conflict routes
    let conflict_routes = Router::new()
        .route("/", get(metering::list_conflicts))
        .route("/:id/resolve", post(metering::resolve_conflict));

    // Anomaly routes
    let anomaly_routes = Router::new()
        .route("/", get(metering::list_anomalies))
        .route("/:id/acknowledge", post(metering::acknowledge_anomaly))
        .route("/:id/resolve", post(metering::resolve_anomaly));

    // Ledger routes
    let ledger_routes = Router::new()
        .route("/tariffs", post(ledger::add_tariff))
        .route("/payments", post(ledger::record_payment))
        .route("/penalties", post(ledger::apply_penalty))
        .route("/penalties/:id/waive", post(ledger::waive_penalty))
        .route("/clients/:id/balance", get(ledger::get_balance))
        .route("/clients/:id/entries", get(ledger::list_entries));

    // Notification routes
    let notification_routes = Router::new()
        .route("/", post(notify::enqueue_notification))
        .route("/sweep", post(notify::sweep_notifications))
        .route("/alerts", get(notify::list_alerts))
        .route("/:id", get(notify::get_notification))
        .route("/:id/delivery", post(notify::delivery_callback));

    // Sync routes
    let sync_routes = Router::new()
        .route("/bootstrap", get(sync::bootstrap))
        .route("/delta", get(sync::delta))
        .route("/upload", post(sync::upload));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/cycles", cycle_routes)
        .nest("/assignments", assignment_routes)
        .nest("/readings", reading_routes)
        .nest("/conflicts", conflict_routes)
        .nest("/anomalies", anomaly_routes)
        .nest("/ledger", ledger_routes)
        .nest("/notifications", notification_routes)
        .nest("/sync", sync_routes)
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
