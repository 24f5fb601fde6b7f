//! HTTP API server for the order lifecycle engine.
//!
//! Exposes the engine operations as REST endpoints, with structured
//! logging (tracing) and Prometheus metrics.

pub mod backends;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, put};
use lifecycle::{LifecycleConfig, OrderLifecycle};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use backends::Backends;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list).post(routes::orders::create),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get).delete(routes::orders::cancel),
        )
        .route("/orders/{id}/status", put(routes::orders::update_status))
        .route("/users/{owner_id}/orders", get(routes::orders::list_by_owner))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over the given backends.
pub fn create_state(backends: Backends, config: LifecycleConfig) -> Arc<AppState> {
    Arc::new(AppState {
        lifecycle: OrderLifecycle::with_config(
            backends.store,
            backends.cache,
            backends.channel,
            config,
        ),
    })
}

/// Creates the default application state with in-memory backends.
pub fn create_default_state() -> Arc<AppState> {
    let config = config::Config::default();
    create_state(Backends::in_memory(&config), config.lifecycle_config())
}
