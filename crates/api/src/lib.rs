//! HTTP API server for the bookstore checkout core.
//!
//! Provides REST endpoints for carts, checkout, order history, catalog
//! inventory and replenishment requests, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{CartService, CheckoutCoordinator};
use metrics_exporter_prometheus::PrometheusHandle;
use storage::Storage;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Storage> {
    pub store: S,
    pub carts: CartService<S>,
    pub coordinator: CheckoutCoordinator<S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Storage>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/customers/{id}/cart",
            get(routes::cart::view::<S>)
                .post(routes::cart::add::<S>)
                .delete(routes::cart::clear::<S>),
        )
        .route(
            "/customers/{id}/cart/{book_id}",
            put(routes::cart::set::<S>).delete(routes::cart::remove::<S>),
        )
        .route("/customers/{id}/logout", post(routes::cart::logout::<S>))
        .route(
            "/customers/{id}/checkout",
            post(routes::checkout::checkout::<S>),
        )
        .route(
            "/customers/{id}/orders",
            get(routes::orders::history::<S>),
        )
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/books/{isbn}",
            put(routes::books::register::<S>)
                .get(routes::books::get::<S>)
                .delete(routes::books::remove::<S>),
        )
        .route("/books/{isbn}/restock", post(routes::books::restock::<S>))
        .route("/replenishments", get(routes::replenishments::list::<S>))
        .route(
            "/replenishments/{id}/resolve",
            post(routes::replenishments::resolve::<S>),
        )
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

/// Creates the default application state over the given store.
pub fn create_default_state<S: Storage>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        carts: CartService::new(store.clone()),
        coordinator: CheckoutCoordinator::new(store.clone()),
        store,
    })
}
