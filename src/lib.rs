//! Lottery API
//!
//! REST backend for a toy lottery: read the active round, list recent
//! winners and register entries.
//!
//! - **`routes`**: axum handlers for `/api/lottery/*` and `/health`.
//! - **`db`**: the `Storage` repository trait with an in-memory and a SQLite
//!   implementation, both seeded with fixture data.
//! - **`models`**: rounds, players, winners and the response bodies.
//! - **`error`**: storage errors and their mapping to HTTP responses.
//! - **`config`**: environment-driven server settings.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;

use db::SharedStorage;

/// Build the application router around an injected store.
pub fn app(store: SharedStorage) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Root and health
        .route("/", get(|| async { "Lottery API - v1.0" }))
        .route("/health", get(routes::health::health_check))

        // Lottery endpoints
        .route("/api/lottery/current", get(routes::lottery::get_current_round))
        .route("/api/lottery/winners", get(routes::lottery::get_recent_winners))
        .route("/api/lottery/enter", post(routes::lottery::enter_lottery))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}
