//! Axum router construction for the query API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws/chests` -- `WebSocket` stream of chest openings
/// - `GET /api/status` -- indexer status
/// - `GET /api/users/{address}` -- single user
/// - `GET /api/users/{address}/chests` -- chest history
/// - `GET /api/leaderboard` -- ranked users
/// - `GET /api/daily` -- daily summaries
/// - `GET /api/heatmap` -- weekday x hour counts
/// - `GET /api/sybil` -- timing features
///
/// CORS allows any origin; the API is read-only.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws/chests", get(ws::ws_chests))
        // REST API
        .route("/api/status", get(handlers::get_status))
        .route("/api/users/{address}", get(handlers::get_user))
        .route("/api/users/{address}/chests", get(handlers::get_user_chests))
        .route("/api/leaderboard", get(handlers::get_leaderboard))
        .route("/api/daily", get(handlers::get_daily))
        .route("/api/heatmap", get(handlers::get_heatmap))
        .route("/api/sybil", get(handlers::get_sybil))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
