//! Query API server for the Daily Treasure indexer.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/chests`) streaming each chest opening
//!   as it is applied, via [`tokio::sync::broadcast`]
//! - **REST endpoints** for users, chest history, the leaderboard, the
//!   daily series, the activity heatmap and the sybil feature scan
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! Handlers read the same [`MemoryAggregator`] the pipeline writes,
//! through a shared `RwLock`. Query logic lives in `treasure-analytics`;
//! this crate only parses parameters and shapes responses.
//!
//! [`MemoryAggregator`]: treasure_aggregator::MemoryAggregator

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_observer};
pub use state::{AppState, ChestBroadcast};
