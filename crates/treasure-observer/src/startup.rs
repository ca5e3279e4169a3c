//! Background startup helper used by the indexer binary.
//!
//! [`spawn_observer`] launches the query API on a background Tokio task so
//! it runs alongside the ingestion pipeline.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError, start_server};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the query API on a background task.
///
/// The address is validated before spawning so obvious misconfiguration
/// fails startup instead of surfacing later in the log. The server runs
/// until the runtime shuts down or the returned handle is aborted.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the configured address cannot be
/// parsed.
pub fn spawn_observer(
    config: ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let addr = config.socket_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = start_server(&config, state).await {
            tracing::error!(error = %e, "Query API exited with error");
        }
    });

    tracing::info!(%addr, "Query API spawned on background task");

    Ok(handle)
}
