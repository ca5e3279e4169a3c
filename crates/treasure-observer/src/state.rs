//! Shared application state for the query API server.
//!
//! [`AppState`] holds the aggregator shared with the indexer pipeline and
//! the broadcast channel for newly opened chests. REST handlers take the
//! read lock for the duration of one query; the pipeline takes the write
//! lock for one event at a time, so a query never sees a half-applied
//! event.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use treasure_aggregator::{DedupPolicy, MemoryAggregator};
use treasure_types::{Address, ChestOpened, TxHash};

/// Capacity of the broadcast channel for chest notifications.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BROADCAST_CAPACITY: usize = 1024;

/// JSON message pushed over the `WebSocket` for each chest opening.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChestBroadcast {
    /// Block containing the opening.
    pub block_number: u64,
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Opening user.
    pub user: Address,
    /// Unix seconds.
    pub timestamp: u64,
    /// Tier flag.
    pub is_premium: bool,
}

impl ChestBroadcast {
    /// Build a message from a stored chest record.
    pub fn from_record(block_number: u64, chest: &ChestOpened) -> Self {
        Self {
            block_number,
            tx_hash: chest.id.clone(),
            user: chest.user.clone(),
            timestamp: chest.timestamp,
            is_premium: chest.is_premium,
        }
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast sender for chest notifications.
    pub tx: broadcast::Sender<ChestBroadcast>,
    /// The working set, shared with the pipeline.
    pub aggregator: Arc<RwLock<MemoryAggregator>>,
}

impl AppState {
    /// Create state around an existing aggregator handle.
    pub fn new(aggregator: Arc<RwLock<MemoryAggregator>>) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx, aggregator }
    }

    /// Subscribe to chest notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ChestBroadcast> {
        self.tx.subscribe()
    }

    /// Publish a chest notification to all connected clients.
    ///
    /// Returns the number of receivers, 0 when no client is connected.
    pub fn broadcast(&self, message: &ChestBroadcast) -> usize {
        // send only fails when there are no receivers.
        self.tx.send(message.clone()).unwrap_or(0)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(RwLock::new(MemoryAggregator::in_memory(
            DedupPolicy::default(),
        ))))
    }
}
