//! Event aggregation core for the Daily Treasure indexer.
//!
//! Receives decoded contract events one at a time, in chain order, and
//! maintains three derived collections: per-user lifetime counters,
//! per-day counters, and one record per chest-opening transaction.
//!
//! # Modules
//!
//! - [`repository`] -- The [`Repository`] get/put trait, the generic
//!   [`get_or_create`] helper, and the in-memory implementation.
//! - [`aggregator`] -- The [`Aggregator`]: one operation per event kind,
//!   duplicate policy, and ordering checks.
//! - [`memory`] -- [`MemoryAggregator`]: hydration from storage and
//!   pending-write collection for flushes.
//! - [`conservation`] -- Invariant verification across collections.
//!
//! # Usage
//!
//! ```
//! use treasure_aggregator::{DedupPolicy, MemoryAggregator, Repository};
//! use treasure_types::{Address, TxHash};
//!
//! let mut aggregator = MemoryAggregator::in_memory(DedupPolicy::Strict);
//! let user = Address::new("0xAbC");
//! aggregator.on_chest_opened(&user, &TxHash::new("0x01"), 1_700_000_000);
//! aggregator.on_premium_user_added(&user);
//!
//! let stored = aggregator.users().get(&user);
//! assert_eq!(stored.map(|u| (u.lifetime_total_chest_count, u.is_premium_user)), Some((1, true)));
//! assert!(aggregator.verify_conservation().is_balanced());
//! ```

pub mod aggregator;
pub mod conservation;
pub mod memory;
pub mod repository;

// Re-export primary types at crate root.
pub use aggregator::{Aggregator, AggregatorStats, DedupPolicy, HandleOutcome};
pub use conservation::{ConservationResult, verify_conservation};
pub use memory::{MemoryAggregator, PendingWrites, Snapshot};
pub use repository::{MemoryRepository, Repository, get_or_create};

use treasure_types::{Address, DateKey};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while rebuilding the working set from storage.
///
/// Applying events never fails; only hydration can.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// Two stored rows share a key.
    #[error("duplicate {collection} record for key {key}")]
    DuplicateRecord {
        /// Collection name.
        collection: &'static str,
        /// The repeated key.
        key: String,
    },

    /// A chest record references a user that was not loaded.
    #[error("chest {tx_hash} references unknown user {user}")]
    DanglingUser {
        /// Chest transaction hash.
        tx_hash: String,
        /// Referenced address.
        user: String,
    },
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A conservation violation found by [`verify_conservation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConservationAnomaly {
    /// Users whose total differs from regular + premium.
    pub inconsistent_users: Vec<Address>,
    /// Days whose total differs from regular + premium.
    pub inconsistent_days: Vec<DateKey>,
    /// Sum of user lifetime totals.
    pub user_total: u64,
    /// Sum of daily totals.
    pub daily_total: u64,
    /// Human-readable description.
    pub message: String,
}

impl core::fmt::Display for ConservationAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
