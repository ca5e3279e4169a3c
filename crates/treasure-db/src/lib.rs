//! `PostgreSQL` persistence for the Daily Treasure indexer.
//!
//! The aggregator works on an in-memory working set. This crate stores that
//! working set durably and loads it back on startup.
//!
//! # Architecture
//!
//! ```text
//! Event applied
//!     |
//!     +-- Read/write working set --> MemoryAggregator (in process)
//!     |
//!     +-- Block boundary flush ---> PostgreSQL (PostgresPool)
//!         |-- UserStore          (users)
//!         |-- DailyStore         (daily_chest_opens)
//!         |-- ChestStore         (chest_opens)
//!         +-- ProcessedStore     (processed_events)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool, migrations, startup load and flush entry point
//! - [`user_store`], [`chest_store`], [`daily_store`], [`processed_store`]
//!   -- Per-table batch upserts and loads
//! - `flush` -- Transactional flush of pending writes and snapshot load
//! - [`error`] -- Shared error types

pub mod chest_store;
pub mod daily_store;
pub mod error;
mod flush;
pub mod postgres;
pub mod processed_store;
pub mod user_store;

// Re-export primary types for convenience.
pub use chest_store::{ChestRow, ChestStore};
pub use daily_store::{DailyRow, DailyStore};
pub use error::DbError;
pub use postgres::PostgresPool;
pub use processed_store::{ProcessedRow, ProcessedStore};
pub use user_store::{UserRow, UserStore};
