//! Shared type definitions for the Daily Treasure indexer.
//!
//! This crate is the single source of truth for the entity and event types
//! used across the workspace. Types defined here flow downstream to
//! `TypeScript` via `ts-rs` for the dashboards that read the query API.
//!
//! # Modules
//!
//! - [`ids`] -- Lowercase hex key wrappers (wallet address, transaction hash)
//! - [`date`] -- UTC calendar-day derivation for daily summaries
//! - [`entities`] -- `User`, `ChestOpened`, and `DailyChestOpen`
//! - [`events`] -- Decoded contract events and their chain position

pub mod date;
pub mod entities;
pub mod events;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use date::{DateKey, to_iso_date, utc_datetime};
pub use entities::{ChestKind, ChestOpened, DailyChestOpen, User};
pub use events::{ChestEvent, DecodedEvent, EventContext, EventCursor, EventKey};
pub use ids::{Address, TxHash};
