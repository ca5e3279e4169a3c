//! Read-side queries over the Daily Treasure aggregates.
//!
//! Every function here is pure: it takes borrowed entity records (usually
//! straight out of the aggregator's repositories) and returns a
//! serializable view. Nothing in this crate mutates state.
//!
//! | Query | Input | Output |
//! |-------|-------|--------|
//! | [`leaderboard`] | users, chest records | ranked [`LeaderboardEntry`] list |
//! | [`user_history`] | chest records | one user's openings, newest first |
//! | [`daily_series`] | daily summaries | summaries ascending by date |
//! | [`heatmap`] | chest records | weekday x hour counts per tier |
//! | [`sybil_scan`] | users, chest records | per-user timing features |

pub mod heatmap;
pub mod history;
pub mod leaderboard;
pub mod sybil;

pub use heatmap::{Heatmap, HeatmapQuery, heatmap};
pub use history::{DEFAULT_HISTORY_LIMIT, daily_series, user_history};
pub use leaderboard::{LeaderboardEntry, LeaderboardQuery, LeaderboardSort, leaderboard};
pub use sybil::{DEFAULT_BURST_WINDOW_SECS, SybilFeatures, SybilQuery, sybil_scan};

/// Errors from parsing query parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyticsError {
    /// Unrecognised leaderboard sort key.
    #[error("unknown sort key '{0}' (expected total, regular or premium)")]
    UnknownSort(String),

    /// Unrecognised chest tier.
    #[error("unknown chest type '{0}' (expected regular or premium)")]
    UnknownChestType(String),
}

/// Parse a chest tier from a query string value (case-insensitive).
pub fn parse_chest_kind(value: &str) -> Result<treasure_types::ChestKind, AnalyticsError> {
    match value.to_ascii_lowercase().as_str() {
        "regular" => Ok(treasure_types::ChestKind::Regular),
        "premium" => Ok(treasure_types::ChestKind::Premium),
        _ => Err(AnalyticsError::UnknownChestType(value.to_owned())),
    }
}
