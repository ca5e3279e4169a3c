//! Per-user timing features for sybil screening.
//!
//! Scripts farming chests from many wallets tend to open at regular, tight
//! intervals. For each user with at least one opening this module computes:
//!
//! - lifetime counters, copied from the [`User`] record
//! - mean gap between consecutive openings (whole seconds)
//! - burst count: consecutive openings closer than the burst window
//! - number of distinct UTC days with activity, and the busiest day's count
//!
//! Clustering the resulting vectors is left to downstream tooling.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use treasure_types::{Address, ChestOpened, DateKey, User, to_iso_date};

/// Default burst window in seconds.
pub const DEFAULT_BURST_WINDOW_SECS: u64 = 60;

/// Scan parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SybilQuery {
    /// Gaps strictly shorter than this count as a burst.
    pub burst_window_secs: u64,
    /// Only report users with at least this many bursts.
    pub min_bursts: u64,
}

impl Default for SybilQuery {
    fn default() -> Self {
        Self {
            burst_window_secs: DEFAULT_BURST_WINDOW_SECS,
            min_bursts: 0,
        }
    }
}

/// Feature vector for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SybilFeatures {
    /// Wallet address.
    pub user: Address,
    /// Lifetime regular chests.
    pub regular_chests: u64,
    /// Lifetime premium chests.
    pub premium_chests: u64,
    /// Lifetime total.
    pub total_chests: u64,
    /// Mean gap between openings; `None` with fewer than two openings.
    pub avg_interval_secs: Option<u64>,
    /// Gaps shorter than the burst window.
    pub burst_count: u64,
    /// Distinct UTC days with at least one opening.
    pub active_days: u64,
    /// Openings on the busiest day.
    pub max_daily_opens: u64,
}

/// Compute features for every user with recorded openings.
///
/// Results are sorted by burst count (descending), then address.
pub fn sybil_scan<'a>(
    users: impl IntoIterator<Item = &'a User>,
    chests: impl IntoIterator<Item = &'a ChestOpened>,
    query: &SybilQuery,
) -> Vec<SybilFeatures> {
    let mut timestamps: BTreeMap<&Address, Vec<u64>> = BTreeMap::new();
    for chest in chests {
        timestamps.entry(&chest.user).or_default().push(chest.timestamp);
    }

    let mut features: Vec<SybilFeatures> = users
        .into_iter()
        .filter_map(|user| {
            let stamps = timestamps.get_mut(&user.id)?;
            stamps.sort_unstable();
            Some(extract(user, stamps, query.burst_window_secs))
        })
        .filter(|f| f.burst_count >= query.min_bursts)
        .collect();

    features.sort_by(|a, b| {
        b.burst_count
            .cmp(&a.burst_count)
            .then_with(|| a.user.cmp(&b.user))
    });
    features
}

fn extract(user: &User, sorted: &[u64], burst_window_secs: u64) -> SybilFeatures {
    let gaps: Vec<u64> = sorted
        .windows(2)
        .filter_map(|pair| match pair {
            [earlier, later] => Some(later.saturating_sub(*earlier)),
            _ => None,
        })
        .collect();

    let gap_sum = gaps.iter().fold(0_u64, |acc, gap| acc.saturating_add(*gap));
    let avg_interval_secs = u64::try_from(gaps.len())
        .ok()
        .and_then(|n| gap_sum.checked_div(n));

    let burst_count = u64::try_from(gaps.iter().filter(|gap| **gap < burst_window_secs).count())
        .unwrap_or(u64::MAX);

    let mut per_day: BTreeMap<DateKey, u64> = BTreeMap::new();
    for ts in sorted {
        let count = per_day.entry(to_iso_date(*ts)).or_insert(0);
        *count = count.saturating_add(1);
    }

    SybilFeatures {
        user: user.id.clone(),
        regular_chests: user.lifetime_chest_count,
        premium_chests: user.lifetime_premium_chest_count,
        total_chests: user.lifetime_total_chest_count,
        avg_interval_secs,
        burst_count,
        active_days: u64::try_from(per_day.len()).unwrap_or(u64::MAX),
        max_daily_opens: per_day.values().copied().max().unwrap_or(0),
    }
}
