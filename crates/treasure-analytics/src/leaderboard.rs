//! Chest leaderboard.
//!
//! Users are ranked by one of their lifetime counters. When a chest tier or
//! a `since` timestamp is given, only users with at least one matching
//! opening qualify; the ranking still uses lifetime counters and the number
//! of matching openings is reported alongside as `window_chests`.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use treasure_types::{Address, ChestKind, ChestOpened, User};

use crate::AnalyticsError;

/// Which lifetime counter to rank by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardSort {
    /// Regular plus premium.
    #[default]
    Total,
    /// Regular chests only.
    Regular,
    /// Premium chests only.
    Premium,
}

impl LeaderboardSort {
    const fn key(self, user: &User) -> u64 {
        match self {
            Self::Total => user.lifetime_total_chest_count,
            Self::Regular => user.lifetime_chest_count,
            Self::Premium => user.lifetime_premium_chest_count,
        }
    }
}

impl FromStr for LeaderboardSort {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "total" => Ok(Self::Total),
            "regular" => Ok(Self::Regular),
            "premium" => Ok(Self::Premium),
            _ => Err(AnalyticsError::UnknownSort(s.to_owned())),
        }
    }
}

/// Leaderboard filter and ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaderboardQuery {
    /// Ranking counter.
    pub sort: LeaderboardSort,
    /// Require an opening of this tier.
    pub chest_type: Option<ChestKind>,
    /// Require an opening at or after this unix timestamp.
    pub since: Option<u64>,
    /// Maximum number of entries.
    pub limit: Option<usize>,
}

impl LeaderboardQuery {
    const fn is_windowed(&self) -> bool {
        self.chest_type.is_some() || self.since.is_some()
    }

    fn matches(&self, chest: &ChestOpened) -> bool {
        self.chest_type.is_none_or(|kind| chest.kind() == kind)
            && self.since.is_none_or(|since| chest.timestamp >= since)
    }
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    /// Wallet address.
    pub user: Address,
    /// Lifetime regular chests.
    pub lifetime_chest_count: u64,
    /// Lifetime premium chests.
    pub lifetime_premium_chest_count: u64,
    /// Lifetime total.
    pub lifetime_total_chest_count: u64,
    /// Current premium flag.
    pub is_premium_user: bool,
    /// Openings matching the query's tier and window.
    pub window_chests: u64,
}

/// Rank users.
///
/// Users with no chests at all never appear. Ties are broken by address so
/// the output is deterministic.
pub fn leaderboard<'a>(
    users: impl IntoIterator<Item = &'a User>,
    chests: impl IntoIterator<Item = &'a ChestOpened>,
    query: &LeaderboardQuery,
) -> Vec<LeaderboardEntry> {
    let mut window: BTreeMap<&Address, u64> = BTreeMap::new();
    for chest in chests.into_iter().filter(|c| query.matches(c)) {
        let count = window.entry(&chest.user).or_insert(0);
        *count = count.saturating_add(1);
    }

    let mut ranked: Vec<(&User, u64)> = users
        .into_iter()
        .filter(|u| u.lifetime_total_chest_count > 0)
        .filter_map(|u| {
            let matching = window.get(&u.id).copied().unwrap_or(0);
            if query.is_windowed() && matching == 0 {
                None
            } else {
                Some((u, matching))
            }
        })
        .collect();

    ranked.sort_by(|(a, _), (b, _)| {
        query
            .sort
            .key(b)
            .cmp(&query.sort.key(a))
            .then_with(|| a.id.cmp(&b.id))
    });

    ranked
        .into_iter()
        .take(query.limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, (user, matching))| LeaderboardEntry {
            rank: i.saturating_add(1),
            user: user.id.clone(),
            lifetime_chest_count: user.lifetime_chest_count,
            lifetime_premium_chest_count: user.lifetime_premium_chest_count,
            lifetime_total_chest_count: user.lifetime_total_chest_count,
            is_premium_user: user.is_premium_user,
            window_chests: matching,
        })
        .collect()
}
