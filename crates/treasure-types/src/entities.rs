//! Derived entities maintained by the aggregator.
//!
//! Field names serialize in camelCase to match the query schema consumed by
//! the dashboards (`lifetimeChestCount`, `isPremiumUser`, ...).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::date::DateKey;
use crate::ids::{Address, TxHash};

/// Tier of a chest opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ChestKind {
    /// A regular chest.
    Regular,
    /// A premium chest.
    Premium,
}

impl ChestKind {
    /// Whether this is the premium tier.
    pub const fn is_premium(self) -> bool {
        matches!(self, Self::Premium)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Lifetime counters and premium flag for one wallet.
///
/// Invariant: `lifetime_total_chest_count == lifetime_chest_count +
/// lifetime_premium_chest_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct User {
    /// Wallet address.
    pub id: Address,
    /// Regular chests opened.
    pub lifetime_chest_count: u64,
    /// Premium chests opened.
    pub lifetime_premium_chest_count: u64,
    /// Regular plus premium.
    pub lifetime_total_chest_count: u64,
    /// Whether the address is currently flagged premium.
    pub is_premium_user: bool,
}

impl User {
    /// A fresh user with every counter at zero and no premium flag.
    pub const fn new(id: Address) -> Self {
        Self {
            id,
            lifetime_chest_count: 0,
            lifetime_premium_chest_count: 0,
            lifetime_total_chest_count: 0,
            is_premium_user: false,
        }
    }

    /// Count one chest of the given tier.
    pub const fn record_chest(&mut self, kind: ChestKind) {
        match kind {
            ChestKind::Regular => {
                self.lifetime_chest_count = self.lifetime_chest_count.saturating_add(1);
            }
            ChestKind::Premium => {
                self.lifetime_premium_chest_count =
                    self.lifetime_premium_chest_count.saturating_add(1);
            }
        }
        self.lifetime_total_chest_count = self.lifetime_total_chest_count.saturating_add(1);
    }

    /// Count for a single tier.
    pub const fn count(&self, kind: ChestKind) -> u64 {
        match kind {
            ChestKind::Regular => self.lifetime_chest_count,
            ChestKind::Premium => self.lifetime_premium_chest_count,
        }
    }

    /// Whether the total equals the sum of both tiers.
    pub const fn is_consistent(&self) -> bool {
        match self
            .lifetime_chest_count
            .checked_add(self.lifetime_premium_chest_count)
        {
            Some(sum) => sum == self.lifetime_total_chest_count,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ChestOpened
// ---------------------------------------------------------------------------

/// Write-once record of one chest-opening transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ChestOpened {
    /// Transaction hash.
    pub id: TxHash,
    /// The opening user.
    pub user: Address,
    /// Unix seconds.
    pub timestamp: u64,
    /// Whether the chest was premium.
    pub is_premium: bool,
}

impl ChestOpened {
    /// Tier of this record.
    pub const fn kind(&self) -> ChestKind {
        if self.is_premium {
            ChestKind::Premium
        } else {
            ChestKind::Regular
        }
    }
}

// ---------------------------------------------------------------------------
// DailyChestOpen
// ---------------------------------------------------------------------------

/// Per-UTC-day chest counters.
///
/// Invariant: `total_chest_count == regular_chest_count + premium_chest_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DailyChestOpen {
    /// Same value as `date`.
    pub id: DateKey,
    /// ISO `YYYY-MM-DD`.
    pub date: String,
    /// Regular chests opened that day.
    pub regular_chest_count: u64,
    /// Premium chests opened that day.
    pub premium_chest_count: u64,
    /// Regular plus premium.
    pub total_chest_count: u64,
}

impl DailyChestOpen {
    /// A zeroed summary for the given day.
    pub fn new(id: DateKey) -> Self {
        let date = id.as_str().to_owned();
        Self {
            id,
            date,
            regular_chest_count: 0,
            premium_chest_count: 0,
            total_chest_count: 0,
        }
    }

    /// Count one chest of the given tier.
    pub const fn record_chest(&mut self, kind: ChestKind) {
        match kind {
            ChestKind::Regular => {
                self.regular_chest_count = self.regular_chest_count.saturating_add(1);
            }
            ChestKind::Premium => {
                self.premium_chest_count = self.premium_chest_count.saturating_add(1);
            }
        }
        self.total_chest_count = self.total_chest_count.saturating_add(1);
    }

    /// Whether the total equals the sum of both tiers.
    pub const fn is_consistent(&self) -> bool {
        match self.regular_chest_count.checked_add(self.premium_chest_count) {
            Some(sum) => sum == self.total_chest_count,
            None => false,
        }
    }
}
