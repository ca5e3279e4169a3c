//! Conservation checks over the aggregated collections.
//!
//! Every chest opening increments exactly one user total and exactly one
//! daily total, so the following must hold at any point between events:
//!
//! ```text
//! for each user: total == regular + premium
//! for each day:  total == regular + premium
//! sum(day.total) == sum(user.lifetime_total)
//! ```
//!
//! The aggregator maintains these by construction. The check exists to
//! catch corrupted rows loaded from storage or a redelivery applied under
//! [`DedupPolicy::Disabled`](crate::DedupPolicy::Disabled) that overwrote
//! state inconsistently.

use treasure_types::{DailyChestOpen, User};

use crate::ConservationAnomaly;

/// The result of a conservation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// All invariants hold.
    Balanced,
    /// One or more invariants are violated.
    Anomaly(ConservationAnomaly),
}

impl ConservationResult {
    /// Whether all invariants hold.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }
}

/// Verify the per-entity and global invariants.
pub fn verify_conservation<'a>(
    users: impl IntoIterator<Item = &'a User>,
    days: impl IntoIterator<Item = &'a DailyChestOpen>,
) -> ConservationResult {
    let mut anomaly = ConservationAnomaly::default();

    let mut user_total: u64 = 0;
    for user in users {
        if !user.is_consistent() {
            anomaly.inconsistent_users.push(user.id.clone());
        }
        let Some(sum) = user_total.checked_add(user.lifetime_total_chest_count) else {
            return overflow_anomaly("user totals");
        };
        user_total = sum;
    }

    let mut daily_total: u64 = 0;
    for day in days {
        if !day.is_consistent() {
            anomaly.inconsistent_days.push(day.id.clone());
        }
        let Some(sum) = daily_total.checked_add(day.total_chest_count) else {
            return overflow_anomaly("daily totals");
        };
        daily_total = sum;
    }

    anomaly.user_total = user_total;
    anomaly.daily_total = daily_total;

    if anomaly.inconsistent_users.is_empty()
        && anomaly.inconsistent_days.is_empty()
        && user_total == daily_total
    {
        return ConservationResult::Balanced;
    }

    anomaly.message = format!(
        "CONSERVATION_ANOMALY: {} user(s) and {} day(s) inconsistent, user total {user_total} vs daily total {daily_total}",
        anomaly.inconsistent_users.len(),
        anomaly.inconsistent_days.len(),
    );
    ConservationResult::Anomaly(anomaly)
}

/// Construct an anomaly result for arithmetic overflow during summation.
fn overflow_anomaly(what: &str) -> ConservationResult {
    ConservationResult::Anomaly(ConservationAnomaly {
        message: format!("CONSERVATION_ANOMALY: arithmetic overflow while summing {what}"),
        ..ConservationAnomaly::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use treasure_types::{Address, ChestKind, to_iso_date};

    fn user(id: &str, regular: u64, premium: u64) -> User {
        let mut user = User::new(Address::new(id));
        for _ in 0..regular {
            user.record_chest(ChestKind::Regular);
        }
        for _ in 0..premium {
            user.record_chest(ChestKind::Premium);
        }
        user
    }

    fn day(timestamp: u64, regular: u64, premium: u64) -> DailyChestOpen {
        let mut day = DailyChestOpen::new(to_iso_date(timestamp));
        for _ in 0..regular {
            day.record_chest(ChestKind::Regular);
        }
        for _ in 0..premium {
            day.record_chest(ChestKind::Premium);
        }
        day
    }

    #[test]
    fn empty_is_balanced() {
        let users: [User; 0] = [];
        let days: [DailyChestOpen; 0] = [];
        assert!(verify_conservation(&users, &days).is_balanced());
    }

    #[test]
    fn matching_totals_are_balanced() {
        let users = [user("0xa", 2, 0), user("0xb", 0, 1)];
        let days = [day(1_700_000_000, 2, 0), day(1_700_090_000, 0, 1)];
        assert_eq!(verify_conservation(&users, &days), ConservationResult::Balanced);
    }

    #[test]
    fn global_imbalance_is_reported() {
        let users = [user("0xa", 3, 0)];
        let days = [day(1_700_000_000, 2, 0)];
        let result = verify_conservation(&users, &days);
        assert!(!result.is_balanced());
        if let ConservationResult::Anomaly(anomaly) = result {
            assert_eq!(anomaly.user_total, 3);
            assert_eq!(anomaly.daily_total, 2);
            assert!(anomaly.inconsistent_users.is_empty());
        }
    }

    #[test]
    fn tampered_user_is_listed() {
        let mut bad = user("0xa", 1, 1);
        bad.lifetime_total_chest_count = 1;
        let days = [day(0, 1, 0)];
        let result = verify_conservation([&bad], &days);
        assert!(!result.is_balanced());
        if let ConservationResult::Anomaly(anomaly) = result {
            assert_eq!(anomaly.inconsistent_users, vec![Address::new("0xa")]);
            assert!(anomaly.message.contains("1 user(s)"));
        }
    }

    #[test]
    fn overflow_is_an_anomaly() {
        let mut huge = User::new(Address::new("0xa"));
        huge.lifetime_chest_count = u64::MAX;
        huge.lifetime_total_chest_count = u64::MAX;
        let other = user("0xb", 1, 0);
        let days: Vec<DailyChestOpen> = Vec::new();
        let result = verify_conservation([&huge, &other], &days);
        assert!(!result.is_balanced());
    }
}
