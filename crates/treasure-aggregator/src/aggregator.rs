//! The event aggregator: one read-modify-write routine per contract event.
//!
//! [`Aggregator`] owns one [`Repository`] per entity collection and applies
//! each decoded event as a single transition:
//!
//! | Event | User | `DailyChestOpen` | `ChestOpened` |
//! |-------|------|------------------|---------------|
//! | `ChestOpened` | regular + total += 1 | regular + total += 1 | new, not premium |
//! | `PremiumChestOpened` | premium + total += 1 | premium + total += 1 | new, premium |
//! | `PremiumUserAdded` | flag = true | - | - |
//! | `PremiumUserRemoved` | flag = false | - | - |
//!
//! Events are expected in chain order (block height, then log index). The
//! aggregator reports but does not reject out-of-order delivery; reorg
//! handling belongs to the upstream host.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use treasure_types::{
    Address, ChestEvent, ChestKind, ChestOpened, DailyChestOpen, DateKey, DecodedEvent,
    EventCursor, EventKey, TxHash, User, to_iso_date,
};

use crate::repository::{Repository, get_or_create};

/// What to do when an already-applied `(tx_hash, log_index)` is delivered again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Skip the redelivered event.
    #[default]
    Strict,
    /// Apply it again (counters double-increment, the chest record is
    /// overwritten).
    Disabled,
}

/// Result of [`Aggregator::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The event changed the collections.
    Applied,
    /// The event was a duplicate and was ignored.
    SkippedDuplicate,
}

/// Running counters over everything the aggregator has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorStats {
    /// Events applied.
    pub applied: u64,
    /// Redeliveries skipped under [`DedupPolicy::Strict`].
    pub skipped_duplicates: u64,
    /// Events whose cursor did not advance past the previous one.
    pub out_of_order: u64,
}

/// Applies decoded contract events to the three entity collections.
#[derive(Debug)]
pub struct Aggregator<U, C, D> {
    pub(crate) users: U,
    pub(crate) chests: C,
    pub(crate) days: D,
    pub(crate) policy: DedupPolicy,
    pub(crate) processed: BTreeSet<EventKey>,
    pub(crate) pending_processed: Vec<EventKey>,
    pub(crate) last_cursor: Option<EventCursor>,
    pub(crate) stats: AggregatorStats,
}

impl<U, C, D> Aggregator<U, C, D>
where
    U: Repository<Address, User>,
    C: Repository<TxHash, ChestOpened>,
    D: Repository<DateKey, DailyChestOpen>,
{
    /// Build an aggregator over the given repositories.
    pub const fn new(users: U, chests: C, days: D, policy: DedupPolicy) -> Self {
        Self {
            users,
            chests,
            days,
            policy,
            processed: BTreeSet::new(),
            pending_processed: Vec::new(),
            last_cursor: None,
            stats: AggregatorStats {
                applied: 0,
                skipped_duplicates: 0,
                out_of_order: 0,
            },
        }
    }

    /// Apply one decoded event.
    ///
    /// Checks the duplicate policy, records the chain cursor, then
    /// dispatches to the matching `on_*` operation.
    pub fn handle(&mut self, decoded: &DecodedEvent) -> HandleOutcome {
        let context = &decoded.context;
        let key = context.key();

        if self.policy == DedupPolicy::Strict && self.processed.contains(&key) {
            warn!(
                tx_hash = %context.tx_hash,
                log_index = context.log_index,
                event = decoded.event.name(),
                "Skipping redelivered event"
            );
            self.stats.skipped_duplicates = self.stats.skipped_duplicates.saturating_add(1);
            return HandleOutcome::SkippedDuplicate;
        }

        self.advance_cursor(context.cursor());

        match &decoded.event {
            ChestEvent::ChestOpened { user, timestamp } => {
                self.on_chest_opened(user, &context.tx_hash, *timestamp);
            }
            ChestEvent::PremiumChestOpened { user, timestamp } => {
                self.on_premium_chest_opened(user, &context.tx_hash, *timestamp);
            }
            ChestEvent::PremiumUserAdded { user } => self.on_premium_user_added(user),
            ChestEvent::PremiumUserRemoved { user } => self.on_premium_user_removed(user),
        }

        if self.processed.insert(key.clone()) {
            self.pending_processed.push(key);
        }
        self.stats.applied = self.stats.applied.saturating_add(1);
        HandleOutcome::Applied
    }

    /// A regular chest was opened by `user` in transaction `tx_hash`.
    pub fn on_chest_opened(&mut self, user: &Address, tx_hash: &TxHash, timestamp: u64) {
        self.record_chest(user, tx_hash, timestamp, ChestKind::Regular);
    }

    /// A premium chest was opened by `user` in transaction `tx_hash`.
    pub fn on_premium_chest_opened(&mut self, user: &Address, tx_hash: &TxHash, timestamp: u64) {
        self.record_chest(user, tx_hash, timestamp, ChestKind::Premium);
    }

    /// `user` was flagged premium.
    pub fn on_premium_user_added(&mut self, user: &Address) {
        self.set_premium_flag(user, true);
    }

    /// `user` lost premium status.
    pub fn on_premium_user_removed(&mut self, user: &Address) {
        self.set_premium_flag(user, false);
    }

    fn record_chest(&mut self, user: &Address, tx_hash: &TxHash, timestamp: u64, kind: ChestKind) {
        let mut record = get_or_create(&self.users, user, |id| User::new(id.clone()));
        record.record_chest(kind);
        self.users.put(user.clone(), record);

        let date = to_iso_date(timestamp);
        let mut day = get_or_create(&self.days, &date, |id| DailyChestOpen::new(id.clone()));
        day.record_chest(kind);
        self.days.put(date.clone(), day);

        self.chests.put(
            tx_hash.clone(),
            ChestOpened {
                id: tx_hash.clone(),
                user: user.clone(),
                timestamp,
                is_premium: kind.is_premium(),
            },
        );

        debug!(
            user = %user,
            tx_hash = %tx_hash,
            date = %date,
            premium = kind.is_premium(),
            "Recorded chest opening"
        );
    }

    fn set_premium_flag(&mut self, user: &Address, is_premium: bool) {
        let mut record = get_or_create(&self.users, user, |id| User::new(id.clone()));
        record.is_premium_user = is_premium;
        self.users.put(user.clone(), record);

        debug!(user = %user, is_premium, "Updated premium flag");
    }

    fn advance_cursor(&mut self, cursor: EventCursor) {
        match self.last_cursor {
            Some(last) if cursor <= last => {
                warn!(%cursor, %last, "Event delivered out of chain order");
                self.stats.out_of_order = self.stats.out_of_order.saturating_add(1);
            }
            _ => self.last_cursor = Some(cursor),
        }
    }

    /// Repository of users.
    pub const fn users(&self) -> &U {
        &self.users
    }

    /// Repository of chest records.
    pub const fn chests(&self) -> &C {
        &self.chests
    }

    /// Repository of daily summaries.
    pub const fn days(&self) -> &D {
        &self.days
    }

    /// Active duplicate policy.
    pub const fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Highest cursor applied so far.
    pub const fn last_cursor(&self) -> Option<EventCursor> {
        self.last_cursor
    }

    /// Running counters.
    pub const fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Whether the log identified by `key` has already been applied.
    pub fn is_processed(&self, key: &EventKey) -> bool {
        self.processed.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use treasure_types::EventContext;

    type TestAggregator = Aggregator<
        MemoryRepository<Address, User>,
        MemoryRepository<TxHash, ChestOpened>,
        MemoryRepository<DateKey, DailyChestOpen>,
    >;

    fn aggregator(policy: DedupPolicy) -> TestAggregator {
        Aggregator::new(
            MemoryRepository::new(),
            MemoryRepository::new(),
            MemoryRepository::new(),
            policy,
        )
    }

    fn decoded(block: u64, log_index: u32, tx: &str, event: ChestEvent) -> DecodedEvent {
        DecodedEvent {
            context: EventContext {
                block_number: block,
                log_index,
                tx_hash: TxHash::new(tx),
                block_timestamp: 0,
            },
            event,
        }
    }

    fn opened(user: &str, timestamp: u64) -> ChestEvent {
        ChestEvent::ChestOpened {
            user: Address::new(user),
            timestamp,
        }
    }

    fn premium_opened(user: &str, timestamp: u64) -> ChestEvent {
        ChestEvent::PremiumChestOpened {
            user: Address::new(user),
            timestamp,
        }
    }

    #[test]
    fn two_regular_chests_same_day() {
        let mut agg = aggregator(DedupPolicy::Strict);
        let user_a = Address::new("0xA");
        agg.on_chest_opened(&user_a, &TxHash::new("0x1"), 1_700_000_000);
        agg.on_chest_opened(&user_a, &TxHash::new("0x2"), 1_700_003_600);

        let user = agg.users().get(&user_a);
        assert_eq!(user.as_ref().map(|u| u.lifetime_chest_count), Some(2));
        assert_eq!(user.as_ref().map(|u| u.lifetime_total_chest_count), Some(2));
        assert_eq!(user.as_ref().map(|u| u.lifetime_premium_chest_count), Some(0));

        let day = agg.days().get(&to_iso_date(1_700_000_000));
        assert_eq!(day.as_ref().map(|d| d.regular_chest_count), Some(2));
        assert_eq!(day.as_ref().map(|d| d.total_chest_count), Some(2));
        assert_eq!(agg.days().len(), 1);

        assert_eq!(agg.chests().len(), 2);
        let chest = agg.chests().get(&TxHash::new("0x1"));
        assert_eq!(chest.as_ref().map(|c| c.is_premium), Some(false));
        assert_eq!(chest.as_ref().map(|c| c.user.clone()), Some(user_a));
    }

    #[test]
    fn premium_chest_next_day_gets_own_summary() {
        let mut agg = aggregator(DedupPolicy::Strict);
        agg.on_chest_opened(&Address::new("0xa"), &TxHash::new("0x1"), 1_700_000_000);
        agg.on_premium_chest_opened(&Address::new("0xb"), &TxHash::new("0x3"), 1_700_090_000);

        let next = agg.days().get(&to_iso_date(1_700_090_000));
        assert_eq!(next.as_ref().map(|d| d.date.as_str()), Some("2023-11-15"));
        assert_eq!(next.as_ref().map(|d| d.premium_chest_count), Some(1));
        assert_eq!(next.as_ref().map(|d| d.regular_chest_count), Some(0));
        assert_eq!(next.as_ref().map(|d| d.total_chest_count), Some(1));

        let first = agg.days().get(&to_iso_date(1_700_000_000));
        assert_eq!(first.as_ref().map(|d| d.total_chest_count), Some(1));

        let chest = agg.chests().get(&TxHash::new("0x3"));
        assert_eq!(chest.map(|c| c.is_premium), Some(true));
    }

    #[test]
    fn premium_flag_added_then_removed() {
        let mut agg = aggregator(DedupPolicy::Strict);
        let user_c = Address::new("0xc");
        agg.on_premium_user_added(&user_c);
        assert_eq!(agg.users().get(&user_c).map(|u| u.is_premium_user), Some(true));

        agg.on_premium_user_removed(&user_c);
        let user = agg.users().get(&user_c);
        assert_eq!(user.as_ref().map(|u| u.is_premium_user), Some(false));
        assert_eq!(user.as_ref().map(|u| u.lifetime_total_chest_count), Some(0));
        assert!(agg.days().is_empty());
        assert!(agg.chests().is_empty());
    }

    #[test]
    fn removal_of_unknown_user_creates_default() {
        let mut agg = aggregator(DedupPolicy::Strict);
        agg.on_premium_user_removed(&Address::new("0xd"));
        let user = agg.users().get(&Address::new("0xd"));
        assert_eq!(user, Some(User::new(Address::new("0xd"))));
    }

    #[test]
    fn last_flag_event_wins_regardless_of_chests() {
        let mut agg = aggregator(DedupPolicy::Strict);
        let events = [
            decoded(1, 0, "0x1", ChestEvent::PremiumUserAdded { user: Address::new("0xe") }),
            decoded(1, 1, "0x2", opened("0xe", 10)),
            decoded(2, 0, "0x3", ChestEvent::PremiumUserRemoved { user: Address::new("0xe") }),
            decoded(2, 1, "0x4", premium_opened("0xe", 20)),
            decoded(3, 0, "0x5", ChestEvent::PremiumUserAdded { user: Address::new("0xe") }),
            decoded(3, 1, "0x6", opened("0xe", 30)),
        ];
        for event in &events {
            assert_eq!(agg.handle(event), HandleOutcome::Applied);
        }
        let user = agg.users().get(&Address::new("0xe"));
        assert_eq!(user.as_ref().map(|u| u.is_premium_user), Some(true));
        assert_eq!(user.as_ref().map(|u| u.lifetime_total_chest_count), Some(3));
        assert_eq!(user.as_ref().map(User::is_consistent), Some(true));
    }

    #[test]
    fn strict_policy_skips_redelivery() {
        let mut agg = aggregator(DedupPolicy::Strict);
        let event = decoded(5, 0, "0xaa", opened("0xf", 1_700_000_000));
        assert_eq!(agg.handle(&event), HandleOutcome::Applied);
        assert_eq!(agg.handle(&event), HandleOutcome::SkippedDuplicate);

        let user = agg.users().get(&Address::new("0xf"));
        assert_eq!(user.map(|u| u.lifetime_chest_count), Some(1));
        assert_eq!(agg.stats().applied, 1);
        assert_eq!(agg.stats().skipped_duplicates, 1);
        assert!(agg.is_processed(&event.context.key()));
    }

    #[test]
    fn same_tx_different_log_is_not_a_duplicate() {
        let mut agg = aggregator(DedupPolicy::Strict);
        agg.handle(&decoded(5, 0, "0xaa", opened("0xf", 100)));
        agg.handle(&decoded(5, 1, "0xaa", opened("0xf", 100)));
        let user = agg.users().get(&Address::new("0xf"));
        assert_eq!(user.map(|u| u.lifetime_chest_count), Some(2));
        // Both logs share a transaction hash, so one chest record remains.
        assert_eq!(agg.chests().len(), 1);
    }

    #[test]
    fn disabled_policy_double_counts() {
        let mut agg = aggregator(DedupPolicy::Disabled);
        let event = decoded(5, 0, "0xaa", premium_opened("0xf", 100));
        agg.handle(&event);
        assert_eq!(agg.handle(&event), HandleOutcome::Applied);
        let user = agg.users().get(&Address::new("0xf"));
        assert_eq!(user.map(|u| u.lifetime_premium_chest_count), Some(2));
        assert_eq!(agg.chests().len(), 1);
        assert_eq!(agg.stats().skipped_duplicates, 0);
    }

    #[test]
    fn out_of_order_is_counted_but_applied() {
        let mut agg = aggregator(DedupPolicy::Strict);
        agg.handle(&decoded(10, 0, "0x1", opened("0xa", 100)));
        let outcome = agg.handle(&decoded(9, 4, "0x2", opened("0xa", 90)));
        assert_eq!(outcome, HandleOutcome::Applied);
        assert_eq!(agg.stats().out_of_order, 1);
        assert_eq!(
            agg.last_cursor(),
            Some(EventCursor {
                block_number: 10,
                log_index: 0
            })
        );
        let user = agg.users().get(&Address::new("0xa"));
        assert_eq!(user.map(|u| u.lifetime_chest_count), Some(2));
    }

    #[test]
    fn mixed_sequence_keeps_user_invariant() {
        let mut agg = aggregator(DedupPolicy::Strict);
        let user = Address::new("0x9");
        for i in 0..25_u64 {
            let tx = TxHash::new(&format!("0x{i:x}"));
            if i % 3 == 0 {
                agg.on_premium_chest_opened(&user, &tx, 1_700_000_000_u64.saturating_add(i));
            } else {
                agg.on_chest_opened(&user, &tx, 1_700_000_000_u64.saturating_add(i));
            }
        }
        let record = agg.users().get(&user);
        assert_eq!(record.as_ref().map(|u| u.lifetime_premium_chest_count), Some(9));
        assert_eq!(record.as_ref().map(|u| u.lifetime_chest_count), Some(16));
        assert_eq!(record.as_ref().map(User::is_consistent), Some(true));
    }
}
