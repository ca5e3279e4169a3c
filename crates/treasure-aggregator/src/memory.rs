//! The in-process working set used by the indexer pipeline.
//!
//! [`MemoryAggregator`] runs the aggregator over three
//! [`MemoryRepository`] collections. After a batch of events the pipeline
//! calls [`MemoryAggregator::take_pending`] to collect everything written
//! since the previous flush, persists it, and on failure hands it back via
//! [`MemoryAggregator::requeue`] so the next flush retries.

use std::collections::BTreeSet;

use treasure_types::{Address, ChestOpened, DailyChestOpen, DateKey, EventKey, TxHash, User};

use crate::AggregatorError;
use crate::aggregator::{Aggregator, DedupPolicy};
use crate::conservation::{ConservationResult, verify_conservation};
use crate::repository::MemoryRepository;

/// Aggregator over in-memory repositories.
pub type MemoryAggregator = Aggregator<
    MemoryRepository<Address, User>,
    MemoryRepository<TxHash, ChestOpened>,
    MemoryRepository<DateKey, DailyChestOpen>,
>;

/// Records written since the last flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingWrites {
    /// Changed users.
    pub users: Vec<User>,
    /// New chest records.
    pub chests: Vec<ChestOpened>,
    /// Changed daily summaries.
    pub days: Vec<DailyChestOpen>,
    /// Newly applied event keys.
    pub processed: Vec<EventKey>,
}

impl PendingWrites {
    /// Whether there is nothing to flush.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.chests.is_empty()
            && self.days.is_empty()
            && self.processed.is_empty()
    }

    /// Total number of rows across all collections.
    pub fn len(&self) -> usize {
        self.users
            .len()
            .saturating_add(self.chests.len())
            .saturating_add(self.days.len())
            .saturating_add(self.processed.len())
    }
}

/// Previously persisted state used to rebuild the working set.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// All stored users.
    pub users: Vec<User>,
    /// All stored chest records.
    pub chests: Vec<ChestOpened>,
    /// All stored daily summaries.
    pub days: Vec<DailyChestOpen>,
    /// All stored event keys.
    pub processed: Vec<EventKey>,
}

impl MemoryAggregator {
    /// An empty working set.
    pub fn in_memory(policy: DedupPolicy) -> Self {
        Self::new(
            MemoryRepository::new(),
            MemoryRepository::new(),
            MemoryRepository::new(),
            policy,
        )
    }

    /// Rebuild the working set from persisted rows.
    ///
    /// Rows are loaded without being marked dirty. Fails if a key appears
    /// twice or a chest record references a user that does not exist.
    pub fn hydrate(snapshot: Snapshot, policy: DedupPolicy) -> Result<Self, AggregatorError> {
        let mut aggregator = Self::in_memory(policy);

        for user in snapshot.users {
            let key = user.id.clone();
            if aggregator.users.load(key.clone(), user).is_some() {
                return Err(AggregatorError::DuplicateRecord {
                    collection: "users",
                    key: key.into_inner(),
                });
            }
        }

        for day in snapshot.days {
            let key = day.id.clone();
            if aggregator.days.load(key.clone(), day).is_some() {
                return Err(AggregatorError::DuplicateRecord {
                    collection: "daily_chest_opens",
                    key: key.into_inner(),
                });
            }
        }

        for chest in snapshot.chests {
            if aggregator.users.get_ref(&chest.user).is_none() {
                return Err(AggregatorError::DanglingUser {
                    tx_hash: chest.id.into_inner(),
                    user: chest.user.into_inner(),
                });
            }
            let key = chest.id.clone();
            if aggregator.chests.load(key.clone(), chest).is_some() {
                return Err(AggregatorError::DuplicateRecord {
                    collection: "chest_opens",
                    key: key.into_inner(),
                });
            }
        }

        aggregator.processed = snapshot.processed.into_iter().collect::<BTreeSet<_>>();

        tracing::info!(
            users = aggregator.users.len(),
            chests = aggregator.chests.len(),
            days = aggregator.days.len(),
            processed = aggregator.processed.len(),
            "Hydrated aggregator from storage"
        );

        Ok(aggregator)
    }

    /// Collect everything written since the last call.
    pub fn take_pending(&mut self) -> PendingWrites {
        PendingWrites {
            users: drain_values(&mut self.users),
            chests: drain_values(&mut self.chests),
            days: drain_values(&mut self.days),
            processed: std::mem::take(&mut self.pending_processed),
        }
    }

    /// Put a failed flush back so the next [`take_pending`](Self::take_pending)
    /// includes it. Current values are re-read, so later changes win.
    pub fn requeue(&mut self, pending: PendingWrites) {
        self.users.mark_dirty(pending.users.into_iter().map(|u| u.id));
        self.chests.mark_dirty(pending.chests.into_iter().map(|c| c.id));
        self.days.mark_dirty(pending.days.into_iter().map(|d| d.id));
        let mut processed = pending.processed;
        processed.append(&mut self.pending_processed);
        self.pending_processed = processed;
    }

    /// Number of records waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.users
            .dirty_len()
            .saturating_add(self.chests.dirty_len())
            .saturating_add(self.days.dirty_len())
            .saturating_add(self.pending_processed.len())
    }

    /// Run the conservation check over the whole working set.
    pub fn verify_conservation(&self) -> ConservationResult {
        verify_conservation(self.users.values(), self.days.values())
    }
}

fn drain_values<K: Ord + Clone, V: Clone>(repo: &mut MemoryRepository<K, V>) -> Vec<V> {
    repo.drain_dirty().into_iter().map(|(_, value)| value).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use treasure_types::{ChestEvent, DecodedEvent, EventContext, to_iso_date};

    fn chest_event(block: u64, tx: &str, user: &str) -> DecodedEvent {
        DecodedEvent {
            context: EventContext {
                block_number: block,
                log_index: 0,
                tx_hash: TxHash::new(tx),
                block_timestamp: 1_700_000_000,
            },
            event: ChestEvent::ChestOpened {
                user: Address::new(user),
                timestamp: 1_700_000_000,
            },
        }
    }

    #[test]
    fn take_pending_collects_and_clears() {
        let mut agg = MemoryAggregator::in_memory(DedupPolicy::Strict);
        agg.handle(&chest_event(1, "0x1", "0xa"));
        agg.handle(&chest_event(2, "0x2", "0xa"));

        let pending = agg.take_pending();
        assert_eq!(pending.users.len(), 1);
        assert_eq!(pending.chests.len(), 2);
        assert_eq!(pending.days.len(), 1);
        assert_eq!(pending.processed.len(), 2);
        assert_eq!(pending.users.first().map(|u| u.lifetime_chest_count), Some(2));

        assert!(agg.take_pending().is_empty());
        assert_eq!(agg.pending_len(), 0);
    }

    #[test]
    fn requeue_restores_pending() {
        let mut agg = MemoryAggregator::in_memory(DedupPolicy::Strict);
        agg.handle(&chest_event(1, "0x1", "0xa"));
        let pending = agg.take_pending();
        let rows = pending.len();
        agg.requeue(pending);
        assert_eq!(agg.pending_len(), rows);

        // A later change is flushed with its newest value.
        agg.handle(&chest_event(2, "0x2", "0xa"));
        let pending = agg.take_pending();
        assert_eq!(pending.users.first().map(|u| u.lifetime_chest_count), Some(2));
        assert_eq!(pending.processed.len(), 2);
    }

    #[test]
    fn hydrate_restores_state_and_dedup() {
        let mut user = User::new(Address::new("0xa"));
        user.record_chest(treasure_types::ChestKind::Regular);
        let mut day = DailyChestOpen::new(to_iso_date(1_700_000_000));
        day.record_chest(treasure_types::ChestKind::Regular);
        let event = chest_event(1, "0x1", "0xa");

        let snapshot = Snapshot {
            users: vec![user],
            chests: vec![ChestOpened {
                id: TxHash::new("0x1"),
                user: Address::new("0xa"),
                timestamp: 1_700_000_000,
                is_premium: false,
            }],
            days: vec![day],
            processed: vec![event.context.key()],
        };

        let mut agg = MemoryAggregator::hydrate(snapshot, DedupPolicy::Strict).unwrap();
        assert_eq!(agg.pending_len(), 0);
        assert!(agg.verify_conservation().is_balanced());

        assert_eq!(
            agg.handle(&event),
            crate::aggregator::HandleOutcome::SkippedDuplicate
        );
    }

    #[test]
    fn hydrate_rejects_duplicate_users() {
        let snapshot = Snapshot {
            users: vec![User::new(Address::new("0xa")), User::new(Address::new("0xA"))],
            ..Snapshot::default()
        };
        let result = MemoryAggregator::hydrate(snapshot, DedupPolicy::Strict);
        assert!(matches!(
            result,
            Err(AggregatorError::DuplicateRecord { collection: "users", .. })
        ));
    }

    #[test]
    fn hydrate_rejects_dangling_chest() {
        let snapshot = Snapshot {
            chests: vec![ChestOpened {
                id: TxHash::new("0x1"),
                user: Address::new("0xghost"),
                timestamp: 0,
                is_premium: true,
            }],
            ..Snapshot::default()
        };
        let result = MemoryAggregator::hydrate(snapshot, DedupPolicy::Strict);
        assert!(matches!(result, Err(AggregatorError::DanglingUser { .. })));
    }
}
