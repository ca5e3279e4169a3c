//! The ingestion loop: apply, broadcast, flush.
//!
//! A single [`Pipeline`] task drains the source channel and applies each
//! event to the shared aggregator under the write lock, one event per
//! lock acquisition. Chest openings are pushed to `WebSocket` subscribers
//! after the lock is released.
//!
//! # Flushing
//!
//! Pending writes are flushed when the block number changes, when
//! `flush_every_events` events have accumulated within one block, and once
//! more when the channel closes. A failed flush is logged and the writes
//! are requeued so the next flush carries them. The closing flush has no
//! next flush: it is retried [`FINAL_FLUSH_ATTEMPTS`] times and then
//! reported as [`IndexerError::FlushFailed`]. After every flush the
//! conservation check runs over the whole working set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use treasure_aggregator::{ConservationResult, HandleOutcome, PendingWrites};
use treasure_db::{DbError, PostgresPool};
use treasure_observer::{AppState, ChestBroadcast};
use treasure_types::DecodedEvent;

use crate::error::IndexerError;

/// Attempts at the closing flush before the run is reported as failed.
pub const FINAL_FLUSH_ATTEMPTS: u32 = 3;

/// Base delay between closing-flush attempts, multiplied by the attempt.
const FINAL_FLUSH_BACKOFF: Duration = Duration::from_millis(100);

/// Where flushed writes go.
pub trait PendingSink {
    /// Persist one batch. On error nothing from the batch is kept.
    fn persist(&self, pending: &PendingWrites) -> impl Future<Output = Result<(), DbError>>;
}

impl PendingSink for PostgresPool {
    fn persist(&self, pending: &PendingWrites) -> impl Future<Output = Result<(), DbError>> {
        self.flush(pending)
    }
}

/// Counters reported when the pipeline stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Events received from the source.
    pub received: u64,
    /// Events applied to the aggregator.
    pub applied: u64,
    /// Redeliveries skipped.
    pub duplicates: u64,
    /// Successful flushes (or discards when not persisting).
    pub flushes: u64,
    /// Flushes that failed and were requeued.
    pub failed_flushes: u64,
    /// Conservation checks that found an anomaly.
    pub anomalies: u64,
}

/// Drives events from the source into the aggregator and storage.
pub struct Pipeline<'a, S> {
    state: Arc<AppState>,
    sink: Option<&'a S>,
    flush_every_events: u64,
}

impl<'a, S: PendingSink> Pipeline<'a, S> {
    /// Create a pipeline. With `sink` set to `None` pending writes are
    /// discarded at each flush point and nothing is persisted.
    pub fn new(state: Arc<AppState>, sink: Option<&'a S>, flush_every_events: u64) -> Self {
        Self {
            state,
            sink,
            flush_every_events: flush_every_events.max(1),
        }
    }

    /// Run until the source side of the channel is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::FlushFailed`] if the closing flush still
    /// fails after [`FINAL_FLUSH_ATTEMPTS`] attempts. The unpersisted rows
    /// stay pending in the aggregator.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<DecodedEvent>,
    ) -> Result<PipelineReport, IndexerError> {
        let mut report = PipelineReport::default();
        let mut current_block: Option<u64> = None;
        let mut since_flush: u64 = 0;

        while let Some(event) = rx.recv().await {
            report.received = report.received.saturating_add(1);
            let block = event.context.block_number;

            if since_flush > 0 && current_block.is_some_and(|b| b != block) {
                self.flush(&mut report).await;
                since_flush = 0;
            }
            current_block = Some(block);

            let (outcome, notice) = {
                let mut aggregator = self.state.aggregator.write().await;
                let outcome = aggregator.handle(&event);
                let notice = match (outcome, event.event.chest_kind()) {
                    (HandleOutcome::Applied, Some(_)) => aggregator
                        .chests()
                        .get_ref(&event.context.tx_hash)
                        .map(|chest| ChestBroadcast::from_record(block, chest)),
                    _ => None,
                };
                (outcome, notice)
            };

            match outcome {
                HandleOutcome::Applied => {
                    report.applied = report.applied.saturating_add(1);
                    since_flush = since_flush.saturating_add(1);
                }
                HandleOutcome::SkippedDuplicate => {
                    report.duplicates = report.duplicates.saturating_add(1);
                }
            }

            if let Some(notice) = notice {
                let receivers = self.state.broadcast(&notice);
                debug!(tx_hash = %notice.tx_hash, receivers, "Broadcast chest opening");
            }

            if since_flush >= self.flush_every_events {
                self.flush(&mut report).await;
                since_flush = 0;
            }
        }

        self.final_flush(&mut report).await?;

        info!(
            received = report.received,
            applied = report.applied,
            duplicates = report.duplicates,
            flushes = report.flushes,
            failed_flushes = report.failed_flushes,
            "Event channel closed, pipeline stopped"
        );
        Ok(report)
    }

    /// Flush until nothing is pending, giving up after
    /// [`FINAL_FLUSH_ATTEMPTS`].
    async fn final_flush(&self, report: &mut PipelineReport) -> Result<(), IndexerError> {
        let mut attempt: u32 = 1;
        while !self.flush(report).await {
            if attempt >= FINAL_FLUSH_ATTEMPTS {
                let rows = self.state.aggregator.read().await.pending_len();
                error!(rows, attempts = attempt, "Closing flush failed, writes not persisted");
                return Err(IndexerError::FlushFailed { rows });
            }
            let delay = FINAL_FLUSH_BACKOFF.saturating_mul(attempt);
            warn!(attempt, delay = ?delay, "Closing flush failed, retrying");
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
        Ok(())
    }

    /// Returns `false` if the writes were requeued.
    async fn flush(&self, report: &mut PipelineReport) -> bool {
        let pending = self.state.aggregator.write().await.take_pending();
        if pending.is_empty() {
            return true;
        }

        let rows = pending.len();
        let flushed = match self.sink {
            Some(sink) => match sink.persist(&pending).await {
                Ok(()) => {
                    report.flushes = report.flushes.saturating_add(1);
                    debug!(rows, "Flushed pending writes");
                    true
                }
                Err(e) => {
                    error!(rows, error = %e, "Flush failed, requeueing pending writes");
                    report.failed_flushes = report.failed_flushes.saturating_add(1);
                    self.state.aggregator.write().await.requeue(pending);
                    false
                }
            },
            None => {
                report.flushes = report.flushes.saturating_add(1);
                debug!(rows, "Persistence disabled, discarding pending writes");
                true
            }
        };

        let check = self.state.aggregator.read().await.verify_conservation();
        if let ConservationResult::Anomaly(anomaly) = check {
            report.anomalies = report.anomalies.saturating_add(1);
            error!(
                inconsistent_users = anomaly.inconsistent_users.len(),
                inconsistent_days = anomaly.inconsistent_days.len(),
                user_total = anomaly.user_total,
                daily_total = anomaly.daily_total,
                "Conservation check failed: {anomaly}"
            );
        }
        flushed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use treasure_types::{Address, ChestEvent, EventContext, TxHash, to_iso_date};

    fn decoded(block: u64, log_index: u32, tx: &str, event: ChestEvent) -> DecodedEvent {
        DecodedEvent {
            context: EventContext {
                block_number: block,
                log_index,
                tx_hash: TxHash::new(tx),
                block_timestamp: 1_700_000_000,
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

    /// Fails the first `failures` batches, then accepts.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakySink {
        const fn failing(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PendingSink for FlakySink {
        async fn persist(&self, _pending: &PendingWrites) -> Result<(), DbError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(DbError::Config("database unavailable".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    fn channel_with(events: Vec<DecodedEvent>) -> mpsc::Receiver<DecodedEvent> {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(event).unwrap();
        }
        rx
    }

    async fn run_events(
        state: &Arc<AppState>,
        flush_every: u64,
        events: Vec<DecodedEvent>,
    ) -> PipelineReport {
        Pipeline::<PostgresPool>::new(Arc::clone(state), None, flush_every)
            .run(channel_with(events))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn applies_events_and_skips_duplicates() {
        let state = Arc::new(AppState::default());
        let first = decoded(1, 0, "0x1", opened("0xa", 1_700_000_000));
        let events = vec![
            first.clone(),
            first,
            decoded(2, 0, "0x2", ChestEvent::PremiumChestOpened {
                user: Address::new("0xa"),
                timestamp: 1_700_000_060,
            }),
            decoded(3, 0, "0x3", ChestEvent::PremiumUserAdded { user: Address::new("0xa") }),
        ];

        let report = run_events(&state, 500, events).await;
        assert_eq!(report.received, 4);
        assert_eq!(report.applied, 3);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.anomalies, 0);

        let aggregator = state.aggregator.read().await;
        let user = aggregator.users().get_ref(&Address::new("0xa"));
        assert_eq!(user.map(|u| u.lifetime_total_chest_count), Some(2));
        assert_eq!(user.map(|u| u.is_premium_user), Some(true));
        let day = aggregator.days().get_ref(&to_iso_date(1_700_000_000));
        assert_eq!(day.map(|d| d.total_chest_count), Some(2));
        // Everything was drained at the final flush.
        assert_eq!(aggregator.pending_len(), 0);
    }

    #[tokio::test]
    async fn flushes_at_block_boundaries() {
        let state = Arc::new(AppState::default());
        let events = vec![
            decoded(1, 0, "0x1", opened("0xa", 100)),
            decoded(1, 1, "0x2", opened("0xb", 100)),
            decoded(2, 0, "0x3", opened("0xa", 200)),
            decoded(3, 0, "0x4", opened("0xc", 300)),
        ];

        let report = run_events(&state, 500, events).await;
        // Boundary before block 2, before block 3, and the final flush.
        assert_eq!(report.flushes, 3);
    }

    #[tokio::test]
    async fn flushes_every_n_events_within_a_block() {
        let state = Arc::new(AppState::default());
        let events = (0..5_u32)
            .map(|i| decoded(7, i, &format!("0x{i}"), opened("0xa", 100)))
            .collect();

        let report = run_events(&state, 2, events).await;
        // After events 2 and 4, then the final flush for event 5.
        assert_eq!(report.flushes, 3);
        assert_eq!(report.applied, 5);
    }

    #[tokio::test]
    async fn chest_openings_are_broadcast() {
        let state = Arc::new(AppState::default());
        let mut rx = state.subscribe();
        let events = vec![
            decoded(4, 0, "0xAA", opened("0xa", 100)),
            decoded(5, 0, "0xbb", ChestEvent::PremiumUserRemoved { user: Address::new("0xa") }),
        ];

        run_events(&state, 500, events).await;

        let message = rx.recv().await.unwrap();
        assert_eq!(message.block_number, 4);
        assert_eq!(message.tx_hash, TxHash::new("0xaa"));
        assert!(!message.is_premium);
        // Flag changes are not broadcast.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_flush_is_carried_by_the_next_one() {
        let state = Arc::new(AppState::default());
        let sink = FlakySink::failing(1);
        let events = vec![
            decoded(1, 0, "0x1", opened("0xa", 100)),
            decoded(2, 0, "0x2", opened("0xb", 200)),
        ];

        let report = Pipeline::new(Arc::clone(&state), Some(&sink), 500)
            .run(channel_with(events))
            .await
            .unwrap();
        // Block 1 fails and is requeued; the closing flush writes both blocks.
        assert_eq!(report.failed_flushes, 1);
        assert_eq!(report.flushes, 1);
        assert_eq!(sink.calls(), 2);
        assert_eq!(state.aggregator.read().await.pending_len(), 0);
    }

    #[tokio::test]
    async fn closing_flush_retries_before_succeeding() {
        let state = Arc::new(AppState::default());
        let sink = FlakySink::failing(FINAL_FLUSH_ATTEMPTS.saturating_sub(1));
        let events = vec![decoded(1, 0, "0x1", opened("0xa", 100))];

        let report = Pipeline::new(Arc::clone(&state), Some(&sink), 500)
            .run(channel_with(events))
            .await
            .unwrap();
        assert_eq!(report.flushes, 1);
        assert_eq!(report.failed_flushes, u64::from(FINAL_FLUSH_ATTEMPTS.saturating_sub(1)));
        assert_eq!(sink.calls(), FINAL_FLUSH_ATTEMPTS);
        assert_eq!(state.aggregator.read().await.pending_len(), 0);
    }

    #[tokio::test]
    async fn closing_flush_failure_is_an_error() {
        let state = Arc::new(AppState::default());
        let sink = FlakySink::failing(u32::MAX);
        let events = vec![
            decoded(1, 0, "0x1", opened("0xa", 100)),
            decoded(1, 1, "0x2", ChestEvent::PremiumUserAdded { user: Address::new("0xa") }),
        ];

        let result = Pipeline::new(Arc::clone(&state), Some(&sink), 500)
            .run(channel_with(events))
            .await;

        let pending = state.aggregator.read().await.pending_len();
        assert!(pending > 0);
        assert!(matches!(result, Err(IndexerError::FlushFailed { rows }) if rows == pending));
        assert_eq!(sink.calls(), FINAL_FLUSH_ATTEMPTS);
    }
}
