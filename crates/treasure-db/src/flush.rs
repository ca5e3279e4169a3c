//! Flush of the in-memory working set to `PostgreSQL`, and the reverse
//! load used at startup.
//!
//! ```text
//! pipeline flush
//!   |
//!   +-- BEGIN
//!   +-- UserStore::upsert_in          --> users
//!   +-- DailyStore::upsert_in         --> daily_chest_opens
//!   +-- ChestStore::upsert_in         --> chest_opens (FK to users)
//!   +-- ProcessedStore::insert_in     --> processed_events
//!   +-- COMMIT
//! ```
//!
//! Everything lands in one transaction so the applied-event keys never
//! get ahead of the counters they produced.

use sqlx::PgPool;
use treasure_aggregator::{PendingWrites, Snapshot};

use crate::chest_store::ChestStore;
use crate::daily_store::DailyStore;
use crate::error::DbError;
use crate::processed_store::ProcessedStore;
use crate::user_store::UserStore;

/// Persist everything written since the previous flush.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the transaction is rolled
/// back and nothing is written.
pub(crate) async fn flush_pending(pool: &PgPool, pending: &PendingWrites) -> Result<(), DbError> {
    if pending.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    UserStore::new(pool).upsert_in(&mut tx, &pending.users).await?;
    DailyStore::new(pool).upsert_in(&mut tx, &pending.days).await?;
    ChestStore::new(pool).upsert_in(&mut tx, &pending.chests).await?;
    ProcessedStore::new(pool)
        .insert_in(&mut tx, &pending.processed)
        .await?;
    tx.commit().await?;

    tracing::debug!(
        users = pending.users.len(),
        days = pending.days.len(),
        chests = pending.chests.len(),
        processed = pending.processed.len(),
        "Flushed pending writes to PostgreSQL"
    );

    Ok(())
}

/// Load every persisted row for hydrating the working set.
///
/// # Errors
///
/// Returns [`DbError`] if any query or row conversion fails.
pub(crate) async fn load_snapshot(pool: &PgPool) -> Result<Snapshot, DbError> {
    let snapshot = Snapshot {
        users: UserStore::new(pool).load_all().await?,
        chests: ChestStore::new(pool).load_all().await?,
        days: DailyStore::new(pool).load_all().await?,
        processed: ProcessedStore::new(pool).load_all().await?,
    };

    tracing::info!(
        users = snapshot.users.len(),
        chests = snapshot.chests.len(),
        days = snapshot.days.len(),
        processed = snapshot.processed.len(),
        "Loaded snapshot from PostgreSQL"
    );

    Ok(snapshot)
}
