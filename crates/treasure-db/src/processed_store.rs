//! Operations on the `processed_events` table.
//!
//! Stores the `(tx_hash, log_index)` of every applied event so duplicate
//! detection survives a restart.

use sqlx::{PgConnection, PgPool};
use treasure_types::{EventKey, TxHash};

use crate::error::DbError;

/// Operations on the `processed_events` table.
pub struct ProcessedStore<'a> {
    pool: &'a PgPool,
}

impl<'a> ProcessedStore<'a> {
    /// Create a new store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record applied event keys. Keys already present are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_in(&self, conn: &mut PgConnection, keys: &[EventKey]) -> Result<(), DbError> {
        if keys.is_empty() {
            return Ok(());
        }

        let hashes: Vec<String> = keys.iter().map(|k| k.tx_hash.as_str().to_owned()).collect();
        let indexes: Vec<i64> = keys.iter().map(|k| i64::from(k.log_index)).collect();

        sqlx::query(
            r"INSERT INTO processed_events (tx_hash, log_index)
              SELECT * FROM UNNEST($1::TEXT[], $2::BIGINT[])
              ON CONFLICT (tx_hash, log_index) DO NOTHING",
        )
        .bind(&hashes)
        .bind(&indexes)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(count = keys.len(), "Recorded processed event keys");
        Ok(())
    }

    /// Load every recorded key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a stored log index does
    /// not fit in `u32`.
    pub async fn load_all(&self) -> Result<Vec<EventKey>, DbError> {
        let rows = sqlx::query_as::<_, ProcessedRow>(
            r"SELECT tx_hash, log_index FROM processed_events ORDER BY tx_hash, log_index",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(EventKey::try_from).collect()
    }
}

/// A row from the `processed_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcessedRow {
    /// Transaction hash.
    pub tx_hash: String,
    /// Log index within the block.
    pub log_index: i64,
}

impl TryFrom<ProcessedRow> for EventKey {
    type Error = DbError;

    fn try_from(row: ProcessedRow) -> Result<Self, Self::Error> {
        let log_index = u32::try_from(row.log_index).map_err(|source| DbError::Conversion {
            field: "log_index",
            value: row.log_index.to_string(),
            source,
        })?;
        Ok(Self {
            tx_hash: TxHash::new(&row.tx_hash),
            log_index,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn row_converts_to_key() {
        let key = EventKey::try_from(ProcessedRow {
            tx_hash: "0xAB".to_owned(),
            log_index: 7,
        })
        .unwrap();
        assert_eq!(
            key,
            EventKey {
                tx_hash: TxHash::new("0xab"),
                log_index: 7,
            }
        );
    }

    #[test]
    fn oversized_log_index_is_rejected() {
        let key = EventKey::try_from(ProcessedRow {
            tx_hash: "0xab".to_owned(),
            log_index: i64::from(u32::MAX).saturating_add(1),
        });
        assert!(key.is_err());
    }
}
