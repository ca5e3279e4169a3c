//! Operations on the `chest_opens` table.
//!
//! One row per chest-opening transaction. Rows are normally written once;
//! a redelivery applied with duplicate detection disabled overwrites the
//! row in place, matching the in-memory behaviour.

use sqlx::{PgConnection, PgPool};
use treasure_types::{Address, ChestOpened, TxHash, utc_datetime};

use crate::error::{DbError, from_sql, to_sql};

/// Rows bound per `UNNEST` statement.
const BATCH_SIZE: usize = 500;

/// Operations on the `chest_opens` table.
pub struct ChestStore<'a> {
    pool: &'a PgPool,
}

impl<'a> ChestStore<'a> {
    /// Create a new chest store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Write chest records on an existing connection or transaction.
    ///
    /// Referenced users must already exist in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] if a timestamp exceeds `BIGINT`.
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn upsert_in(
        &self,
        conn: &mut PgConnection,
        chests: &[ChestOpened],
    ) -> Result<(), DbError> {
        for chunk in chests.chunks(BATCH_SIZE) {
            let len = chunk.len();
            let mut hashes = Vec::with_capacity(len);
            let mut users = Vec::with_capacity(len);
            let mut stamps = Vec::with_capacity(len);
            let mut opened_at = Vec::with_capacity(len);
            let mut premium = Vec::with_capacity(len);

            for chest in chunk {
                hashes.push(chest.id.as_str().to_owned());
                users.push(chest.user.as_str().to_owned());
                stamps.push(to_sql("opened_ts", chest.timestamp)?);
                opened_at.push(utc_datetime(chest.timestamp));
                premium.push(chest.is_premium);
            }

            sqlx::query(
                r"INSERT INTO chest_opens (tx_hash, user_id, opened_ts, opened_at, is_premium)
                  SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::BIGINT[], $4::TIMESTAMPTZ[], $5::BOOLEAN[])
                  ON CONFLICT (tx_hash) DO UPDATE SET
                      user_id = EXCLUDED.user_id,
                      opened_ts = EXCLUDED.opened_ts,
                      opened_at = EXCLUDED.opened_at,
                      is_premium = EXCLUDED.is_premium",
            )
            .bind(&hashes)
            .bind(&users)
            .bind(&stamps)
            .bind(&opened_at)
            .bind(&premium)
            .execute(&mut *conn)
            .await?;
        }

        tracing::debug!(count = chests.len(), "Wrote chest records (batch UNNEST)");
        Ok(())
    }

    /// Load every chest record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query or a row conversion fails.
    pub async fn load_all(&self) -> Result<Vec<ChestOpened>, DbError> {
        let rows = sqlx::query_as::<_, ChestRow>(
            r"SELECT tx_hash, user_id, opened_ts, is_premium
              FROM chest_opens
              ORDER BY opened_ts, tx_hash",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(ChestOpened::try_from).collect()
    }
}

/// A row from the `chest_opens` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChestRow {
    /// Transaction hash.
    pub tx_hash: String,
    /// Opening user.
    pub user_id: String,
    /// Unix seconds.
    pub opened_ts: i64,
    /// Tier flag.
    pub is_premium: bool,
}

impl TryFrom<ChestRow> for ChestOpened {
    type Error = DbError;

    fn try_from(row: ChestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TxHash::new(&row.tx_hash),
            user: Address::new(&row.user_id),
            timestamp: from_sql("opened_ts", row.opened_ts)?,
            is_premium: row.is_premium,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn row_converts_to_record() {
        let row = ChestRow {
            tx_hash: "0xFF".to_owned(),
            user_id: "0xAA".to_owned(),
            opened_ts: 1_700_000_000,
            is_premium: true,
        };
        let chest = ChestOpened::try_from(row).unwrap();
        assert_eq!(chest.id.as_str(), "0xff");
        assert_eq!(chest.user.as_str(), "0xaa");
        assert_eq!(chest.timestamp, 1_700_000_000);
        assert!(chest.is_premium);
    }
}
