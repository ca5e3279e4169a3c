//! Operations on the `daily_chest_opens` table.

use sqlx::{PgConnection, PgPool};
use treasure_types::{DailyChestOpen, DateKey};

use crate::error::{DbError, from_sql, to_sql};

/// Operations on the `daily_chest_opens` table.
///
/// One row per UTC day, so batches are small; no chunking.
pub struct DailyStore<'a> {
    pool: &'a PgPool,
}

impl<'a> DailyStore<'a> {
    /// Create a new daily store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Upsert daily summaries on an existing connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] if a counter exceeds `BIGINT`.
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_in(
        &self,
        conn: &mut PgConnection,
        days: &[DailyChestOpen],
    ) -> Result<(), DbError> {
        if days.is_empty() {
            return Ok(());
        }

        let mut ids = Vec::with_capacity(days.len());
        let mut dates = Vec::with_capacity(days.len());
        let mut regular = Vec::with_capacity(days.len());
        let mut premium = Vec::with_capacity(days.len());
        let mut total = Vec::with_capacity(days.len());

        for day in days {
            ids.push(day.id.as_str().to_owned());
            dates.push(day.date.clone());
            regular.push(to_sql("regular_chest_count", day.regular_chest_count)?);
            premium.push(to_sql("premium_chest_count", day.premium_chest_count)?);
            total.push(to_sql("total_chest_count", day.total_chest_count)?);
        }

        sqlx::query(
            r"INSERT INTO daily_chest_opens (id, date, regular_chest_count, premium_chest_count, total_chest_count)
              SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::BIGINT[], $4::BIGINT[], $5::BIGINT[])
              ON CONFLICT (id) DO UPDATE SET
                  regular_chest_count = EXCLUDED.regular_chest_count,
                  premium_chest_count = EXCLUDED.premium_chest_count,
                  total_chest_count = EXCLUDED.total_chest_count,
                  updated_at = now()",
        )
        .bind(&ids)
        .bind(&dates)
        .bind(&regular)
        .bind(&premium)
        .bind(&total)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(count = days.len(), "Upserted daily summaries");
        Ok(())
    }

    /// Load every daily summary in ascending date order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query or a row conversion fails.
    pub async fn load_all(&self) -> Result<Vec<DailyChestOpen>, DbError> {
        let rows = sqlx::query_as::<_, DailyRow>(
            r"SELECT id, date, regular_chest_count, premium_chest_count, total_chest_count
              FROM daily_chest_opens
              ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(DailyChestOpen::try_from).collect()
    }
}

/// A row from the `daily_chest_opens` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyRow {
    /// ISO date key.
    pub id: String,
    /// Same as `id`.
    pub date: String,
    /// Regular chests that day.
    pub regular_chest_count: i64,
    /// Premium chests that day.
    pub premium_chest_count: i64,
    /// Regular plus premium.
    pub total_chest_count: i64,
}

impl TryFrom<DailyRow> for DailyChestOpen {
    type Error = DbError;

    fn try_from(row: DailyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: DateKey::from_stored(row.id),
            date: row.date,
            regular_chest_count: from_sql("regular_chest_count", row.regular_chest_count)?,
            premium_chest_count: from_sql("premium_chest_count", row.premium_chest_count)?,
            total_chest_count: from_sql("total_chest_count", row.total_chest_count)?,
        })
    }
}
