//! Operations on the `users` table.

use sqlx::{PgConnection, PgPool};
use treasure_types::{Address, User};

use crate::error::{DbError, from_sql, to_sql};

/// Rows bound per `UNNEST` statement.
const BATCH_SIZE: usize = 500;

/// Operations on the `users` table.
pub struct UserStore<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStore<'a> {
    /// Create a new user store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Upsert users on an existing connection or transaction.
    ///
    /// Counter columns are overwritten with the given absolute values.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] if a counter exceeds `BIGINT`.
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_in(&self, conn: &mut PgConnection, users: &[User]) -> Result<(), DbError> {
        for chunk in users.chunks(BATCH_SIZE) {
            let len = chunk.len();
            let mut ids = Vec::with_capacity(len);
            let mut regular = Vec::with_capacity(len);
            let mut premium = Vec::with_capacity(len);
            let mut total = Vec::with_capacity(len);
            let mut flags = Vec::with_capacity(len);

            for user in chunk {
                ids.push(user.id.as_str().to_owned());
                regular.push(to_sql("lifetime_chest_count", user.lifetime_chest_count)?);
                premium.push(to_sql(
                    "lifetime_premium_chest_count",
                    user.lifetime_premium_chest_count,
                )?);
                total.push(to_sql(
                    "lifetime_total_chest_count",
                    user.lifetime_total_chest_count,
                )?);
                flags.push(user.is_premium_user);
            }

            sqlx::query(
                r"INSERT INTO users (id, lifetime_chest_count, lifetime_premium_chest_count, lifetime_total_chest_count, is_premium_user)
                  SELECT * FROM UNNEST($1::TEXT[], $2::BIGINT[], $3::BIGINT[], $4::BIGINT[], $5::BOOLEAN[])
                  ON CONFLICT (id) DO UPDATE SET
                      lifetime_chest_count = EXCLUDED.lifetime_chest_count,
                      lifetime_premium_chest_count = EXCLUDED.lifetime_premium_chest_count,
                      lifetime_total_chest_count = EXCLUDED.lifetime_total_chest_count,
                      is_premium_user = EXCLUDED.is_premium_user,
                      updated_at = now()",
            )
            .bind(&ids)
            .bind(&regular)
            .bind(&premium)
            .bind(&total)
            .bind(&flags)
            .execute(&mut *conn)
            .await?;
        }

        tracing::debug!(count = users.len(), "Upserted users (batch UNNEST)");
        Ok(())
    }

    /// Load every user.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query or a row conversion fails.
    pub async fn load_all(&self) -> Result<Vec<User>, DbError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r"SELECT id, lifetime_chest_count, lifetime_premium_chest_count, lifetime_total_chest_count, is_premium_user
              FROM users
              ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }
}

/// A row from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// Lowercase wallet address.
    pub id: String,
    /// Regular chests.
    pub lifetime_chest_count: i64,
    /// Premium chests.
    pub lifetime_premium_chest_count: i64,
    /// Regular plus premium.
    pub lifetime_total_chest_count: i64,
    /// Premium flag.
    pub is_premium_user: bool,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Address::new(&row.id),
            lifetime_chest_count: from_sql("lifetime_chest_count", row.lifetime_chest_count)?,
            lifetime_premium_chest_count: from_sql(
                "lifetime_premium_chest_count",
                row.lifetime_premium_chest_count,
            )?,
            lifetime_total_chest_count: from_sql(
                "lifetime_total_chest_count",
                row.lifetime_total_chest_count,
            )?,
            is_premium_user: row.is_premium_user,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(regular: i64) -> UserRow {
        UserRow {
            id: "0xAbC".to_owned(),
            lifetime_chest_count: regular,
            lifetime_premium_chest_count: 1,
            lifetime_total_chest_count: regular.saturating_add(1),
            is_premium_user: true,
        }
    }

    #[test]
    fn row_converts_to_user() {
        let user = User::try_from(row(2)).unwrap();
        assert_eq!(user.id.as_str(), "0xabc");
        assert_eq!(user.lifetime_total_chest_count, 3);
        assert!(user.is_premium_user);
        assert!(user.is_consistent());
    }

    #[test]
    fn negative_counter_is_rejected() {
        assert!(matches!(
            User::try_from(row(-1)),
            Err(DbError::Conversion {
                field: "lifetime_chest_count",
                ..
            })
        ));
    }
}
