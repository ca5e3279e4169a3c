//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] errors. Counters are unsigned in memory and `BIGINT` in the
//! database; values that do not fit either way surface as
//! [`DbError::Conversion`] instead of being clamped.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value could not be converted between its Rust and SQL forms.
    #[error("Conversion error: {field} = {value} out of range")]
    Conversion {
        /// Column name.
        field: &'static str,
        /// Offending value, formatted.
        value: String,
        /// Underlying integer conversion failure.
        #[source]
        source: std::num::TryFromIntError,
    },
}

/// Convert an unsigned counter to its `BIGINT` column value.
pub(crate) fn to_sql(field: &'static str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|source| DbError::Conversion {
        field,
        value: value.to_string(),
        source,
    })
}

/// Convert a `BIGINT` column value back to an unsigned counter.
pub(crate) fn from_sql(field: &'static str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|source| DbError::Conversion {
        field,
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn counters_round_trip_within_range() {
        assert_eq!(to_sql("n", 42).unwrap(), 42);
        assert_eq!(from_sql("n", 42).unwrap(), 42);
    }

    #[test]
    fn out_of_range_values_are_errors() {
        let err = to_sql("lifetime_chest_count", u64::MAX);
        assert!(matches!(
            err,
            Err(DbError::Conversion {
                field: "lifetime_chest_count",
                ..
            })
        ));
        assert!(from_sql("total_chest_count", -1).is_err());
    }

    #[test]
    fn conversion_error_display() {
        let err = from_sql("opened_ts", -5).unwrap_err();
        assert_eq!(err.to_string(), "Conversion error: opened_ts = -5 out of range");
    }
}
