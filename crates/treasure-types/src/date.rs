//! UTC calendar-day derivation for daily aggregates.
//!
//! Event timestamps are unix seconds. Daily summaries are keyed by the UTC
//! date portion of the ISO-8601 representation, so the result never depends
//! on the process timezone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// ISO `YYYY-MM-DD` key identifying a [`DailyChestOpen`](crate::DailyChestOpen).
///
/// Always four-digit years: timestamps past the end of 9999 are clamped by
/// [`to_iso_date`], so lexicographic order is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DateKey(String);

impl DateKey {
    /// Borrow the date string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the date string.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Wrap an already formatted date string (e.g. a row loaded from storage).
    pub const fn from_stored(date: String) -> Self {
        Self(date)
    }
}

impl core::fmt::Display for DateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `9999-12-31T23:59:59Z`, the last second with a four-digit year.
pub const MAX_TIMESTAMP: u64 = 253_402_300_799;

/// Convert a unix timestamp in seconds to a UTC [`DateTime`].
///
/// Timestamps past [`MAX_TIMESTAMP`] are clamped to it.
pub fn utc_datetime(timestamp: u64) -> DateTime<Utc> {
    i64::try_from(timestamp.min(MAX_TIMESTAMP))
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Derive the UTC calendar date of a unix timestamp, truncating time of day.
pub fn to_iso_date(timestamp: u64) -> DateKey {
    DateKey(utc_datetime(timestamp).format("%Y-%m-%d").to_string())
}
