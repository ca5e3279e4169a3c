//! Weekday x hour-of-day activity grid.
//!
//! Buckets are UTC. Rows are weekdays starting Monday, columns are hours
//! `0..24`. Regular and premium openings are counted separately.

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use treasure_types::{ChestKind, ChestOpened, utc_datetime};

/// Row labels of [`Heatmap`] grids.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Counts per weekday row and hour column.
pub type HeatmapGrid = [[u64; 24]; 7];

/// Time range for [`heatmap`]. Both bounds are inclusive unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeatmapQuery {
    /// Lower bound.
    pub since: Option<u64>,
    /// Upper bound.
    pub until: Option<u64>,
}

impl HeatmapQuery {
    fn contains(&self, timestamp: u64) -> bool {
        self.since.is_none_or(|since| timestamp >= since)
            && self.until.is_none_or(|until| timestamp <= until)
    }
}

/// Opening counts by weekday and hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heatmap {
    /// Row labels.
    pub weekdays: Vec<String>,
    /// Regular openings.
    pub regular: HeatmapGrid,
    /// Premium openings.
    pub premium: HeatmapGrid,
    /// Openings in range.
    pub total_opens: u64,
}

impl Default for Heatmap {
    fn default() -> Self {
        Self {
            weekdays: WEEKDAYS.iter().map(|d| (*d).to_owned()).collect(),
            regular: [[0; 24]; 7],
            premium: [[0; 24]; 7],
            total_opens: 0,
        }
    }
}

impl Heatmap {
    /// Count at `(weekday, hour)` for one tier; `weekday` 0 is Monday.
    pub fn get(&self, kind: ChestKind, weekday: usize, hour: usize) -> u64 {
        let grid = match kind {
            ChestKind::Regular => &self.regular,
            ChestKind::Premium => &self.premium,
        };
        grid.get(weekday)
            .and_then(|row| row.get(hour))
            .copied()
            .unwrap_or(0)
    }

    fn record(&mut self, kind: ChestKind, weekday: usize, hour: usize) {
        let grid = match kind {
            ChestKind::Regular => &mut self.regular,
            ChestKind::Premium => &mut self.premium,
        };
        if let Some(cell) = grid.get_mut(weekday).and_then(|row| row.get_mut(hour)) {
            *cell = cell.saturating_add(1);
            self.total_opens = self.total_opens.saturating_add(1);
        }
    }
}

/// Build the grid from chest records within `query`'s range.
pub fn heatmap<'a>(
    chests: impl IntoIterator<Item = &'a ChestOpened>,
    query: &HeatmapQuery,
) -> Heatmap {
    let mut map = Heatmap::default();
    for chest in chests.into_iter().filter(|c| query.contains(c.timestamp)) {
        let at = utc_datetime(chest.timestamp);
        let weekday = usize::try_from(at.weekday().num_days_from_monday()).unwrap_or(usize::MAX);
        let hour = usize::try_from(at.hour()).unwrap_or(usize::MAX);
        map.record(chest.kind(), weekday, hour);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use treasure_types::{Address, TxHash};

    fn chest(timestamp: u64, is_premium: bool) -> ChestOpened {
        ChestOpened {
            id: TxHash::new(&format!("0x{timestamp:x}")),
            user: Address::new("0xa"),
            timestamp,
            is_premium,
        }
    }

    #[test]
    fn buckets_by_utc_weekday_and_hour() {
        // 2023-11-14T22:13:20Z is a Tuesday.
        let chests = [chest(1_700_000_000, false), chest(1_700_000_100, true)];
        let map = heatmap(&chests, &HeatmapQuery::default());
        assert_eq!(map.get(ChestKind::Regular, 1, 22), 1);
        assert_eq!(map.get(ChestKind::Premium, 1, 22), 1);
        assert_eq!(map.get(ChestKind::Regular, 0, 22), 0);
        assert_eq!(map.total_opens, 2);
        assert_eq!(map.weekdays.first().map(String::as_str), Some("Monday"));
    }

    #[test]
    fn range_is_inclusive() {
        let chests = [chest(100, false), chest(200, false), chest(300, false)];
        let query = HeatmapQuery {
            since: Some(200),
            until: Some(300),
        };
        assert_eq!(heatmap(&chests, &query).total_opens, 2);
    }
}
