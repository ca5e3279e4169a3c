//! Per-user chest history and the daily series.

use treasure_types::{Address, ChestOpened, DailyChestOpen};

/// Number of history rows returned when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One user's openings, newest first, truncated to `limit`.
pub fn user_history<'a>(
    chests: impl IntoIterator<Item = &'a ChestOpened>,
    user: &Address,
    limit: usize,
) -> Vec<ChestOpened> {
    let mut history: Vec<&ChestOpened> = chests.into_iter().filter(|c| &c.user == user).collect();
    history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    history.into_iter().take(limit).cloned().collect()
}

/// All daily summaries in ascending date order.
pub fn daily_series<'a>(days: impl IntoIterator<Item = &'a DailyChestOpen>) -> Vec<DailyChestOpen> {
    let mut series: Vec<DailyChestOpen> = days.into_iter().cloned().collect();
    series.sort_by(|a, b| a.id.cmp(&b.id));
    series
}
