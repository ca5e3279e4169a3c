//! REST API endpoint handlers.
//!
//! All handlers read from the shared [`MemoryAggregator`] via
//! [`AppState`] and delegate the query logic to `treasure-analytics`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/status` | Collection sizes, cursor, counters |
//! | `GET` | `/api/users/{address}` | Single user |
//! | `GET` | `/api/users/{address}/chests` | Chest history, newest first |
//! | `GET` | `/api/leaderboard` | Ranked users |
//! | `GET` | `/api/daily` | Daily summaries ascending |
//! | `GET` | `/api/heatmap` | Weekday x hour counts |
//! | `GET` | `/api/sybil` | Per-user timing features |
//!
//! [`MemoryAggregator`]: treasure_aggregator::MemoryAggregator

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use treasure_analytics::{
    DEFAULT_BURST_WINDOW_SECS, DEFAULT_HISTORY_LIMIT, HeatmapQuery, LeaderboardQuery,
    LeaderboardSort, SybilQuery, daily_series, heatmap, leaderboard, parse_chest_kind,
    sybil_scan, user_history,
};
use treasure_types::Address;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/users/{address}/chests`.
#[derive(Debug, serde::Deserialize)]
pub struct HistoryParams {
    /// Maximum rows (default 100).
    pub limit: Option<usize>,
}

/// Query parameters for `GET /api/leaderboard`.
#[derive(Debug, serde::Deserialize)]
pub struct LeaderboardParams {
    /// `total` (default), `regular` or `premium`.
    pub sort: Option<String>,
    /// `regular` or `premium`.
    pub chest_type: Option<String>,
    /// Unix seconds lower bound for qualifying openings.
    pub since: Option<u64>,
    /// Maximum rows.
    pub limit: Option<usize>,
}

/// Query parameters for `GET /api/heatmap`.
#[derive(Debug, serde::Deserialize)]
pub struct HeatmapParams {
    /// Inclusive lower bound, unix seconds.
    pub since: Option<u64>,
    /// Inclusive upper bound, unix seconds.
    pub until: Option<u64>,
}

/// Query parameters for `GET /api/sybil`.
#[derive(Debug, serde::Deserialize)]
pub struct SybilParams {
    /// Burst window in seconds (default 60).
    pub burst_window_secs: Option<u64>,
    /// Minimum bursts to report (default 0).
    pub min_bursts: Option<u64>,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing indexer status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let aggregator = state.aggregator.read().await;
    let users = aggregator.users().len();
    let chests = aggregator.chests().len();
    let days = aggregator.days().len();
    let stats = aggregator.stats();
    let cursor = aggregator
        .last_cursor()
        .map_or_else(|| String::from("-"), |c| c.to_string());
    drop(aggregator);

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Daily Treasure Indexer</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #e3b341; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #e3b341; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        li::before {{ content: "GET "; color: #7ee787; font-weight: bold; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Daily Treasure Indexer</h1>
    <p class="subtitle">Chest event aggregates</p>

    <p>Status: <span class="status">RUNNING</span></p>

    <div>
        <div class="metric">
            <div class="label">Cursor</div>
            <div class="value">{cursor}</div>
        </div>
        <div class="metric">
            <div class="label">Users</div>
            <div class="value">{users}</div>
        </div>
        <div class="metric">
            <div class="label">Chests</div>
            <div class="value">{chests}</div>
        </div>
        <div class="metric">
            <div class="label">Days</div>
            <div class="value">{days}</div>
        </div>
        <div class="metric">
            <div class="label">Applied</div>
            <div class="value">{applied}</div>
        </div>
        <div class="metric">
            <div class="label">Duplicates</div>
            <div class="value">{skipped}</div>
        </div>
    </div>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li><a href="/api/status">/api/status</a> -- Indexer status</li>
        <li><a href="/api/leaderboard">/api/leaderboard</a> -- Leaderboard (?sort=total|regular|premium&amp;chest_type=&amp;since=&amp;limit=)</li>
        <li>/api/users/{{address}} -- Single user</li>
        <li>/api/users/{{address}}/chests -- Chest history (?limit=)</li>
        <li><a href="/api/daily">/api/daily</a> -- Daily chest opens</li>
        <li><a href="/api/heatmap">/api/heatmap</a> -- Weekday x hour heatmap (?since=&amp;until=)</li>
        <li><a href="/api/sybil">/api/sybil</a> -- Sybil features (?burst_window_secs=&amp;min_bursts=)</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li style="list-style:none;"><code>ws://host:port/ws/chests</code> -- Live chest openings</li>
    </ul>
</body>
</html>"#,
        applied = stats.applied,
        skipped = stats.skipped_duplicates,
    ))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Collection sizes, last applied cursor, running counters and the number
/// of rows waiting for the next flush.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let aggregator = state.aggregator.read().await;

    Ok(Json(serde_json::json!({
        "users": aggregator.users().len(),
        "chests": aggregator.chests().len(),
        "days": aggregator.days().len(),
        "lastCursor": aggregator.last_cursor(),
        "stats": aggregator.stats(),
        "dedup": aggregator.policy(),
        "pendingWrites": aggregator.pending_len(),
        "balanced": aggregator.verify_conservation().is_balanced(),
    })))
}

// ---------------------------------------------------------------------------
// GET /api/users/{address}
// ---------------------------------------------------------------------------

/// Return a single user's counters and premium flag.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = Address::new(&address);
    let aggregator = state.aggregator.read().await;

    let user = aggregator
        .users()
        .get_ref(&id)
        .ok_or_else(|| ObserverError::NotFound(format!("user {id}")))?;

    Ok(Json(serde_json::to_value(user)?))
}

// ---------------------------------------------------------------------------
// GET /api/users/{address}/chests
// ---------------------------------------------------------------------------

/// Return one user's chest openings, newest first.
pub async fn get_user_chests(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = Address::new(&address);
    let aggregator = state.aggregator.read().await;

    if aggregator.users().get_ref(&id).is_none() {
        return Err(ObserverError::NotFound(format!("user {id}")));
    }

    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let chests = user_history(aggregator.chests().values(), &id, limit);

    Ok(Json(serde_json::json!({
        "user": id,
        "count": chests.len(),
        "chests": chests,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/leaderboard
// ---------------------------------------------------------------------------

/// Rank users by a lifetime counter, optionally restricted to users with a
/// qualifying opening.
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let query = LeaderboardQuery {
        sort: params
            .sort
            .as_deref()
            .map(str::parse::<LeaderboardSort>)
            .transpose()?
            .unwrap_or_default(),
        chest_type: params.chest_type.as_deref().map(parse_chest_kind).transpose()?,
        since: params.since,
        limit: params.limit,
    };

    let aggregator = state.aggregator.read().await;
    let entries = leaderboard(
        aggregator.users().values(),
        aggregator.chests().values(),
        &query,
    );

    Ok(Json(serde_json::json!({
        "count": entries.len(),
        "entries": entries,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/daily
// ---------------------------------------------------------------------------

/// Return every daily summary in ascending date order.
pub async fn get_daily(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let aggregator = state.aggregator.read().await;
    let days = daily_series(aggregator.days().values());

    Ok(Json(serde_json::json!({
        "count": days.len(),
        "days": days,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/heatmap
// ---------------------------------------------------------------------------

/// Return weekday x hour opening counts for each tier.
pub async fn get_heatmap(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HeatmapParams>,
) -> Result<impl IntoResponse, ObserverError> {
    if let (Some(since), Some(until)) = (params.since, params.until) {
        if since > until {
            return Err(ObserverError::InvalidQuery(format!(
                "since ({since}) is after until ({until})"
            )));
        }
    }

    let query = HeatmapQuery {
        since: params.since,
        until: params.until,
    };

    let aggregator = state.aggregator.read().await;
    let map = heatmap(aggregator.chests().values(), &query);

    Ok(Json(serde_json::to_value(map)?))
}

// ---------------------------------------------------------------------------
// GET /api/sybil
// ---------------------------------------------------------------------------

/// Return per-user timing features, burstiest first.
pub async fn get_sybil(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SybilParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let query = SybilQuery {
        burst_window_secs: params.burst_window_secs.unwrap_or(DEFAULT_BURST_WINDOW_SECS),
        min_bursts: params.min_bursts.unwrap_or(0),
    };

    let aggregator = state.aggregator.read().await;
    let features = sybil_scan(
        aggregator.users().values(),
        aggregator.chests().values(),
        &query,
    );

    Ok(Json(serde_json::json!({
        "burstWindowSecs": query.burst_window_secs,
        "count": features.len(),
        "users": features,
    })))
}
