//! Indexer binary for Daily Treasure.
//!
//! This is the main entry point that wires together the event source, the
//! aggregation pipeline, `PostgreSQL` persistence and the query API. It
//! loads configuration, rebuilds the working set from storage and then
//! applies events until the source ends or the process is interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (first CLI argument, default `treasure-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL`, run migrations, hydrate the aggregator
//!    (skipped when `pipeline.persist` is false)
//! 4. Start the query API server
//! 5. Start the event source (NATS or replay file)
//! 6. Run the pipeline until the source closes
//! 7. Log the result; a closing flush that never succeeds exits non-zero

mod config;
mod error;
mod pipeline;
mod source;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use treasure_aggregator::MemoryAggregator;
use treasure_db::PostgresPool;
use treasure_observer::AppState;
use treasure_types::DecodedEvent;

use crate::config::{IndexerConfig, LogFormat, LoggingConfig, SourceKind};
use crate::error::{IndexerError, SourceError};
use crate::pipeline::{Pipeline, PipelineReport};
use crate::source::{NatsSource, SourceStats, replay_file};

/// Config file read when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "treasure-config.yaml";

/// Application entry point for the indexer.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = IndexerConfig::load_or_default(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);

    info!(
        config_path = %config_path.display(),
        source = ?config.source.kind,
        dedup = ?config.pipeline.dedup,
        persist = config.pipeline.persist,
        flush_every_events = config.pipeline.flush_every_events,
        "treasure-indexer starting"
    );

    let report = run(config).await?;

    info!(
        received = report.received,
        applied = report.applied,
        duplicates = report.duplicates,
        anomalies = report.anomalies,
        "treasure-indexer shutdown complete"
    );

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Everything after logging is up.
async fn run(config: IndexerConfig) -> Result<PipelineReport, IndexerError> {
    // 3. Storage and working set.
    let (store, aggregator) = if config.pipeline.persist {
        info!(
            database_url = %redact(&config.infrastructure.database_url),
            "Connecting to PostgreSQL"
        );
        let (pg, snapshot) =
            PostgresPool::open_and_load(&config.infrastructure.database_url).await?;
        let aggregator = MemoryAggregator::hydrate(snapshot, config.pipeline.dedup)?;
        (Some(pg), aggregator)
    } else {
        warn!("Persistence disabled, running in memory only");
        (None, MemoryAggregator::in_memory(config.pipeline.dedup))
    };
    let state = Arc::new(AppState::new(Arc::new(RwLock::new(aggregator))));

    // 4. Query API.
    let _observer = treasure_observer::spawn_observer(config.observer.clone(), Arc::clone(&state))?;

    // 5. Event source.
    let (tx, rx) = mpsc::channel(config.pipeline.channel_capacity.max(1));
    let source = spawn_source(&config, tx).await?;

    // Interrupting stops the source; the pipeline then drains and flushes.
    let abort = source.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping event source");
            abort.abort();
        }
    });

    // 6. Pipeline. Cleanup below runs even if the closing flush failed.
    let result = Pipeline::new(
        Arc::clone(&state),
        store.as_ref(),
        config.pipeline.flush_every_events,
    )
    .run(rx)
    .await;

    match source.await {
        Ok(Ok(stats)) => info!(
            forwarded = stats.forwarded,
            malformed = stats.malformed,
            "Event source finished"
        ),
        Ok(Err(e)) => error!(error = %e, "Event source failed"),
        Err(e) if e.is_cancelled() => info!("Event source stopped"),
        Err(e) => error!(error = %e, "Event source task panicked"),
    }

    if let Some(pg) = store {
        pg.close().await;
    }

    result
}

/// Start the configured source on a background task.
///
/// Connection problems surface here rather than inside the task.
async fn spawn_source(
    config: &IndexerConfig,
    tx: mpsc::Sender<DecodedEvent>,
) -> Result<JoinHandle<Result<SourceStats, SourceError>>, SourceError> {
    match config.source.kind {
        SourceKind::Nats => {
            info!(nats_url = %config.infrastructure.nats_url, "Connecting to NATS");
            let source =
                NatsSource::connect(&config.infrastructure.nats_url, config.source.subject())
                    .await?;
            Ok(tokio::spawn(source.run(tx)))
        }
        SourceKind::Replay => {
            let path = config
                .source
                .replay_path
                .clone()
                .ok_or(SourceError::MissingReplayPath)?;
            Ok(tokio::spawn(async move { replay_file(&path, tx).await }))
        }
    }
}

/// Strip the password from a connection URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let authority_start = scheme_end.saturating_add(3);
            let credentials = url.get(authority_start..at).unwrap_or_default();
            let user = credentials.split(':').next().unwrap_or_default();
            let prefix = url.get(..authority_start).unwrap_or_default();
            let rest = url.get(at..).unwrap_or_default();
            format!("{prefix}{user}:***{rest}")
        }
        _ => url.to_owned(),
    }
}
