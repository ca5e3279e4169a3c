//! Error types for the indexer binary.
//!
//! [`IndexerError`] is the top-level error type that wraps all possible
//! failure modes during startup and ingestion.

use crate::config::ConfigError;

/// Failures of an event source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// NATS connection or subscription failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// Reading the replay file failed.
    #[error("replay I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// `source.kind` is `replay` but no file was configured.
    #[error("replay source selected but source.replay_path is not set")]
    MissingReplayPath,
}

/// Top-level error for the indexer binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Database connection, migration or load failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: treasure_db::DbError,
    },

    /// Stored rows could not be rebuilt into a working set.
    #[error("hydration error: {source}")]
    Aggregator {
        /// The underlying aggregator error.
        #[from]
        source: treasure_aggregator::AggregatorError,
    },

    /// Query API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: treasure_observer::StartupError,
    },

    /// Event source failed to start.
    #[error("source error: {source}")]
    Source {
        /// The underlying source error.
        #[from]
        source: SourceError,
    },

    /// The closing flush kept failing; these rows were never persisted.
    #[error("closing flush failed, {rows} pending rows not persisted")]
    FlushFailed {
        /// Rows still pending in the working set.
        rows: usize,
    },
}
