//! Decoded-event sources feeding the pipeline.
//!
//! Both sources only deserialize and forward: they push [`DecodedEvent`]s
//! into the bounded channel the pipeline drains, and stop as soon as the
//! pipeline side is dropped.
//!
//! # NATS
//!
//! [`NatsSource`] subscribes to `{subject_prefix}.>`. Each message payload
//! is one JSON-encoded [`DecodedEvent`]. The upstream host publishes in
//! chain order, so a single subscription preserves ordering.
//!
//! # Replay
//!
//! [`replay_file`] reads a JSON-lines file once. Blank lines are ignored;
//! lines that fail to parse are logged and skipped.

use std::path::Path;

use futures::StreamExt as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use treasure_types::DecodedEvent;

use crate::error::SourceError;

/// Counters reported by a source when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Events handed to the pipeline.
    pub forwarded: u64,
    /// Payloads or lines that did not decode.
    pub malformed: u64,
}

/// Parse one replay line.
///
/// Returns `None` for blank lines.
pub fn parse_line(line: &str) -> Option<Result<DecodedEvent, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

/// Replay a JSON-lines file into the pipeline channel.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the file cannot be opened or read.
pub async fn replay_file(
    path: &Path,
    tx: mpsc::Sender<DecodedEvent>,
) -> Result<SourceStats, SourceError> {
    let file = tokio::fs::File::open(path).await?;
    info!(path = %path.display(), "Replaying events from file");
    replay_lines(BufReader::new(file), tx).await
}

/// Replay JSON lines from any buffered reader.
///
/// # Errors
///
/// Returns [`SourceError::Io`] on a read failure.
pub async fn replay_lines<R>(
    reader: R,
    tx: mpsc::Sender<DecodedEvent>,
) -> Result<SourceStats, SourceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = SourceStats::default();
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        line_no = line_no.saturating_add(1);
        match parse_line(&line) {
            None => {}
            Some(Ok(event)) => {
                if tx.send(event).await.is_err() {
                    debug!(line_no, "Pipeline closed, stopping replay");
                    break;
                }
                stats.forwarded = stats.forwarded.saturating_add(1);
            }
            Some(Err(e)) => {
                warn!(line_no, error = %e, "Skipping malformed replay line");
                stats.malformed = stats.malformed.saturating_add(1);
            }
        }
    }

    info!(
        forwarded = stats.forwarded,
        malformed = stats.malformed,
        "Replay finished"
    );
    Ok(stats)
}

/// Subscribes to decoded events published on NATS.
pub struct NatsSource {
    /// The NATS client connection.
    client: async_nats::Client,
    /// Wildcard subject to subscribe to.
    subject: String,
}

impl NatsSource {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Nats`] if the connection fails.
    pub async fn connect(url: &str, subject: String) -> Result<Self, SourceError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| SourceError::Nats {
                message: format!("failed to connect to NATS at {url}: {e}"),
            })?;
        Ok(Self { client, subject })
    }

    /// Subscribe and forward every decodable message until the
    /// subscription ends or the pipeline is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Nats`] if the subscription cannot be created.
    pub async fn run(self, tx: mpsc::Sender<DecodedEvent>) -> Result<SourceStats, SourceError> {
        let mut sub = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| SourceError::Nats {
                message: format!("failed to subscribe to {}: {e}", self.subject),
            })?;
        info!(subject = %self.subject, "Subscribed to decoded events");

        let mut stats = SourceStats::default();
        while let Some(msg) = sub.next().await {
            match serde_json::from_slice::<DecodedEvent>(&msg.payload) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        debug!("Pipeline closed, stopping NATS source");
                        break;
                    }
                    stats.forwarded = stats.forwarded.saturating_add(1);
                }
                Err(e) => {
                    warn!(
                        subject = %msg.subject,
                        error = %e,
                        "Failed to deserialize decoded event"
                    );
                    stats.malformed = stats.malformed.saturating_add(1);
                }
            }
        }

        // Best-effort: the connection is dropped right after.
        let _ = sub.unsubscribe().await;
        Ok(stats)
    }
}
