//! # Outbox Relay
//!
//! Publishes committed ledger events to whoever consumes them (accounting,
//! notifications). Nothing is published before its transaction commits,
//! because the relay only ever reads the outbox table.
//!
//! ## Relay Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  every poll_interval (or relay_once on demand)                          │
//! │                                                                         │
//! │  1. Poll:    pending entries, attempts < max_attempts, oldest first     │
//! │  2. Decode:  payload → LedgerEvent     (corrupt → counted as failure)   │
//! │  3. Publish: sink.publish(&event)                                       │
//! │  4. Mark:    ok  → delivered_at = now                                   │
//! │              err → attempts += 1, last_error                            │
//! │                    attempts == max → warn, entry no longer polled       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at least once. Sinks deduplicate on `event_key`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::OutboxSettings;
use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::outbox::OutboxEntry;
use till_core::LedgerEvent;

// =============================================================================
// Sink
// =============================================================================

/// A sink refused or failed to take an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        SinkError(message.into())
    }
}

/// Consumer of ledger events.
#[async_trait]
pub trait LedgerEventSink: Send + Sync {
    async fn publish(&self, event: &LedgerEvent) -> Result<(), SinkError>;
}

/// Sink that only writes each event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

#[async_trait]
impl LedgerEventSink for LoggingSink {
    async fn publish(&self, event: &LedgerEvent) -> Result<(), SinkError> {
        info!(
            event_key = %event.event_key,
            kind = event.kind.as_str(),
            business_id = %event.business_id,
            "Ledger event"
        );
        Ok(())
    }
}

// =============================================================================
// Relay
// =============================================================================

/// Outcome of one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Handle for stopping a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl RelayHandle {
    /// Asks the relay loop to stop after its current pass.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

pub struct OutboxRelay {
    db: Database,
    sink: Arc<dyn LedgerEventSink>,
    settings: OutboxSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

impl OutboxRelay {
    /// Creates a relay and the handle that stops it.
    pub fn new(
        db: Database,
        sink: Arc<dyn LedgerEventSink>,
        settings: OutboxSettings,
    ) -> (Self, RelayHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let relay = OutboxRelay {
            db,
            sink,
            settings,
            shutdown_rx,
        };

        (relay, RelayHandle { shutdown_tx })
    }

    /// Runs the relay loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.settings.poll_interval_secs,
            "Outbox relay starting"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.relay_once().await {
                        error!(?e, "Outbox relay pass failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Outbox relay shutting down");
                    break;
                }
            }
        }

        info!("Outbox relay stopped");
    }

    /// Publishes one batch of pending events.
    pub async fn relay_once(&self) -> DbResult<RelayReport> {
        let outbox = self.db.outbox();
        let entries = outbox
            .get_pending(self.settings.batch_size, self.settings.max_attempts)
            .await?;

        if entries.is_empty() {
            debug!("No pending ledger events");
            return Ok(RelayReport::default());
        }

        let mut report = RelayReport::default();
        for entry in &entries {
            match self.publish(entry).await {
                Ok(()) => {
                    outbox.mark_delivered(&entry.id).await?;
                    report.delivered += 1;
                }
                Err(reason) => {
                    let attempts = outbox.mark_failed(&entry.id, &reason).await?;
                    report.failed += 1;

                    if attempts >= self.settings.max_attempts {
                        warn!(
                            event_key = %entry.event_key,
                            attempts,
                            error = %reason,
                            "Ledger event exceeded max attempts, skipping from now on"
                        );
                    } else {
                        debug!(event_key = %entry.event_key, attempts, error = %reason, "Ledger event delivery failed");
                    }
                }
            }
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            "Outbox relay pass complete"
        );
        Ok(report)
    }

    async fn publish(&self, entry: &OutboxEntry) -> Result<(), String> {
        let event = entry.event().map_err(|e| e.to_string())?;
        self.sink.publish(&event).await.map_err(|e| e.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
