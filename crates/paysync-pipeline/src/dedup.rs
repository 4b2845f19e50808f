//! Event Deduplication
//!
//! Guards idempotent application: each event id is claimed exactly once
//! before any handler runs. Concurrent duplicates lose the claim race and
//! are acknowledged without side effects.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use paysync_core::{
    Event, EventId, EventOutcome, IngestError, PipelineConfig, ProcessedEventRecord, Result,
};

use crate::store::{bounded, StateStore};

/// Result of attempting to claim an event id
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Claim {
    /// This caller won the claim and must later call `complete`
    Fresh,
    /// Already claimed or processed; skip without error
    Duplicate,
}

/// Tracks processed event identifiers through the state store
pub struct Deduplicator {
    store: Arc<dyn StateStore>,
    timeout: Duration,
    retention: Duration,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn StateStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            timeout: config.storage_timeout,
            retention: config.dedup_retention,
        }
    }

    /// Atomically check-and-record the event id before processing begins.
    pub async fn claim(&self, event: &Event) -> Result<Claim> {
        let record = ProcessedEventRecord {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            processed_at: Utc::now(),
            outcome: EventOutcome::Pending,
        };

        let inserted = bounded(self.timeout, self.store.insert_event_if_absent(record)).await?;
        Ok(if inserted {
            Claim::Fresh
        } else {
            Claim::Duplicate
        })
    }

    /// Record the terminal outcome for a claimed event.
    ///
    /// A `Failed` outcome leaves the id re-claimable, so the sender's
    /// retry after our server error actually reprocesses the event.
    pub async fn complete(&self, event_id: &EventId, outcome: EventOutcome) -> Result<()> {
        bounded(
            self.timeout,
            self.store.mark_event_outcome(event_id, outcome),
        )
        .await
    }

    /// Drop records past the retention horizon; returns how many.
    pub async fn prune(&self) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| IngestError::Config(format!("retention out of range: {e}")))?;
        let horizon = Utc::now() - retention;
        let removed = bounded(self.timeout, self.store.prune_events(horizon)).await?;
        if removed > 0 {
            tracing::info!(removed, "pruned processed-event records");
        }
        Ok(removed)
    }
}
