//! Ingest Orchestration
//!
//! The full path of one delivery: authenticate the raw bytes, parse the
//! envelope, claim the event id, route to a handler, record the outcome,
//! and map everything to the response that steers the sender's retries.

use std::sync::Arc;

use paysync_core::{
    Event, EventOutcome, IngestError, PipelineConfig, Result, SignatureError,
};

use crate::dedup::{Claim, Deduplicator};
use crate::reconcile::{Applied, Reconciler};
use crate::router::EventRouter;
use crate::signature::verify_signature;
use crate::store::StateStore;

/// Terminal disposition of one delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Event applied to local state
    Applied,
    /// Event id already claimed or processed
    DuplicateSkipped,
    /// Event at or before the entity's last applied timestamp
    StaleSkipped,
    /// No handler registered for this event type
    Unhandled(String),
    /// Recorded for operator attention without entitlement change
    Surfaced,
}

/// Response class returned to the sender.
///
/// The sender retries on server errors with exponential backoff
/// (immediate, +30s, +1m, +5m, +1h, then marked failed for manual
/// resend); success and unauthorized responses end the delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckStatus {
    /// Applied, duplicate, stale, or unknown type; no retry
    Ok,
    /// Signature failure; retrying cannot help
    Unauthorized,
    /// Processing failure; rides the sender's backoff schedule
    RetryLater,
}

/// Map a delivery result to the response class for the sender
pub fn ack_status(result: &Result<IngestOutcome>) -> AckStatus {
    match result {
        Ok(_) => AckStatus::Ok,
        Err(IngestError::Signature(_)) => AckStatus::Unauthorized,
        Err(_) => AckStatus::RetryLater,
    }
}

/// End-to-end ingestion of provider webhook deliveries
pub struct Ingestor {
    config: Arc<PipelineConfig>,
    dedup: Deduplicator,
    router: EventRouter,
}

impl Ingestor {
    /// Wire the pipeline with the default reconciliation policy
    pub fn new(config: Arc<PipelineConfig>, store: Arc<dyn StateStore>) -> Self {
        let reconciler = Arc::new(Reconciler::new(store.clone(), &config));
        let router = EventRouter::with_default_handlers(reconciler);
        Self::with_router(config, store, router)
    }

    /// Wire the pipeline with a custom handler set
    pub fn with_router(
        config: Arc<PipelineConfig>,
        store: Arc<dyn StateStore>,
        router: EventRouter,
    ) -> Self {
        let dedup = Deduplicator::new(store, &config);
        Self {
            config,
            dedup,
            router,
        }
    }

    /// Process one delivery from its raw body and signature header value.
    ///
    /// Authentication runs first, over the exact bytes received, and
    /// short-circuits every other component on failure.
    pub async fn ingest(&self, raw_body: &[u8], signature: Option<&str>) -> Result<IngestOutcome> {
        let signature = signature.ok_or(SignatureError::MissingSignature)?;
        verify_signature(self.config.signing_secret.as_bytes(), raw_body, signature)?;

        let event: Event = serde_json::from_slice(raw_body)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;
        let kind = event.kind();

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "webhook delivery received"
        );

        if self.dedup.claim(&event).await? == Claim::Duplicate {
            tracing::info!(event_id = %event.id, "duplicate delivery skipped");
            return Ok(IngestOutcome::DuplicateSkipped);
        }

        let Some(handler) = self.router.handler_for(&kind) else {
            tracing::debug!(event_type = %event.event_type, "no handler for event type");
            self.dedup.complete(&event.id, EventOutcome::Ignored).await?;
            return Ok(IngestOutcome::Unhandled(event.event_type.clone()));
        };

        match handler.apply(&event).await {
            Ok(Applied::Updated) => {
                self.dedup.complete(&event.id, EventOutcome::Applied).await?;
                Ok(IngestOutcome::Applied)
            }
            Ok(Applied::Stale) => {
                self.dedup.complete(&event.id, EventOutcome::Ignored).await?;
                Ok(IngestOutcome::StaleSkipped)
            }
            Ok(Applied::Surfaced) => {
                self.dedup.complete(&event.id, EventOutcome::Applied).await?;
                Ok(IngestOutcome::Surfaced)
            }
            Err(err) => {
                // leave the id re-claimable so the sender's retry can land
                if let Err(mark_err) = self.dedup.complete(&event.id, EventOutcome::Failed).await {
                    tracing::error!(
                        event_id = %event.id,
                        error = %mark_err,
                        "failed to record failure outcome"
                    );
                }
                Err(err)
            }
        }
    }

    /// Drop processed-event records past the retention horizon
    pub async fn prune(&self) -> Result<usize> {
        self.dedup.prune().await
    }
}
