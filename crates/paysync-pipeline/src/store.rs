//! State Storage
//!
//! Persistence seam consumed by the deduplicator and reconciler. The
//! in-memory implementation backs tests and single-process deployments;
//! a database-backed implementation plugs in behind the same trait.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use paysync_core::{
    CustomerState, EventId, EventOutcome, IngestError, ProcessedEventRecord, Result,
    SubscriptionState,
};

/// Storage operations required by the pipeline
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create or replace a subscription record
    async fn upsert_subscription(&self, state: SubscriptionState) -> Result<()>;

    async fn get_subscription(&self, id: &str) -> Result<Option<SubscriptionState>>;

    /// Create or replace a customer record
    async fn upsert_customer(&self, state: CustomerState) -> Result<()>;

    async fn get_customer(&self, id: &str) -> Result<Option<CustomerState>>;

    /// Atomically record `record` unless an entry for its event id exists.
    ///
    /// Returns `true` when this caller inserted the record. The check and
    /// insert must be a single atomic operation: concurrent duplicate
    /// deliveries race on this call and exactly one wins. An existing
    /// record with outcome `Failed` is replaced, so redelivery after a
    /// processing failure gets another attempt.
    async fn insert_event_if_absent(&self, record: ProcessedEventRecord) -> Result<bool>;

    /// Record the terminal outcome for a previously claimed event
    async fn mark_event_outcome(&self, event_id: &EventId, outcome: EventOutcome) -> Result<()>;

    async fn get_event_record(&self, event_id: &EventId) -> Result<Option<ProcessedEventRecord>>;

    /// Drop processed-event records older than `horizon`; returns how many
    async fn prune_events(&self, horizon: DateTime<Utc>) -> Result<usize>;
}

/// Bound a storage call by the configured timeout.
///
/// A timeout is this attempt's failure and rides the sender's retry path;
/// retrying internally would compound with the sender's own schedule.
pub(crate) async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(IngestError::Timeout(limit)),
    }
}

/// In-memory store for tests and single-process deployments
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: Mutex<HashMap<String, SubscriptionState>>,
    customers: Mutex<HashMap<String, CustomerState>>,
    events: Mutex<HashMap<EventId, ProcessedEventRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn upsert_subscription(&self, state: SubscriptionState) -> Result<()> {
        self.subscriptions
            .lock()
            .await
            .insert(state.id.clone(), state);
        Ok(())
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<SubscriptionState>> {
        Ok(self.subscriptions.lock().await.get(id).cloned())
    }

    async fn upsert_customer(&self, state: CustomerState) -> Result<()> {
        self.customers.lock().await.insert(state.id.clone(), state);
        Ok(())
    }

    async fn get_customer(&self, id: &str) -> Result<Option<CustomerState>> {
        Ok(self.customers.lock().await.get(id).cloned())
    }

    async fn insert_event_if_absent(&self, record: ProcessedEventRecord) -> Result<bool> {
        // single lock around check + insert keeps the operation atomic
        let mut events = self.events.lock().await;
        match events.get(&record.event_id) {
            Some(existing) if existing.outcome != EventOutcome::Failed => Ok(false),
            _ => {
                events.insert(record.event_id.clone(), record);
                Ok(true)
            }
        }
    }

    async fn mark_event_outcome(&self, event_id: &EventId, outcome: EventOutcome) -> Result<()> {
        let mut events = self.events.lock().await;
        match events.get_mut(event_id) {
            Some(record) => {
                record.outcome = outcome;
                record.processed_at = Utc::now();
                Ok(())
            }
            None => Err(IngestError::Storage(format!(
                "no processed-event record for {event_id}"
            ))),
        }
    }

    async fn get_event_record(&self, event_id: &EventId) -> Result<Option<ProcessedEventRecord>> {
        Ok(self.events.lock().await.get(event_id).cloned())
    }

    async fn prune_events(&self, horizon: DateTime<Utc>) -> Result<usize> {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|_, record| record.processed_at >= horizon);
        Ok(before - events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn record(id: &str, outcome: EventOutcome) -> ProcessedEventRecord {
        ProcessedEventRecord {
            event_id: EventId::new(id),
            event_type: "subscription.paid".into(),
            processed_at: Utc::now(),
            outcome,
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_single_winner() {
        let store = MemoryStore::new();
        assert!(store
            .insert_event_if_absent(record("evt_1", EventOutcome::Pending))
            .await
            .unwrap());
        assert!(!store
            .insert_event_if_absent(record("evt_1", EventOutcome::Pending))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failed_record_is_reclaimable() {
        let store = MemoryStore::new();
        let id = EventId::new("evt_1");

        store
            .insert_event_if_absent(record("evt_1", EventOutcome::Pending))
            .await
            .unwrap();
        store
            .mark_event_outcome(&id, EventOutcome::Failed)
            .await
            .unwrap();

        assert!(store
            .insert_event_if_absent(record("evt_1", EventOutcome::Pending))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_applied_record_is_not_reclaimable() {
        let store = MemoryStore::new();
        let id = EventId::new("evt_1");

        store
            .insert_event_if_absent(record("evt_1", EventOutcome::Pending))
            .await
            .unwrap();
        store
            .mark_event_outcome(&id, EventOutcome::Applied)
            .await
            .unwrap();

        assert!(!store
            .insert_event_if_absent(record("evt_1", EventOutcome::Pending))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_prune_drops_only_old_records() {
        let store = MemoryStore::new();
        let mut old = record("evt_old", EventOutcome::Applied);
        old.processed_at = Utc::now() - ChronoDuration::days(40);
        store.insert_event_if_absent(old).await.unwrap();
        store
            .insert_event_if_absent(record("evt_new", EventOutcome::Applied))
            .await
            .unwrap();

        let horizon = Utc::now() - ChronoDuration::days(30);
        assert_eq!(store.prune_events(horizon).await.unwrap(), 1);
        assert!(store
            .get_event_record(&EventId::new("evt_new"))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_event_record(&EventId::new("evt_old"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_outcome_without_claim_is_a_storage_error() {
        let store = MemoryStore::new();
        let result = store
            .mark_event_outcome(&EventId::new("evt_missing"), EventOutcome::Applied)
            .await;
        assert!(matches!(result, Err(IngestError::Storage(_))));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(IngestError::Timeout(_))));
    }
}
