//! State Reconciliation
//!
//! Applies event payloads to local subscription and customer state under
//! the ordering rules: per-subscription application is serialized, and an
//! event at or before the last applied timestamp never regresses state.
//! Getting the revocation timing wrong here either strands paying
//! customers without access or hands out free extended access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use paysync_core::{
    CheckoutObject, CustomerObject, CustomerState, DisputeObject, Event, EventKind,
    PipelineConfig, RefundObject, Result, SubscriptionObject, SubscriptionState,
    SubscriptionStatus,
};

use crate::store::{bounded, StateStore};

/// What reconciliation did with an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// State was created or advanced
    Updated,
    /// Event at or before the last applied timestamp; state untouched
    Stale,
    /// Recorded for operator attention, no entitlement change
    Surfaced,
}

/// Applies events to local entity state.
///
/// Reconciliation of one subscription id is serialized through a
/// per-entity lock; distinct subscriptions proceed fully in parallel.
pub struct Reconciler {
    store: Arc<dyn StateStore>,
    timeout: Duration,
    entity_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn StateStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            timeout: config.storage_timeout,
            entity_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, subscription_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.entity_locks.lock().await;
        locks
            .entry(subscription_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// `checkout.completed`: create or locate the customer, create the
    /// subscription record, mark it active.
    pub async fn apply_checkout(&self, event: &Event, checkout: CheckoutObject) -> Result<Applied> {
        let lock = self.lock_for(&checkout.subscription_id).await;
        let _guard = lock.lock().await;

        let event_at = event.occurred_at();
        self.merge_customer(&checkout.customer).await?;

        let existing = bounded(
            self.timeout,
            self.store.get_subscription(&checkout.subscription_id),
        )
        .await?;
        if let Some(current) = &existing {
            if !current.accepts(event_at) {
                return Ok(stale(event, current));
            }
        }

        let state = SubscriptionState {
            id: checkout.subscription_id.clone(),
            status: SubscriptionStatus::Active,
            customer_id: checkout.customer.id.clone(),
            product_id: checkout.product_id.clone(),
            current_period_start: checkout.period_start(),
            current_period_end: checkout.period_end(),
            last_event_id: event.id.clone(),
            last_event_at: event_at,
            // a completed checkout is a new purchase; any prior revocation
            // belonged to the previous purchase
            revoked_at: None,
        };
        bounded(self.timeout, self.store.upsert_subscription(state)).await?;

        tracing::info!(
            subscription_id = %checkout.subscription_id,
            customer_id = %checkout.customer.id,
            order_id = %checkout.order_id,
            "subscription activated from checkout"
        );
        Ok(Applied::Updated)
    }

    /// `subscription.*` lifecycle transitions, merged under the monotonic
    /// timestamp guard.
    pub async fn apply_subscription(
        &self,
        event: &Event,
        subscription: SubscriptionObject,
    ) -> Result<Applied> {
        let lock = self.lock_for(&subscription.id).await;
        let _guard = lock.lock().await;

        let event_at = event.occurred_at();
        if let Some(customer) = &subscription.customer {
            self.merge_customer(customer).await?;
        }

        let existing = bounded(self.timeout, self.store.get_subscription(&subscription.id)).await?;
        if let Some(current) = &existing {
            if !current.accepts(event_at) {
                return Ok(stale(event, current));
            }
        }

        let mut state =
            existing.unwrap_or_else(|| subscription_from_payload(event, &subscription));

        match event.kind() {
            // covers both initial and renewal payments; there is no
            // distinct first-payment path
            EventKind::SubscriptionPaid => {
                state.status = SubscriptionStatus::Active;
                if let Some(start) = subscription.period_start() {
                    state.current_period_start = start;
                }
                if let Some(end) = subscription.period_end() {
                    state.current_period_end = end;
                }
                state.revoked_at = None;
            }

            // cancellation schedules the loss of entitlement at period
            // end; it does not revoke anything now
            EventKind::SubscriptionCanceled => {
                state.status = SubscriptionStatus::Canceled;
                if let Some(end) = subscription.period_end() {
                    state.current_period_end = end;
                }
            }

            // informational while the status is non-terminal: payment
            // retries may still resolve this subscription to paid
            EventKind::SubscriptionExpired => {
                if !state.status.is_terminal() {
                    state.status = SubscriptionStatus::Expired;
                }
            }

            EventKind::SubscriptionPaused => {
                state.status = SubscriptionStatus::Paused;
            }

            EventKind::SubscriptionTrialing => {
                state.status = SubscriptionStatus::Trialing;
                if let Some(start) = subscription.period_start() {
                    state.current_period_start = start;
                }
                if let Some(end) = subscription.period_end() {
                    state.current_period_end = end;
                }
            }

            EventKind::SubscriptionUpdated => {
                if let Some(status) = SubscriptionStatus::parse(&subscription.status) {
                    state.status = status;
                }
                if let Some(start) = subscription.period_start() {
                    state.current_period_start = start;
                }
                if let Some(end) = subscription.period_end() {
                    state.current_period_end = end;
                }
                state.product_id = subscription.product_id.clone();
            }

            other => {
                tracing::debug!(kind = %other, "no subscription policy for event kind");
                return Ok(Applied::Surfaced);
            }
        }

        state.last_event_id = event.id.clone();
        state.last_event_at = event_at;
        let status = state.status;
        bounded(self.timeout, self.store.upsert_subscription(state)).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            status = ?status,
            event_type = %event.event_type,
            "subscription state advanced"
        );
        Ok(Applied::Updated)
    }

    /// `refund.created`: revoke entitlement immediately when the linked
    /// subscription is canceled, overriding the grace period.
    ///
    /// Revocation is a one-way latch evaluated against the state at
    /// arrival, so it bypasses the timestamp guard: a refund minted before
    /// the cancellation it follows must still land.
    pub async fn apply_refund(&self, event: &Event, refund: RefundObject) -> Result<Applied> {
        let lock = self.lock_for(&refund.subscription_id).await;
        let _guard = lock.lock().await;

        let existing = bounded(
            self.timeout,
            self.store.get_subscription(&refund.subscription_id),
        )
        .await?;
        let Some(mut state) = existing else {
            tracing::warn!(
                refund_id = %refund.id,
                subscription_id = %refund.subscription_id,
                "refund for unknown subscription"
            );
            return Ok(Applied::Surfaced);
        };

        if state.status != SubscriptionStatus::Canceled {
            tracing::warn!(
                refund_id = %refund.id,
                subscription_id = %refund.subscription_id,
                status = ?state.status,
                "refund on non-canceled subscription; entitlement unchanged"
            );
            return Ok(Applied::Surfaced);
        }

        state.revoked_at = Some(event.occurred_at());
        bounded(self.timeout, self.store.upsert_subscription(state)).await?;

        tracing::info!(
            refund_id = %refund.id,
            subscription_id = %refund.subscription_id,
            "entitlement revoked: refund on canceled subscription"
        );
        Ok(Applied::Updated)
    }

    /// `dispute.created`: surfaced for operator handling; policy leaves
    /// entitlement untouched.
    pub async fn apply_dispute(&self, _event: &Event, dispute: DisputeObject) -> Result<Applied> {
        tracing::warn!(
            dispute_id = %dispute.id,
            subscription_id = ?dispute.subscription_id,
            order_id = ?dispute.order_id,
            reason = ?dispute.reason,
            "dispute opened; manual review required"
        );
        Ok(Applied::Surfaced)
    }

    async fn merge_customer(&self, customer: &CustomerObject) -> Result<()> {
        let existing = bounded(self.timeout, self.store.get_customer(&customer.id)).await?;
        let state = match existing {
            Some(mut current) => {
                current.merge(customer);
                current
            }
            None => CustomerState::from_object(customer),
        };
        bounded(self.timeout, self.store.upsert_customer(state)).await
    }
}

fn stale(event: &Event, current: &SubscriptionState) -> Applied {
    tracing::info!(
        event_id = %event.id,
        subscription_id = %current.id,
        event_at = %event.occurred_at(),
        last_event_at = %current.last_event_at,
        "out-of-order event skipped"
    );
    Applied::Stale
}

fn subscription_from_payload(event: &Event, subscription: &SubscriptionObject) -> SubscriptionState {
    let event_at = event.occurred_at();
    SubscriptionState {
        id: subscription.id.clone(),
        status: SubscriptionStatus::parse(&subscription.status)
            .unwrap_or(SubscriptionStatus::Active),
        customer_id: subscription.customer_id.clone(),
        product_id: subscription.product_id.clone(),
        current_period_start: subscription.period_start().unwrap_or(event_at),
        current_period_end: subscription.period_end().unwrap_or(event_at),
        last_event_id: event.id.clone(),
        // placeholder; overwritten before the upsert
        last_event_at: event_at,
        revoked_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use paysync_core::EventId;

    const HOUR_MS: i64 = 60 * 60 * 1000;
    const DAY_MS: i64 = 24 * HOUR_MS;
    const T0: i64 = 1_700_000_000_000;

    fn setup() -> (Reconciler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = PipelineConfig::new("whsec_test");
        (Reconciler::new(store.clone(), &config), store)
    }

    fn event(id: &str, kind: EventKind, created_at: i64) -> Event {
        Event {
            id: EventId::new(id),
            event_type: kind.as_tag().into(),
            created_at,
            object: serde_json::json!({}),
        }
    }

    fn checkout_object() -> CheckoutObject {
        CheckoutObject {
            order_id: "ord_1".into(),
            subscription_id: "sub_1".into(),
            product_id: "prod_1".into(),
            customer: CustomerObject {
                id: "cus_1".into(),
                email: "buyer@example.com".into(),
                name: Some("Buyer".into()),
            },
            current_period_start: T0,
            current_period_end: T0 + 30 * DAY_MS,
        }
    }

    fn subscription_object(status: &str, period_end: Option<i64>) -> SubscriptionObject {
        SubscriptionObject {
            id: "sub_1".into(),
            customer_id: "cus_1".into(),
            product_id: "prod_1".into(),
            status: status.into(),
            current_period_start: Some(T0),
            current_period_end: period_end,
            customer: None,
        }
    }

    async fn seed_checkout(reconciler: &Reconciler) {
        let evt = event("evt_checkout", EventKind::CheckoutCompleted, T0);
        assert_eq!(
            reconciler
                .apply_checkout(&evt, checkout_object())
                .await
                .unwrap(),
            Applied::Updated
        );
    }

    #[tokio::test]
    async fn test_checkout_creates_customer_and_active_subscription() {
        let (reconciler, store) = setup();
        seed_checkout(&reconciler).await;

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.customer_id, "cus_1");

        let customer = store.get_customer("cus_1").await.unwrap().unwrap();
        assert_eq!(customer.email, "buyer@example.com");
    }

    #[tokio::test]
    async fn test_paid_extends_period_and_reactivates() {
        let (reconciler, store) = setup();
        seed_checkout(&reconciler).await;

        let renewal_end = T0 + 60 * DAY_MS;
        let evt = event("evt_paid", EventKind::SubscriptionPaid, T0 + 30 * DAY_MS);
        let outcome = reconciler
            .apply_subscription(&evt, subscription_object("active", Some(renewal_end)))
            .await
            .unwrap();
        assert_eq!(outcome, Applied::Updated);

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.current_period_end.timestamp_millis(), renewal_end);
    }

    #[tokio::test]
    async fn test_canceled_keeps_entitlement_until_period_end() {
        let (reconciler, store) = setup();
        seed_checkout(&reconciler).await;

        let evt = event("evt_cancel", EventKind::SubscriptionCanceled, T0 + HOUR_MS);
        reconciler
            .apply_subscription(&evt, subscription_object("canceled", None))
            .await
            .unwrap();

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        // grace period: still entitled inside the paid period
        let inside = sub.current_period_end - chrono::Duration::days(1);
        assert!(sub.entitled_at(inside));
        assert!(!sub.entitled_at(sub.current_period_end));
    }

    #[tokio::test]
    async fn test_expired_does_not_revoke_entitlement() {
        let (reconciler, store) = setup();
        seed_checkout(&reconciler).await;

        let evt = event("evt_expired", EventKind::SubscriptionExpired, T0 + HOUR_MS);
        reconciler
            .apply_subscription(&evt, subscription_object("expired", None))
            .await
            .unwrap();

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
        assert!(sub.revoked_at.is_none());
        let inside = sub.current_period_end - chrono::Duration::days(1);
        assert!(sub.entitled_at(inside));
    }

    #[tokio::test]
    async fn test_paid_after_expired_resolves_back_to_active() {
        let (reconciler, store) = setup();
        seed_checkout(&reconciler).await;

        let expired = event("evt_expired", EventKind::SubscriptionExpired, T0 + HOUR_MS);
        reconciler
            .apply_subscription(&expired, subscription_object("expired", None))
            .await
            .unwrap();

        let paid = event("evt_paid", EventKind::SubscriptionPaid, T0 + 2 * HOUR_MS);
        reconciler
            .apply_subscription(&paid, subscription_object("active", Some(T0 + 60 * DAY_MS)))
            .await
            .unwrap();

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_refund_on_canceled_revokes_immediately() {
        let (reconciler, store) = setup();
        seed_checkout(&reconciler).await;

        let cancel = event("evt_cancel", EventKind::SubscriptionCanceled, T0 + HOUR_MS);
        reconciler
            .apply_subscription(&cancel, subscription_object("canceled", None))
            .await
            .unwrap();

        let refund = event("evt_refund", EventKind::RefundCreated, T0 + 2 * HOUR_MS);
        let outcome = reconciler
            .apply_refund(
                &refund,
                RefundObject {
                    id: "ref_1".into(),
                    subscription_id: "sub_1".into(),
                    order_id: Some("ord_1".into()),
                    amount_cents: Some(2900),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, Applied::Updated);

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        // revocation overrides the grace period regardless of period end
        let inside = sub.current_period_end - chrono::Duration::days(1);
        assert!(!sub.entitled_at(inside));
    }

    #[tokio::test]
    async fn test_refund_on_active_subscription_changes_nothing() {
        let (reconciler, store) = setup();
        seed_checkout(&reconciler).await;

        let refund = event("evt_refund", EventKind::RefundCreated, T0 + HOUR_MS);
        let outcome = reconciler
            .apply_refund(
                &refund,
                RefundObject {
                    id: "ref_1".into(),
                    subscription_id: "sub_1".into(),
                    order_id: None,
                    amount_cents: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, Applied::Surfaced);

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert!(sub.revoked_at.is_none());
        assert!(sub.entitled_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_refund_for_unknown_subscription_is_surfaced() {
        let (reconciler, _store) = setup();
        let refund = event("evt_refund", EventKind::RefundCreated, T0);
        let outcome = reconciler
            .apply_refund(
                &refund,
                RefundObject {
                    id: "ref_1".into(),
                    subscription_id: "sub_missing".into(),
                    order_id: None,
                    amount_cents: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, Applied::Surfaced);
    }

    #[tokio::test]
    async fn test_older_event_is_stale_and_state_untouched() {
        let (reconciler, store) = setup();
        seed_checkout(&reconciler).await;

        let newer = event("evt_cancel", EventKind::SubscriptionCanceled, T0 + 2 * HOUR_MS);
        reconciler
            .apply_subscription(&newer, subscription_object("canceled", None))
            .await
            .unwrap();

        let older = event("evt_paid", EventKind::SubscriptionPaid, T0 + HOUR_MS);
        let outcome = reconciler
            .apply_subscription(&older, subscription_object("active", Some(T0 + 90 * DAY_MS)))
            .await
            .unwrap();
        assert_eq!(outcome, Applied::Stale);

        let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert_eq!(sub.last_event_id, EventId::new("evt_cancel"));
    }

    #[tokio::test]
    async fn test_equal_timestamp_is_stale() {
        let (reconciler, _store) = setup();
        seed_checkout(&reconciler).await;

        let same_ts = event("evt_other", EventKind::SubscriptionPaid, T0);
        let outcome = reconciler
            .apply_subscription(&same_ts, subscription_object("active", None))
            .await
            .unwrap();
        assert_eq!(outcome, Applied::Stale);
    }

    #[tokio::test]
    async fn test_out_of_order_pair_converges_to_timestamp_order() {
        // arrival order t2 then t1 must equal arrival order t1 then t2;
        // provider payloads are snapshots, so the later event carries the
        // period end the earlier renewal established
        for reversed in [false, true] {
            let (reconciler, store) = setup();
            seed_checkout(&reconciler).await;

            let paid = event("evt_paid", EventKind::SubscriptionPaid, T0 + HOUR_MS);
            let paid_obj = subscription_object("active", Some(T0 + 60 * DAY_MS));
            let cancel = event("evt_cancel", EventKind::SubscriptionCanceled, T0 + 2 * HOUR_MS);
            let cancel_obj = subscription_object("canceled", Some(T0 + 60 * DAY_MS));

            if reversed {
                reconciler
                    .apply_subscription(&cancel, cancel_obj.clone())
                    .await
                    .unwrap();
                reconciler
                    .apply_subscription(&paid, paid_obj.clone())
                    .await
                    .unwrap();
            } else {
                reconciler
                    .apply_subscription(&paid, paid_obj.clone())
                    .await
                    .unwrap();
                reconciler
                    .apply_subscription(&cancel, cancel_obj.clone())
                    .await
                    .unwrap();
            }

            let sub = store.get_subscription("sub_1").await.unwrap().unwrap();
            assert_eq!(sub.status, SubscriptionStatus::Canceled, "reversed={reversed}");
            assert_eq!(sub.last_event_id, EventId::new("evt_cancel"));
            assert_eq!(
                sub.current_period_end.timestamp_millis(),
                T0 + 60 * DAY_MS,
                "reversed={reversed}"
            );
        }
    }

    #[tokio::test]
    async fn test_subscription_event_without_prior_checkout_creates_state() {
        let (reconciler, store) = setup();
        let evt = event("evt_paid", EventKind::SubscriptionPaid, T0);
        let outcome = reconciler
            .apply_subscription(&evt, subscription_object("active", Some(T0 + 30 * DAY_MS)))
            .await
            .unwrap();
        assert_eq!(outcome, Applied::Updated);
        assert!(store.get_subscription("sub_1").await.unwrap().is_some());
    }
}
