//! Event Routing
//!
//! Maps an event kind to its registered handler. Handlers are registered
//! at construction time; unknown kinds resolve to no handler and are
//! acknowledged without retry, so the sender's event vocabulary can grow
//! without breaking this receiver.

use std::sync::Arc;

use async_trait::async_trait;

use paysync_core::{Event, EventKind, Result};

use crate::reconcile::{Applied, Reconciler};

/// Capability for applying one or more event kinds
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Whether this handler applies events of `kind`
    fn handles(&self, kind: &EventKind) -> bool;

    /// Apply the event to local state
    async fn apply(&self, event: &Event) -> Result<Applied>;
}

/// Registry of event handlers
#[derive(Default)]
pub struct EventRouter {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router wired with the full reconciliation policy
    pub fn with_default_handlers(reconciler: Arc<Reconciler>) -> Self {
        let mut router = Self::new();
        router.register(CheckoutHandler::new(reconciler.clone()));
        router.register(SubscriptionLifecycleHandler::new(reconciler.clone()));
        router.register(RefundHandler::new(reconciler.clone()));
        router.register(DisputeHandler::new(reconciler));
        router
    }

    /// Register a handler; later registrations never shadow earlier ones
    pub fn register(&mut self, handler: impl EventHandler + 'static) {
        self.handlers.push(Arc::new(handler));
    }

    /// Resolve the handler for an event kind
    pub fn handler_for(&self, kind: &EventKind) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.iter().find(|handler| handler.handles(kind))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Creates customer and subscription records from completed checkouts
pub struct CheckoutHandler {
    reconciler: Arc<Reconciler>,
}

impl CheckoutHandler {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl EventHandler for CheckoutHandler {
    fn handles(&self, kind: &EventKind) -> bool {
        matches!(kind, EventKind::CheckoutCompleted)
    }

    async fn apply(&self, event: &Event) -> Result<Applied> {
        let checkout = event.parse_object()?;
        self.reconciler.apply_checkout(event, checkout).await
    }
}

/// Applies subscription lifecycle transitions
pub struct SubscriptionLifecycleHandler {
    reconciler: Arc<Reconciler>,
}

impl SubscriptionLifecycleHandler {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl EventHandler for SubscriptionLifecycleHandler {
    fn handles(&self, kind: &EventKind) -> bool {
        matches!(
            kind,
            EventKind::SubscriptionPaid
                | EventKind::SubscriptionCanceled
                | EventKind::SubscriptionExpired
                | EventKind::SubscriptionPaused
                | EventKind::SubscriptionTrialing
                | EventKind::SubscriptionUpdated
        )
    }

    async fn apply(&self, event: &Event) -> Result<Applied> {
        let subscription = event.parse_object()?;
        self.reconciler.apply_subscription(event, subscription).await
    }
}

/// Revokes entitlement for refunds on canceled subscriptions
pub struct RefundHandler {
    reconciler: Arc<Reconciler>,
}

impl RefundHandler {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl EventHandler for RefundHandler {
    fn handles(&self, kind: &EventKind) -> bool {
        matches!(kind, EventKind::RefundCreated)
    }

    async fn apply(&self, event: &Event) -> Result<Applied> {
        let refund = event.parse_object()?;
        self.reconciler.apply_refund(event, refund).await
    }
}

/// Surfaces disputes for operator handling
pub struct DisputeHandler {
    reconciler: Arc<Reconciler>,
}

impl DisputeHandler {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl EventHandler for DisputeHandler {
    fn handles(&self, kind: &EventKind) -> bool {
        matches!(kind, EventKind::DisputeCreated)
    }

    async fn apply(&self, event: &Event) -> Result<Applied> {
        let dispute = event.parse_object()?;
        self.reconciler.apply_dispute(event, dispute).await
    }
}
