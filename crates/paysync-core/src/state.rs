//! Local Entity State
//!
//! Subscription and customer records mutated only by the reconciler, plus
//! the processed-event ledger owned by the deduplicator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{CustomerObject, EventId};

/// Closed set of subscription statuses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Paused,
    Canceled,
    Unpaid,
    ScheduledCancel,
    Expired,
}

impl SubscriptionStatus {
    /// Parse a provider status string; unknown strings yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(SubscriptionStatus::Active),
            "trialing" | "on_trial" => Some(SubscriptionStatus::Trialing),
            "paused" => Some(SubscriptionStatus::Paused),
            "canceled" | "cancelled" => Some(SubscriptionStatus::Canceled),
            "unpaid" | "past_due" => Some(SubscriptionStatus::Unpaid),
            "scheduled_cancel" | "on_grace_period" => Some(SubscriptionStatus::ScheduledCancel),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }

    /// Terminal statuses admit no further lifecycle transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, SubscriptionStatus::Expired)
    }
}

/// Local record of one provider subscription.
///
/// Invariant: `last_event_at` is monotonically non-decreasing. An event
/// older than the recorded timestamp must never regress this state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub id: String,
    pub status: SubscriptionStatus,
    pub customer_id: String,
    pub product_id: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,

    /// Identifier of the last applied event
    pub last_event_id: EventId,

    /// Sender-side timestamp of the last applied event
    pub last_event_at: DateTime<Utc>,

    /// Set only when a refund lands on a canceled subscription; a one-way
    /// latch that overrides the cancellation grace period
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    /// Whether an event with this sender timestamp may be applied.
    ///
    /// Equal timestamps count as "not newer" and are skipped.
    pub fn accepts(&self, event_at: DateTime<Utc>) -> bool {
        event_at > self.last_event_at
    }

    /// Entitlement decision at `now`.
    ///
    /// Active and trialing subscriptions are always entitled. Every other
    /// status keeps entitlement until the paid period runs out (the
    /// cancellation grace period). A recorded revocation wins over both.
    pub fn entitled_at(&self, now: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing => true,
            SubscriptionStatus::Paused
            | SubscriptionStatus::Canceled
            | SubscriptionStatus::Unpaid
            | SubscriptionStatus::ScheduledCancel
            | SubscriptionStatus::Expired => now < self.current_period_end,
        }
    }
}

/// Local record of one provider customer.
///
/// Created on first reference from any event; merged from later events
/// carrying newer customer data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomerState {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

impl CustomerState {
    pub fn from_object(customer: &CustomerObject) -> Self {
        Self {
            id: customer.id.clone(),
            email: customer.email.clone(),
            name: customer.name.clone(),
        }
    }

    /// Merge newer customer data; empty or absent fields never overwrite
    pub fn merge(&mut self, customer: &CustomerObject) {
        if !customer.email.is_empty() {
            self.email = customer.email.clone();
        }
        if let Some(name) = &customer.name {
            self.name = Some(name.clone());
        }
    }
}

/// Terminal disposition recorded for a processed event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// Claimed, processing in flight
    Pending,
    /// Applied to local state
    Applied,
    /// Acknowledged without state change: duplicate, stale, or unhandled
    Ignored,
    /// Processing failed; the sender's retry may re-claim this id
    Failed,
}

/// Ledger entry owned by the deduplicator.
///
/// Retained at least as long as the sender's redelivery window and pruned
/// only past the configured retention horizon, so manual resends weeks
/// later are still deduplicated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessedEventRecord {
    pub event_id: EventId,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
    pub outcome: EventOutcome,
}
