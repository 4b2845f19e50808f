//! Webhook Event Model
//!
//! Wire-level representation of payment provider events. The envelope
//! shape is fixed by the provider and must be preserved exactly:
//! `{ id, eventType, created_at (epoch millis), object }`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IngestError, Result};

/// Globally unique event identifier assigned by the sender
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A webhook event exactly as received on the wire.
///
/// Immutable once received. The `object` payload stays opaque until the
/// router has resolved a handler for the event type; parsing it earlier
/// would reject events this receiver does not even care about.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Sender-assigned identifier, unique across all deliveries
    pub id: EventId,

    /// Dot-separated type tag, e.g. `subscription.paid`
    #[serde(rename = "eventType")]
    pub event_type: String,

    /// Sender-side creation time, epoch milliseconds
    pub created_at: i64,

    /// Type-specific payload
    pub object: Value,
}

impl Event {
    /// Resolve the type tag to a known kind
    pub fn kind(&self) -> EventKind {
        EventKind::from_tag(&self.event_type)
    }

    /// Sender-side creation time as a UTC timestamp
    pub fn occurred_at(&self) -> DateTime<Utc> {
        millis_to_datetime(self.created_at)
    }

    /// Deserialize the opaque `object` payload into its typed shape
    pub fn parse_object<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| IngestError::MalformedPayload(format!("{}: {}", self.event_type, e)))
    }
}

/// Convert provider epoch milliseconds to a UTC timestamp.
///
/// Out-of-range values clamp to the Unix epoch rather than failing; the
/// monotonic guard in the reconciler then treats them as ancient.
pub fn millis_to_datetime(epoch_millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(epoch_millis).unwrap_or_default()
}

/// Known event type tags.
///
/// Unknown tags map to `Unhandled` rather than an error so the sender's
/// vocabulary can grow without breaking this receiver.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    CheckoutCompleted,
    SubscriptionPaid,
    SubscriptionCanceled,
    SubscriptionExpired,
    SubscriptionPaused,
    SubscriptionTrialing,
    SubscriptionUpdated,
    RefundCreated,
    DisputeCreated,
    /// Tag this receiver has no handler for
    Unhandled(String),
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "checkout.completed" => EventKind::CheckoutCompleted,
            "subscription.paid" => EventKind::SubscriptionPaid,
            "subscription.canceled" => EventKind::SubscriptionCanceled,
            "subscription.expired" => EventKind::SubscriptionExpired,
            "subscription.paused" => EventKind::SubscriptionPaused,
            "subscription.trialing" => EventKind::SubscriptionTrialing,
            "subscription.updated" => EventKind::SubscriptionUpdated,
            "refund.created" => EventKind::RefundCreated,
            "dispute.created" => EventKind::DisputeCreated,
            other => EventKind::Unhandled(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            EventKind::CheckoutCompleted => "checkout.completed",
            EventKind::SubscriptionPaid => "subscription.paid",
            EventKind::SubscriptionCanceled => "subscription.canceled",
            EventKind::SubscriptionExpired => "subscription.expired",
            EventKind::SubscriptionPaused => "subscription.paused",
            EventKind::SubscriptionTrialing => "subscription.trialing",
            EventKind::SubscriptionUpdated => "subscription.updated",
            EventKind::RefundCreated => "refund.created",
            EventKind::DisputeCreated => "dispute.created",
            EventKind::Unhandled(tag) => tag,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// Customer fields embedded in checkout and subscription payloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomerObject {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `object` payload for `checkout.completed`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutObject {
    pub order_id: String,
    pub subscription_id: String,
    pub product_id: String,
    pub customer: CustomerObject,
    /// Initial billing period start, epoch milliseconds
    pub current_period_start: i64,
    /// Initial billing period end, epoch milliseconds
    pub current_period_end: i64,
}

impl CheckoutObject {
    pub fn period_start(&self) -> DateTime<Utc> {
        millis_to_datetime(self.current_period_start)
    }

    pub fn period_end(&self) -> DateTime<Utc> {
        millis_to_datetime(self.current_period_end)
    }
}

/// `object` payload for `subscription.*` lifecycle events
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer_id: String,
    pub product_id: String,
    /// Provider-side status string; not every event carries one
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Newer customer data, when the event carries it
    #[serde(default)]
    pub customer: Option<CustomerObject>,
}

impl SubscriptionObject {
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start.map(millis_to_datetime)
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end.map(millis_to_datetime)
    }
}

/// `object` payload for `refund.created`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefundObject {
    pub id: String,
    pub subscription_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount_cents: Option<i64>,
}

/// `object` payload for `dispute.created`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisputeObject {
    pub id: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}
