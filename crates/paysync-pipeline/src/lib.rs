//! # paysync-pipeline
//!
//! Webhook ingestion pipeline for payment provider events: authenticate,
//! deduplicate, route, and reconcile each delivery into local subscription
//! state, at most effectively once and in causal order per subscription,
//! despite at-least-once and possibly reordered delivery from the sender.
//!
//! ## Guarantees
//! - Signature verification over the raw bytes, before any parse or side effect
//! - Idempotent application per event identifier
//! - Monotonic per-subscription ordering (stale events never regress state)
//! - Unknown event types acknowledged without retry storms
//!
//! ## Non-Guarantees
//! - Exactly-once processing across a failed attempt (the sender's retry
//!   re-runs the event; the deduplicator makes the retry converge)
//! - Cross-subscription ordering
//!
//! ## Flow
//!
//! ```text
//! raw bytes ─▶ Verifier ─▶ parse ─▶ Deduplicator ─▶ Router ─▶ Reconciler
//!                 │                      │              │          │
//!                401                duplicate ▶ 200  unknown ▶ 200 │
//!                                                              StateStore
//! ```

mod dedup;
mod ingest;
mod reconcile;
mod router;
mod signature;
mod store;

pub use dedup::{Claim, Deduplicator};
pub use ingest::{ack_status, AckStatus, IngestOutcome, Ingestor};
pub use reconcile::{Applied, Reconciler};
pub use router::{
    CheckoutHandler, DisputeHandler, EventHandler, EventRouter, RefundHandler,
    SubscriptionLifecycleHandler,
};
pub use signature::{compute_signature, verify_signature};
pub use store::{MemoryStore, StateStore};
