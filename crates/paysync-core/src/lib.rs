//! # paysync-core
//!
//! Domain model for the paysync webhook ingestion pipeline: the wire-level
//! event contract, local subscription and customer state, the entitlement
//! policy, and the configuration and error types shared by every component.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       paysync-pipeline                        │
//! │  ┌──────────┐  ┌────────────┐  ┌────────┐  ┌─────────────┐   │
//! │  │ Verifier │─▶│ Dedup      │─▶│ Router │─▶│ Reconciler  │   │
//! │  └──────────┘  └────────────┘  └────────┘  └─────────────┘   │
//! │        │              │             │             │          │
//! │        └──────── paysync-core: Event / State / Error ────────│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything in this crate is plain data plus policy: no I/O, no storage,
//! no HTTP. The pipeline crate supplies the moving parts.

pub mod config;
pub mod error;
pub mod event;
pub mod state;

pub use config::PipelineConfig;
pub use error::{IngestError, Result, SignatureError};
pub use event::{
    CheckoutObject, CustomerObject, DisputeObject, Event, EventId, EventKind, RefundObject,
    SubscriptionObject,
};
pub use state::{
    CustomerState, EventOutcome, ProcessedEventRecord, SubscriptionState, SubscriptionStatus,
};
