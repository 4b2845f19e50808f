//! Application State

use std::sync::Arc;

use paysync_core::PipelineConfig;
use paysync_pipeline::{Ingestor, StateStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Pipeline configuration, constructed once at startup
    pub config: Arc<PipelineConfig>,

    /// The webhook ingestion pipeline
    pub ingestor: Arc<Ingestor>,

    /// State store, read directly by the entitlement API
    pub store: Arc<dyn StateStore>,
}
