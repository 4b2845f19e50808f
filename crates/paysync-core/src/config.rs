//! Pipeline Configuration
//!
//! Explicit configuration constructed once at process start and passed by
//! reference to every component; no component reads the process
//! environment directly.

use std::time::Duration;

use crate::error::{IngestError, Result};

/// Default signature header sent by the provider
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-signature";

/// Configuration for the webhook ingestion pipeline
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Shared secret the provider signs payloads with
    pub signing_secret: String,

    /// Header carrying the hex HMAC of the raw request body
    pub signature_header: String,

    /// Upper bound for any single storage operation
    pub storage_timeout: Duration,

    /// How long processed-event records are retained before pruning.
    /// Must stay well beyond the sender's ~1h retry window.
    pub dedup_retention: Duration,
}

impl PipelineConfig {
    /// Create a configuration with default operational settings
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            storage_timeout: Duration::from_secs(5),
            dedup_retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Create from environment variables.
    ///
    /// `WEBHOOK_SIGNING_SECRET` is required; `WEBHOOK_SIGNATURE_HEADER`,
    /// `STORAGE_TIMEOUT_MS`, and `DEDUP_RETENTION_DAYS` override defaults.
    pub fn from_env() -> Result<Self> {
        let signing_secret = std::env::var("WEBHOOK_SIGNING_SECRET")
            .map_err(|_| IngestError::Config("WEBHOOK_SIGNING_SECRET not set".into()))?;

        let mut config = Self::new(signing_secret);

        if let Ok(header) = std::env::var("WEBHOOK_SIGNATURE_HEADER") {
            config.signature_header = header.to_ascii_lowercase();
        }

        if let Ok(value) = std::env::var("STORAGE_TIMEOUT_MS") {
            let millis: u64 = value.parse().map_err(|_| {
                IngestError::Config(format!("STORAGE_TIMEOUT_MS is not a number: {value}"))
            })?;
            config.storage_timeout = Duration::from_millis(millis);
        }

        if let Ok(value) = std::env::var("DEDUP_RETENTION_DAYS") {
            let days: u64 = value.parse().map_err(|_| {
                IngestError::Config(format!("DEDUP_RETENTION_DAYS is not a number: {value}"))
            })?;
            config.dedup_retention = Duration::from_secs(days * 24 * 60 * 60);
        }

        Ok(config)
    }
}
