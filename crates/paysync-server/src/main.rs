//! paysync HTTP Server
//!
//! Axum-based receiver for payment provider webhooks, plus a small
//! entitlement read API backed by the reconciled local state.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paysync_core::PipelineConfig;
use paysync_pipeline::{Ingestor, MemoryStore, StateStore};

use crate::handlers::{get_entitlement, health_check, payment_webhook, prune_events};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Pipeline configuration is built once here and shared by reference
    let config = Arc::new(PipelineConfig::from_env()?);
    tracing::info!("✓ Webhook signing secret configured");
    tracing::info!("  Signature header: {}", config.signature_header);

    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let ingestor = Arc::new(Ingestor::new(config.clone(), store.clone()));

    let state = AppState {
        config,
        ingestor,
        store,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/webhook/payments", post(payment_webhook))
        .route("/api/entitlement/{subscription_id}", get(get_entitlement))
        .route("/admin/prune-events", post(prune_events))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 paysync server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                      - Health check");
    tracing::info!("  POST /webhook/payments            - Provider webhook receiver");
    tracing::info!("  GET  /api/entitlement/{{id}}       - Entitlement status");
    tracing::info!("  POST /admin/prune-events          - Prune processed-event records");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
