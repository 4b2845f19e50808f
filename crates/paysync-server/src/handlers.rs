//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use paysync_core::SubscriptionStatus;
use paysync_pipeline::{ack_status, AckStatus};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct EntitlementResponse {
    pub subscription_id: String,
    pub entitled: bool,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct PruneResponse {
    pub removed: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Payment provider webhook receiver.
///
/// The body is taken as raw bytes; the signature covers exactly what was
/// sent, so the payload must not be reserialized before verification.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let signature = headers
        .get(state.config.signature_header.as_str())
        .and_then(|value| value.to_str().ok());

    let result = state.ingestor.ingest(&body, signature).await;

    match ack_status(&result) {
        AckStatus::Ok => {
            if let Ok(outcome) = &result {
                tracing::debug!(?outcome, "webhook acknowledged");
            }
            Ok(StatusCode::OK)
        }
        AckStatus::Unauthorized => {
            if let Err(err) = &result {
                tracing::warn!(error = %err, "rejected unauthenticated webhook delivery");
            }
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid signature".into(),
                    code: "INVALID_SIGNATURE".into(),
                }),
            ))
        }
        AckStatus::RetryLater => {
            if let Err(err) = &result {
                if err.is_alert() {
                    tracing::warn!(error = %err, "webhook payload failed to parse");
                } else {
                    tracing::error!(error = %err, "webhook processing failed");
                }
            }
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Webhook processing failed".into(),
                    code: "WEBHOOK_ERROR".into(),
                }),
            ))
        }
    }
}

/// Read the current entitlement decision for a subscription
pub async fn get_entitlement(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> Result<Json<EntitlementResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get_subscription(&subscription_id).await {
        Ok(Some(subscription)) => Ok(Json(EntitlementResponse {
            entitled: subscription.entitled_at(Utc::now()),
            status: subscription.status,
            current_period_end: subscription.current_period_end,
            subscription_id,
        })),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Subscription not found".into(),
                code: "SUBSCRIPTION_NOT_FOUND".into(),
            }),
        )),
        Err(err) => {
            tracing::error!(error = %err, "entitlement lookup failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Entitlement lookup failed".into(),
                    code: "STORAGE_ERROR".into(),
                }),
            ))
        }
    }
}

/// Prune processed-event records past the retention horizon
pub async fn prune_events(
    State(state): State<AppState>,
) -> Result<Json<PruneResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.ingestor.prune().await {
        Ok(removed) => Ok(Json(PruneResponse { removed })),
        Err(err) => {
            tracing::error!(error = %err, "prune failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Prune failed".into(),
                    code: "PRUNE_ERROR".into(),
                }),
            ))
        }
    }
}
