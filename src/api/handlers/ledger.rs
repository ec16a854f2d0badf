//! Ledger verification and reconciliation handlers

use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;

use crate::api::error::{ApiError, ErrorCode};
use crate::domain::LedgerVerification;
use crate::infra::ReconcileReport;
use crate::server::AppState;

/// GET /api/v1/ledger/transactions/:transaction_id/verify
#[instrument(skip(state))]
pub async fn verify_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<LedgerVerification>, ApiError> {
    if transaction_id.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::InvalidFieldValue,
            "transaction id must not be empty",
        ));
    }

    let verification = state.resolver.verify_transaction(&transaction_id).await?;
    Ok(Json(verification))
}

/// POST /api/v1/proofs/reconcile
#[instrument(skip(state))]
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileReport>, ApiError> {
    let report = state.resolver.reconcile_unmirrored().await?;
    Ok(Json(report))
}
