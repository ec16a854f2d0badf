//! Ownership check, registration and lookup handlers

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use tracing::instrument;

use crate::api::error::{ApiError, ErrorCode};
use crate::api::types::{
    CheckOwnershipQuery, OwnerProofsResponse, ProofResponse, RegisterProofQuery,
    RegisterProofResponse,
};
use crate::crypto::ContentFingerprint;
use crate::domain::{OwnerId, OwnershipQueryResult, RegistrationOutcome};
use crate::resolver::RegisterRequest;
use crate::server::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const DEFAULT_FILENAME: &str = "untitled";

fn requester(value: Option<String>) -> Result<OwnerId, ApiError> {
    match value.map(|v| v.trim().to_string()) {
        Some(id) if !id.is_empty() => Ok(OwnerId::new(id)),
        _ => Err(ApiError::missing_field("requester_id")),
    }
}

fn non_empty(body: Bytes) -> Result<Bytes, ApiError> {
    if body.is_empty() {
        return Err(ApiError::new(
            ErrorCode::EmptyContent,
            "request body must contain the content bytes",
        ));
    }
    Ok(body)
}

/// POST /api/v1/ownership/check
#[instrument(skip_all)]
pub async fn check_ownership(
    State(state): State<AppState>,
    Query(query): Query<CheckOwnershipQuery>,
    body: Bytes,
) -> Result<Json<OwnershipQueryResult>, ApiError> {
    let requester = requester(query.requester_id)?;
    let body = non_empty(body)?;

    let result = state.resolver.check_ownership(&body, &requester).await?;
    Ok(Json(result))
}

/// POST /api/v1/proofs
///
/// 201 for a new registration, 200 when the requester already owns it.
#[instrument(skip_all)]
pub async fn register_proof(
    State(state): State<AppState>,
    Query(query): Query<RegisterProofQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<RegisterProofResponse>), ApiError> {
    let requester = requester(query.requester_id)?;
    let body = non_empty(body)?;

    let content_type = query
        .content_type
        .or_else(|| {
            headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let request = RegisterRequest {
        content: body.to_vec(),
        content_type,
        filename: query
            .filename
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
        requester,
        content_id: query.content_id,
    };

    match state.resolver.register_proof(request).await? {
        RegistrationOutcome::Confirmed(registration) => {
            let status = if registration.newly_registered {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            Ok((status, Json(registration.into())))
        }
        RegistrationOutcome::Rejected(reason) => Err(reason.into()),
    }
}

/// GET /api/v1/proofs/:fingerprint
#[instrument(skip(state))]
pub async fn get_proof(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<Json<ProofResponse>, ApiError> {
    let fp = ContentFingerprint::from_hex(&fingerprint)?;

    state
        .resolver
        .lookup(&fp)
        .await?
        .map(|record| Json(record.into()))
        .ok_or_else(|| ApiError::proof_not_found(fp.to_hex()))
}

/// GET /api/v1/owners/:owner_id/proofs
#[instrument(skip(state))]
pub async fn list_owner_proofs(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<OwnerProofsResponse>, ApiError> {
    let owner = OwnerId::new(owner_id);
    let proofs: Vec<ProofResponse> = state
        .resolver
        .proofs_owned_by(&owner)
        .await?
        .into_iter()
        .map(ProofResponse::from)
        .collect();

    Ok(Json(OwnerProofsResponse {
        owner_id: owner,
        count: proofs.len(),
        proofs,
    }))
}
