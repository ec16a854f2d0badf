//! Structured API error responses with error codes
//!
//! Every failing endpoint returns `{"error": {"code", "numeric_code",
//! "message", ...}}` plus an `x-error-code` header.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::{RejectionReason, UNAVAILABLE_MESSAGE};
use crate::infra::ProvenanceError;

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (3xxx)
    /// Required query parameter is missing
    MissingRequiredField,
    /// Field value is invalid
    InvalidFieldValue,
    /// Fingerprint is not 64 hex characters
    InvalidFingerprint,
    /// Request body is empty
    EmptyContent,

    // Resource errors (4xxx)
    /// No proof stored for the fingerprint
    ProofNotFound,

    // Ownership errors (5xxx)
    /// Content is registered to someone else
    OwnershipConflict,
    /// Ownership could not be determined
    OwnershipUnverifiable,

    // Infrastructure errors (8xxx)
    DatabaseError,
    ServiceUnavailable,
    InternalError,

    // Ledger errors (9xxx)
    /// Ledger transport failed
    LedgerUnavailable,
    /// Ledger refused the registration
    LedgerRejected,
    /// Ledger call exceeded its deadline; outcome unknown, check the
    /// fingerprint before submitting again
    LedgerTimeout,
}

impl ErrorCode {
    /// Numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::MissingRequiredField => 3001,
            ErrorCode::InvalidFieldValue => 3002,
            ErrorCode::InvalidFingerprint => 3003,
            ErrorCode::EmptyContent => 3004,

            ErrorCode::ProofNotFound => 4001,

            ErrorCode::OwnershipConflict => 5001,
            ErrorCode::OwnershipUnverifiable => 5002,

            ErrorCode::DatabaseError => 8001,
            ErrorCode::ServiceUnavailable => 8002,
            ErrorCode::InternalError => 8999,

            ErrorCode::LedgerUnavailable => 9001,
            ErrorCode::LedgerRejected => 9002,
            ErrorCode::LedgerTimeout => 9003,
        }
    }

    /// HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldValue
            | ErrorCode::InvalidFingerprint
            | ErrorCode::EmptyContent => StatusCode::BAD_REQUEST,

            ErrorCode::ProofNotFound => StatusCode::NOT_FOUND,

            ErrorCode::OwnershipConflict => StatusCode::CONFLICT,
            ErrorCode::OwnershipUnverifiable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::LedgerUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::LedgerRejected => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::LedgerTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::InvalidFingerprint => "INVALID_FINGERPRINT",
            ErrorCode::EmptyContent => "EMPTY_CONTENT",
            ErrorCode::ProofNotFound => "PROOF_NOT_FOUND",
            ErrorCode::OwnershipConflict => "OWNERSHIP_CONFLICT",
            ErrorCode::OwnershipUnverifiable => "OWNERSHIP_UNVERIFIABLE",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            ErrorCode::LedgerRejected => "LEDGER_REJECTED",
            ErrorCode::LedgerTimeout => "LEDGER_TIMEOUT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,
    pub numeric_code: u32,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Seconds after which a retry is reasonable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                retry_after: None,
                resource_id: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.error.retry_after = Some(seconds);
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("missing required parameter: {field}"),
        )
    }

    pub fn proof_not_found(fingerprint: impl Into<String>) -> Self {
        let fingerprint = fingerprint.into();
        Self::new(
            ErrorCode::ProofNotFound,
            format!("no proof registered for {fingerprint}"),
        )
        .with_resource_id(fingerprint)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.error.code.as_str();
        let mut response = (status, Json(self)).into_response();

        response.headers_mut().insert(
            axum::http::header::HeaderName::from_static("x-error-code"),
            axum::http::HeaderValue::from_static(code),
        );

        response
    }
}

impl From<ProvenanceError> for ApiError {
    fn from(err: ProvenanceError) -> Self {
        match err {
            ProvenanceError::Hash(msg) => {
                ApiError::new(ErrorCode::InvalidFieldValue, format!("unreadable content: {msg}"))
            }
            ProvenanceError::InvalidFingerprint(msg) => {
                ApiError::new(ErrorCode::InvalidFingerprint, msg)
            }
            ProvenanceError::LedgerUnavailable(_) => {
                ApiError::new(ErrorCode::LedgerUnavailable, "ledger unavailable")
                    .with_retry_after(5)
            }
            ProvenanceError::LedgerRejected(msg) => ApiError::new(
                ErrorCode::LedgerRejected,
                format!("ledger rejected registration: {msg}"),
            ),
            ProvenanceError::LedgerTimeout(after) => ApiError::new(
                ErrorCode::LedgerTimeout,
                format!(
                    "ledger did not answer within {}s; the registration may have been recorded",
                    after.as_secs()
                ),
            ),
            // Tier detail stays in the logs
            ProvenanceError::DataUnavailable
            | ProvenanceError::StoreSchemaMissing(_)
            | ProvenanceError::StoreAccessRestricted(_)
            | ProvenanceError::StoreUnavailable(_) => {
                ApiError::new(ErrorCode::OwnershipUnverifiable, UNAVAILABLE_MESSAGE)
                    .with_retry_after(30)
            }
            ProvenanceError::Database(_) => ApiError::new(ErrorCode::DatabaseError, "database error"),
            ProvenanceError::Configuration(msg) | ProvenanceError::Internal(msg) => {
                ApiError::new(ErrorCode::InternalError, msg)
            }
        }
    }
}

impl From<RejectionReason> for ApiError {
    fn from(reason: RejectionReason) -> Self {
        let message = reason.message();
        match reason {
            RejectionReason::Conflict {
                fingerprint,
                owner_public_handle,
                registered_at,
            } => ApiError::new(ErrorCode::OwnershipConflict, message)
                .with_resource_id(fingerprint.to_hex())
                .with_details(serde_json::json!({
                    "owner_public_handle": owner_public_handle,
                    "registered_at": registered_at,
                })),
            RejectionReason::Unverifiable => {
                ApiError::new(ErrorCode::OwnershipUnverifiable, message).with_retry_after(30)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::compute_fingerprint;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::OwnershipConflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::OwnershipUnverifiable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::LedgerTimeout.http_status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_store_errors_hide_tier_detail() {
        let api: ApiError =
            ProvenanceError::StoreSchemaMissing("relation \"proofs\" does not exist".into()).into();
        assert_eq!(api.error.code, ErrorCode::OwnershipUnverifiable);
        assert_eq!(api.error.message, UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn test_timeout_does_not_invite_retry() {
        let api: ApiError = ProvenanceError::LedgerTimeout(Duration::from_secs(30)).into();
        assert_eq!(api.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(api.error.retry_after, None);
        assert!(api.error.message.contains("may have been recorded"));
    }

    #[test]
    fn test_ledger_outage_sets_retry_after() {
        let api: ApiError = ProvenanceError::LedgerUnavailable("refused".into()).into();
        assert_eq!(api.error.retry_after, Some(5));
    }

    #[test]
    fn test_conflict_details() {
        let api: ApiError = RejectionReason::Conflict {
            fingerprint: compute_fingerprint(b"x"),
            owner_public_handle: "alice".into(),
            registered_at: chrono::Utc::now(),
        }
        .into();
        assert_eq!(api.status(), StatusCode::CONFLICT);
        assert_eq!(api.error.details.unwrap()["owner_public_handle"], "alice");
    }

    #[test]
    fn test_error_serialization() {
        let json = serde_json::to_value(ApiError::missing_field("requester_id")).unwrap();
        assert_eq!(json["error"]["code"], "MISSING_REQUIRED_FIELD");
        assert_eq!(json["error"]["numeric_code"], 3001);
    }
}
