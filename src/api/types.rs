//! Shared request and response types for REST API handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::ContentFingerprint;
use crate::domain::{MirrorStatus, OwnerId, ProofRecord, ProofStatus, Registration};

/// Query for `POST /v1/ownership/check`
#[derive(Debug, Deserialize)]
pub struct CheckOwnershipQuery {
    pub requester_id: Option<String>,
}

/// Query for `POST /v1/proofs`
#[derive(Debug, Deserialize)]
pub struct RegisterProofQuery {
    pub requester_id: Option<String>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub content_id: Option<String>,
}

/// Body returned for a confirmed registration
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterProofResponse {
    pub fingerprint: ContentFingerprint,
    pub transaction_id: String,
    pub explorer_url: String,
    pub newly_registered: bool,
    pub mirror: MirrorStatus,
    pub status: ProofStatus,
    pub registered_at: DateTime<Utc>,
}

impl From<Registration> for RegisterProofResponse {
    fn from(registration: Registration) -> Self {
        let record = registration.record;
        Self {
            fingerprint: record.fingerprint,
            transaction_id: record.ledger_transaction_id,
            explorer_url: record.ledger_explorer_url,
            newly_registered: registration.newly_registered,
            mirror: registration.mirror,
            status: record.status,
            registered_at: record.created_at,
        }
    }
}

/// Operator view of a stored proof
#[derive(Debug, Serialize, Deserialize)]
pub struct ProofResponse {
    pub id: uuid::Uuid,
    pub fingerprint: ContentFingerprint,
    pub owner_id: OwnerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub content_type: String,
    pub filename: String,
    pub file_size_bytes: u64,
    pub transaction_id: String,
    pub explorer_url: String,
    pub status: ProofStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProofRecord> for ProofResponse {
    fn from(record: ProofRecord) -> Self {
        Self {
            id: record.id,
            fingerprint: record.fingerprint,
            owner_id: record.owner_id,
            content_id: record.content_id,
            content_type: record.content_type,
            filename: record.filename,
            file_size_bytes: record.file_size_bytes,
            transaction_id: record.ledger_transaction_id,
            explorer_url: record.ledger_explorer_url,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Proofs held by one owner
#[derive(Debug, Serialize, Deserialize)]
pub struct OwnerProofsResponse {
    pub owner_id: OwnerId,
    pub count: usize,
    pub proofs: Vec<ProofResponse>,
}
