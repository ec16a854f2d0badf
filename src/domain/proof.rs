//! Proof records: who registered which fingerprint, and where on the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::ContentFingerprint;
use crate::domain::OwnerId;

/// Verification status of a proof record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    /// Ledger write succeeded, mirror write not yet confirmed
    Pending,
    /// Mirrored and confirmed
    Confirmed,
    /// Ledger write failed; never persisted
    Failed,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Pending => "pending",
            ProofStatus::Confirmed => "confirmed",
            ProofStatus::Failed => "failed",
        }
    }

    /// Allowed status moves. Confirmed and failed are final.
    pub fn can_transition_to(&self, next: ProofStatus) -> bool {
        matches!(
            (self, next),
            (ProofStatus::Pending, ProofStatus::Confirmed)
                | (ProofStatus::Pending, ProofStatus::Failed)
        ) || *self == next
    }
}

impl std::str::FromStr for ProofStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProofStatus::Pending),
            "confirmed" => Ok(ProofStatus::Confirmed),
            "failed" => Ok(ProofStatus::Failed),
            other => Err(format!("unknown proof status: {other}")),
        }
    }
}

impl std::fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata supplied with the content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// MIME type, e.g. `audio/mpeg`
    pub content_type: String,
    /// Original filename as uploaded
    pub filename: String,
    /// Size of the content in bytes
    pub file_size_bytes: u64,
    /// Caller-side content identifier, if any
    pub content_id: Option<String>,
}

/// Ledger transaction returned by a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction_id: String,
    pub explorer_url: String,
}

/// Result of checking a transaction on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVerification {
    pub transaction_id: String,
    pub confirmed: bool,
}

/// An ownership record for one fingerprint.
///
/// At most one record per fingerprint exists in any tier. Once confirmed,
/// `owner_id` and `fingerprint` never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub id: Uuid,
    pub fingerprint: ContentFingerprint,
    pub owner_id: OwnerId,
    pub content_id: Option<String>,
    pub content_type: String,
    pub filename: String,
    pub file_size_bytes: u64,
    pub ledger_transaction_id: String,
    pub ledger_explorer_url: String,
    pub status: ProofStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProofRecord {
    /// Build a pending record from a successful ledger registration
    pub fn pending(
        fingerprint: ContentFingerprint,
        owner_id: OwnerId,
        metadata: ContentMetadata,
        receipt: LedgerReceipt,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fingerprint,
            owner_id,
            content_id: metadata.content_id,
            content_type: metadata.content_type,
            filename: metadata.filename,
            file_size_bytes: metadata.file_size_bytes,
            ledger_transaction_id: receipt.transaction_id,
            ledger_explorer_url: receipt.explorer_url,
            status: ProofStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        &self.owner_id == owner
    }

    pub fn receipt(&self) -> LedgerReceipt {
        LedgerReceipt {
            transaction_id: self.ledger_transaction_id.clone(),
            explorer_url: self.ledger_explorer_url.clone(),
        }
    }

    /// Compare every field except the server-assigned timestamps
    pub fn same_content_as(&self, other: &ProofRecord) -> bool {
        self.id == other.id
            && self.fingerprint == other.fingerprint
            && self.owner_id == other.owner_id
            && self.content_id == other.content_id
            && self.content_type == other.content_type
            && self.filename == other.filename
            && self.file_size_bytes == other.file_size_bytes
            && self.ledger_transaction_id == other.ledger_transaction_id
            && self.ledger_explorer_url == other.ledger_explorer_url
            && self.status == other.status
    }
}
