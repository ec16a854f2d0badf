//! Read-side projections and outcomes of ownership resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::ContentFingerprint;
use crate::domain::{MirrorStatus, OwnerId, ProofRecord};

/// Message shown when ownership cannot be determined.
///
/// Deliberately generic: no tier or driver detail.
pub const UNAVAILABLE_MESSAGE: &str = "ownership verification temporarily unavailable";

/// Pointer to the ledger proof backing a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRef {
    pub transaction_id: String,
    pub explorer_url: String,
}

/// Answer to "who owns this content?" from the requester's point of view.
///
/// Never persisted. A non-owner only ever sees the owner's public handle and
/// the registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipQueryResult {
    pub fingerprint: Option<ContentFingerprint>,
    pub exists: bool,
    pub is_owner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_public_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_ref: Option<ProofRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Answer came from the secondary tier
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl OwnershipQueryResult {
    /// Nothing registered under this fingerprint
    pub fn not_found(fingerprint: ContentFingerprint) -> Self {
        Self {
            fingerprint: Some(fingerprint),
            exists: false,
            is_owner: false,
            owner_id: None,
            owner_public_handle: None,
            registered_at: None,
            proof_ref: None,
            error: None,
            degraded: false,
        }
    }

    /// Registered to the requester
    pub fn owned(record: &ProofRecord, handle: String) -> Self {
        Self {
            fingerprint: Some(record.fingerprint),
            exists: true,
            is_owner: true,
            owner_id: Some(record.owner_id.clone()),
            owner_public_handle: Some(handle),
            registered_at: Some(record.created_at),
            proof_ref: Some(ProofRef {
                transaction_id: record.ledger_transaction_id.clone(),
                explorer_url: record.ledger_explorer_url.clone(),
            }),
            error: None,
            degraded: false,
        }
    }

    /// Registered to somebody else
    pub fn owned_by_other(record: &ProofRecord, handle: String) -> Self {
        Self {
            fingerprint: Some(record.fingerprint),
            exists: true,
            is_owner: false,
            owner_id: None,
            owner_public_handle: Some(handle),
            registered_at: Some(record.created_at),
            proof_ref: None,
            error: None,
            degraded: false,
        }
    }

    /// Ownership could not be determined
    pub fn unavailable(fingerprint: ContentFingerprint) -> Self {
        Self {
            error: Some(UNAVAILABLE_MESSAGE.to_string()),
            ..Self::not_found(fingerprint)
        }
    }

    pub fn with_degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }

    pub fn is_unavailable(&self) -> bool {
        self.error.is_some()
    }
}

/// Why a registration was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Determined, and it belongs to someone else
    Conflict {
        fingerprint: ContentFingerprint,
        owner_public_handle: String,
        registered_at: DateTime<Utc>,
    },
    /// Could not be determined
    Unverifiable,
}

impl RejectionReason {
    pub fn message(&self) -> String {
        match self {
            RejectionReason::Conflict {
                owner_public_handle,
                registered_at,
                ..
            } => format!(
                "content already registered by {owner_public_handle} on {}",
                registered_at.format("%Y-%m-%d")
            ),
            RejectionReason::Unverifiable => UNAVAILABLE_MESSAGE.to_string(),
        }
    }
}

/// A successful registration or re-confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub record: ProofRecord,
    /// False when the requester already owned this fingerprint
    pub newly_registered: bool,
    pub mirror: MirrorStatus,
}

impl Registration {
    pub fn transaction_id(&self) -> &str {
        &self.record.ledger_transaction_id
    }
}

/// Terminal outcome of `register_proof`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Confirmed(Registration),
    Rejected(RejectionReason),
}

impl RegistrationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, RegistrationOutcome::Confirmed(_))
    }

    pub fn registration(&self) -> Option<&Registration> {
        match self {
            RegistrationOutcome::Confirmed(r) => Some(r),
            RegistrationOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            RegistrationOutcome::Confirmed(_) => None,
            RegistrationOutcome::Rejected(r) => Some(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::compute_fingerprint;
    use crate::domain::{ContentMetadata, LedgerReceipt};

    fn record() -> ProofRecord {
        ProofRecord::pending(
            compute_fingerprint(b"B1"),
            OwnerId::new("alice"),
            ContentMetadata {
                content_type: "video/mp4".into(),
                filename: "clip.mp4".into(),
                file_size_bytes: 2,
                content_id: Some("clip-1".into()),
            },
            LedgerReceipt {
                transaction_id: "0x01".into(),
                explorer_url: "https://explorer.example/tx/0x01".into(),
            },
        )
    }

    #[test]
    fn test_non_owner_view_hides_private_fields() {
        let result = OwnershipQueryResult::owned_by_other(&record(), "alice".into());
        assert!(result.exists);
        assert!(!result.is_owner);
        assert!(result.owner_id.is_none());
        assert!(result.proof_ref.is_none());
        assert_eq!(result.owner_public_handle.as_deref(), Some("alice"));

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("owner_id").is_none());
        assert!(json.get("proof_ref").is_none());
    }

    #[test]
    fn test_owner_view_has_proof_ref() {
        let result = OwnershipQueryResult::owned(&record(), "alice".into());
        assert!(result.is_owner);
        assert_eq!(result.proof_ref.unwrap().transaction_id, "0x01");
    }

    #[test]
    fn test_unavailable_is_distinct_from_not_found() {
        let fp = compute_fingerprint(b"x");
        let unavailable = OwnershipQueryResult::unavailable(fp);
        assert!(unavailable.is_unavailable());
        assert!(!unavailable.exists);
        assert!(!OwnershipQueryResult::not_found(fp).is_unavailable());
    }

    #[test]
    fn test_rejection_serializes_with_tag() {
        let json = serde_json::to_value(RejectionReason::Unverifiable).unwrap();
        assert_eq!(json["reason"], "unverifiable");
    }
}
