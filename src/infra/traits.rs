//! Trait definitions for the provenance registry's collaborators

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::crypto::ContentFingerprint;
use crate::domain::{
    ContentMetadata, LedgerReceipt, LedgerVerification, OwnerId, ProofRecord, ProofStatus,
};

use super::{Result, UnmirroredProof};

/// Outcome of an insert-if-absent on a single tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written
    Inserted(ProofRecord),
    /// A record with the same fingerprint was already present; nothing written
    Existing(ProofRecord),
}

/// One persistence backend for proof records.
///
/// Implementations must classify their driver errors into the store variants
/// of [`super::ProvenanceError`] before returning.
///
/// Invariant: `fingerprint` is a unique key; `insert_if_absent` is atomic.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofTier: Send + Sync {
    /// Fetch the record for a fingerprint, if any
    async fn find(&self, fingerprint: &ContentFingerprint) -> Result<Option<ProofRecord>>;

    /// Insert unless a record with this fingerprint already exists
    async fn insert_if_absent(&self, record: &ProofRecord) -> Result<InsertOutcome>;

    /// Move a record to a new status. Returns the updated record, or `None`
    /// if no record exists for the fingerprint.
    async fn update_status(
        &self,
        fingerprint: &ContentFingerprint,
        status: ProofStatus,
    ) -> Result<Option<ProofRecord>>;

    /// All records owned by a principal, newest first
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<ProofRecord>>;

    /// Cheap reachability check
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Registration payload sent to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRegistration {
    pub fingerprint: ContentFingerprint,
    pub owner_id: OwnerId,
    pub metadata: ContentMetadata,
}

/// Immutable external authority that records ownership proofs.
///
/// `register` is not idempotent: two calls for the same fingerprint may
/// produce two transactions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Record a proof; fails with `LedgerUnavailable` or `LedgerRejected`.
    ///
    /// Once the authority has accepted the transaction, implementations
    /// return its receipt even if confirmation could not be observed.
    async fn register(&self, registration: &LedgerRegistration) -> Result<LedgerReceipt>;

    /// Check whether a transaction is confirmed
    async fn verify(&self, transaction_id: &str) -> Result<LedgerVerification>;

    /// Adapter name for logs
    fn name(&self) -> &'static str;
}

/// Durable record of proofs the ledger accepted but no tier stored yet.
///
/// Never an ownership tier: it only answers "is this fingerprint already
/// on the ledger, waiting to be mirrored?". Entries stay pending until
/// [`MirrorJournal::mark_resolved`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MirrorJournal: Send + Sync {
    /// Add a record. A pending entry for the same fingerprint is kept as is;
    /// a resolved one is reopened.
    async fn append(&self, record: &ProofRecord) -> Result<()>;

    /// Pending entry for a fingerprint, if any
    async fn find(&self, fingerprint: &ContentFingerprint) -> Result<Option<UnmirroredProof>>;

    /// Every pending entry, oldest first
    async fn pending(&self) -> Result<Vec<UnmirroredProof>>;

    /// Count one failed mirror attempt
    async fn record_attempt(&self, fingerprint: &ContentFingerprint) -> Result<()>;

    /// Stop tracking an entry (mirrored, or superseded by a stored owner)
    async fn mark_resolved(&self, fingerprint: &ContentFingerprint) -> Result<()>;

    /// Number of pending entries
    async fn pending_count(&self) -> Result<u64>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Maps owner ids to the handle other users may see.
///
/// Implementations must never return private contact data.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn public_handle(&self, owner: &OwnerId) -> String;
}

/// Uses the owner id itself as the public handle
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityDirectory;

#[async_trait]
impl OwnerDirectory for IdentityDirectory {
    async fn public_handle(&self, owner: &OwnerId) -> String {
        owner.as_str().to_string()
    }
}

/// Health of one configured tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl ComponentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentHealth::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, ComponentHealth::Unhealthy { .. })
    }
}
