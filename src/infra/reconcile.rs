//! Proofs awaiting a mirror write
//!
//! When the ledger accepted a registration but no tier stored the record,
//! or the stored record could not be confirmed, the record goes into a
//! [`MirrorJournal`] until
//! [`crate::resolver::OwnershipResolver::reconcile_unmirrored`] resolves it.
//! Durable deployments use [`super::SqliteMirrorJournal`];
//! [`MemoryMirrorJournal`] lives only as long as the process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::crypto::ContentFingerprint;
use crate::domain::ProofRecord;

use super::{MirrorJournal, Result};

/// A record waiting for its mirror write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmirroredProof {
    pub record: ProofRecord,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records now stored and confirmed in a tier
    pub mirrored: usize,
    /// Records whose fingerprint was already owned by someone else
    pub conflicts: Vec<ContentFingerprint>,
    /// Records still waiting
    pub pending: usize,
}

/// Process-local journal, in insertion order
#[derive(Default)]
pub struct MemoryMirrorJournal {
    entries: Mutex<Vec<UnmirroredProof>>,
}

impl MemoryMirrorJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MirrorJournal for MemoryMirrorJournal {
    async fn append(&self, record: &ProofRecord) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries
            .iter()
            .any(|e| e.record.fingerprint == record.fingerprint)
        {
            return Ok(());
        }
        entries.push(UnmirroredProof {
            record: record.clone(),
            queued_at: Utc::now(),
            attempts: 0,
        });
        Ok(())
    }

    async fn find(&self, fingerprint: &ContentFingerprint) -> Result<Option<UnmirroredProof>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .find(|e| &e.record.fingerprint == fingerprint)
            .cloned())
    }

    async fn pending(&self) -> Result<Vec<UnmirroredProof>> {
        Ok(self.entries.lock().await.clone())
    }

    async fn record_attempt(&self, fingerprint: &ContentFingerprint) -> Result<()> {
        if let Some(entry) = self
            .entries
            .lock()
            .await
            .iter_mut()
            .find(|e| &e.record.fingerprint == fingerprint)
        {
            entry.attempts += 1;
        }
        Ok(())
    }

    async fn mark_resolved(&self, fingerprint: &ContentFingerprint) -> Result<()> {
        self.entries
            .lock()
            .await
            .retain(|e| &e.record.fingerprint != fingerprint);
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self.entries.lock().await.len() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
