//! Process-scoped in-memory proof tier
//!
//! Used as the development secondary tier and as a test double. State lives
//! as long as the owning handle; nothing is shared through globals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::crypto::ContentFingerprint;
use crate::domain::{OwnerId, ProofRecord, ProofStatus};

use super::{InsertOutcome, ProofTier, ProvenanceError, Result};

/// In-memory proof tier keyed by fingerprint
#[derive(Default)]
pub struct InMemoryProofStore {
    records: RwLock<HashMap<ContentFingerprint, ProofRecord>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Number of read calls served
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of write calls served
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProofTier for InMemoryProofStore {
    async fn find(&self, fingerprint: &ContentFingerprint) -> Result<Option<ProofRecord>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.read().await.get(fingerprint).cloned())
    }

    async fn insert_if_absent(&self, record: &ProofRecord) -> Result<InsertOutcome> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        // Single write lock makes check-and-insert atomic
        let mut records = self.records.write().await;

        if let Some(existing) = records.get(&record.fingerprint) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        records.insert(record.fingerprint, record.clone());
        Ok(InsertOutcome::Inserted(record.clone()))
    }

    async fn update_status(
        &self,
        fingerprint: &ContentFingerprint,
        status: ProofStatus,
    ) -> Result<Option<ProofRecord>> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut records = self.records.write().await;

        let Some(record) = records.get_mut(fingerprint) else {
            return Ok(None);
        };

        if !record.status.can_transition_to(status) {
            return Err(ProvenanceError::Internal(format!(
                "invalid status transition for {fingerprint}: {} -> {status}",
                record.status
            )));
        }

        if record.status != status {
            record.status = status;
            record.updated_at = Utc::now();
        }
        Ok(Some(record.clone()))
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<ProofRecord>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let records = self.records.read().await;
        let mut owned: Vec<ProofRecord> = records
            .values()
            .filter(|r| &r.owner_id == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
