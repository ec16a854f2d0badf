//! Tiered proof store
//!
//! Single source of truth for "who owns fingerprint F". Reads and writes go
//! to the primary tier. When the primary reports a recoverable-unavailable
//! error the [`StoragePolicy`] decides:
//!
//! - production: fail closed with `DataUnavailable`, secondary untouched
//! - development: repeat the operation on the secondary, tagged `degraded`
//!
//! Any other primary error is propagated unchanged.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::crypto::ContentFingerprint;
use crate::domain::{OwnerId, ProofRecord, ProofStatus, StorageTier};

use super::{ComponentHealth, InsertOutcome, ProofTier, ProvenanceError, Result, StoragePolicy};

/// Result of a read through the tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub record: Option<ProofRecord>,
    pub tier: StorageTier,
    pub degraded: bool,
}

/// Result of a save through the tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written, or already present under the same owner
    Persisted {
        record: ProofRecord,
        tier: StorageTier,
        degraded: bool,
    },
    /// Already present under a different owner
    Conflict { existing: ProofRecord },
}

/// Health of the configured tiers
#[derive(Debug, Clone)]
pub struct TierHealth {
    pub primary: ComponentHealth,
    pub secondary: Option<ComponentHealth>,
}

/// Proof store spanning a primary tier and an optional secondary tier
pub struct TieredProofStore {
    policy: StoragePolicy,
    primary: Arc<dyn ProofTier>,
    secondary: Option<Arc<dyn ProofTier>>,
}

impl TieredProofStore {
    /// Create a store. Under a production policy any secondary is dropped
    /// here, so no later code path can reach it.
    pub fn new(
        policy: StoragePolicy,
        primary: Arc<dyn ProofTier>,
        secondary: Option<Arc<dyn ProofTier>>,
    ) -> Self {
        let secondary = match secondary {
            Some(tier) if !policy.secondary_allowed() => {
                warn!(
                    secondary = tier.name(),
                    "Secondary proof tier ignored under production policy"
                );
                None
            }
            other => other,
        };

        Self {
            policy,
            primary,
            secondary,
        }
    }

    /// Create a store with only a primary tier
    pub fn primary_only(policy: StoragePolicy, primary: Arc<dyn ProofTier>) -> Self {
        Self::new(policy, primary, None)
    }

    pub fn policy(&self) -> StoragePolicy {
        self.policy
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    /// Find the owner record for a fingerprint
    pub async fn find_by_fingerprint(&self, fingerprint: &ContentFingerprint) -> Result<Lookup> {
        let (record, tier) = self
            .with_fallback("find", |tier| async move { tier.find(fingerprint).await })
            .await?;

        Ok(Lookup {
            record,
            tier,
            degraded: tier == StorageTier::Secondary,
        })
    }

    /// Insert-if-absent keyed on fingerprint
    pub async fn save(&self, record: &ProofRecord) -> Result<SaveOutcome> {
        let (outcome, tier) = self
            .with_fallback("save", |tier| async move {
                tier.insert_if_absent(record).await
            })
            .await?;
        let degraded = tier == StorageTier::Secondary;

        Ok(match outcome {
            InsertOutcome::Inserted(stored) => SaveOutcome::Persisted {
                record: stored,
                tier,
                degraded,
            },
            InsertOutcome::Existing(existing) if existing.owner_id == record.owner_id => {
                debug!(
                    fingerprint = %record.fingerprint,
                    tier = %tier,
                    "Proof already stored for this owner"
                );
                SaveOutcome::Persisted {
                    record: existing,
                    tier,
                    degraded,
                }
            }
            InsertOutcome::Existing(existing) => SaveOutcome::Conflict { existing },
        })
    }

    /// Mark a stored record confirmed
    pub async fn confirm(&self, fingerprint: &ContentFingerprint) -> Result<Option<ProofRecord>> {
        self.set_status(fingerprint, ProofStatus::Confirmed).await
    }

    /// Move a stored record to `status`, following the same tier rules
    pub async fn set_status(
        &self,
        fingerprint: &ContentFingerprint,
        status: ProofStatus,
    ) -> Result<Option<ProofRecord>> {
        let (record, _) = self
            .with_fallback("update_status", |tier| async move {
                tier.update_status(fingerprint, status).await
            })
            .await?;
        Ok(record)
    }

    /// Records owned by a principal
    pub async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<ProofRecord>> {
        let (records, _) = self
            .with_fallback("list_by_owner", |tier| async move {
                tier.list_by_owner(owner).await
            })
            .await?;
        Ok(records)
    }

    /// Ping every configured tier
    pub async fn health(&self) -> TierHealth {
        let primary = match self.primary.ping().await {
            Ok(()) => ComponentHealth::Healthy,
            Err(e) if e.is_recoverable_unavailable() && self.secondary.is_some() => {
                ComponentHealth::Degraded {
                    reason: e.to_string(),
                }
            }
            Err(e) => ComponentHealth::Unhealthy {
                reason: e.to_string(),
            },
        };

        let secondary = match &self.secondary {
            Some(tier) => Some(match tier.ping().await {
                Ok(()) => ComponentHealth::Healthy,
                Err(e) => ComponentHealth::Unhealthy {
                    reason: e.to_string(),
                },
            }),
            None => None,
        };

        TierHealth { primary, secondary }
    }

    /// Run `op` on the primary; on a recoverable-unavailable error apply the
    /// policy. Returns the value and the tier that produced it.
    async fn with_fallback<'a, T, F, Fut>(
        &'a self,
        operation: &'static str,
        op: F,
    ) -> Result<(T, StorageTier)>
    where
        F: Fn(&'a dyn ProofTier) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        let primary_err = match op(self.primary.as_ref()).await {
            Ok(value) => return Ok((value, StorageTier::Primary)),
            Err(e) if e.is_recoverable_unavailable() => e,
            Err(e) => return Err(e),
        };

        if self.policy.is_production() {
            warn!(
                operation,
                error_kind = primary_err.kind(),
                error = %primary_err,
                "Primary proof tier unavailable; failing closed"
            );
            return Err(ProvenanceError::DataUnavailable);
        }

        let Some(secondary) = self.secondary.as_deref() else {
            warn!(
                operation,
                error_kind = primary_err.kind(),
                error = %primary_err,
                "Primary proof tier unavailable and no secondary configured"
            );
            return Err(ProvenanceError::DataUnavailable);
        };

        warn!(
            operation,
            error_kind = primary_err.kind(),
            error = %primary_err,
            secondary = secondary.name(),
            "Primary proof tier unavailable; using secondary (degraded)"
        );

        match op(secondary).await {
            Ok(value) => Ok((value, StorageTier::Secondary)),
            Err(e) if e.is_recoverable_unavailable() => {
                warn!(operation, error = %e, "Secondary proof tier unavailable too");
                Err(ProvenanceError::DataUnavailable)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::compute_fingerprint;
    use crate::domain::{ContentMetadata, LedgerReceipt};
    use crate::infra::{InMemoryProofStore, MockProofTier};

    fn record(owner: &str, content: &[u8]) -> ProofRecord {
        ProofRecord::pending(
            compute_fingerprint(content),
            OwnerId::new(owner),
            ContentMetadata {
                content_type: "image/png".into(),
                filename: "art.png".into(),
                file_size_bytes: content.len() as u64,
                content_id: None,
            },
            LedgerReceipt {
                transaction_id: format!("0x{owner}"),
                explorer_url: format!("https://explorer.example/tx/0x{owner}"),
            },
        )
    }

    fn schema_missing_tier() -> MockProofTier {
        let mut tier = MockProofTier::new();
        tier.expect_find()
            .returning(|_| Err(ProvenanceError::StoreSchemaMissing("proofs".into())));
        tier.expect_insert_if_absent()
            .returning(|_| Err(ProvenanceError::StoreSchemaMissing("proofs".into())));
        tier.expect_update_status()
            .returning(|_, _| Err(ProvenanceError::StoreSchemaMissing("proofs".into())));
        tier.expect_name().return_const("mock");
        tier
    }

    fn untouchable_tier() -> MockProofTier {
        let mut tier = MockProofTier::new();
        tier.expect_find().never();
        tier.expect_insert_if_absent().never();
        tier.expect_update_status().never();
        tier.expect_name().return_const("untouchable");
        tier
    }

    #[tokio::test]
    async fn test_primary_hit() {
        let primary = Arc::new(InMemoryProofStore::new());
        let store = TieredProofStore::primary_only(StoragePolicy::production(), primary.clone());
        let rec = record("alice", b"one");

        let outcome = store.save(&rec).await.unwrap();
        assert!(matches!(
            outcome,
            SaveOutcome::Persisted {
                tier: StorageTier::Primary,
                degraded: false,
                ..
            }
        ));

        let lookup = store.find_by_fingerprint(&rec.fingerprint).await.unwrap();
        assert_eq!(lookup.tier, StorageTier::Primary);
        assert!(!lookup.degraded);
        assert!(lookup.record.unwrap().same_content_as(&rec));
    }

    #[tokio::test]
    async fn test_same_owner_save_is_idempotent() {
        let store = TieredProofStore::primary_only(
            StoragePolicy::production(),
            Arc::new(InMemoryProofStore::new()),
        );
        let first = record("alice", b"same");
        store.save(&first).await.unwrap();

        let mut second = record("alice", b"same");
        second.ledger_transaction_id = "0xother".into();
        match store.save(&second).await.unwrap() {
            SaveOutcome::Persisted { record, .. } => {
                assert_eq!(record.ledger_transaction_id, first.ledger_transaction_id);
            }
            other => panic!("expected persisted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_different_owner_conflicts() {
        let store = TieredProofStore::primary_only(
            StoragePolicy::production(),
            Arc::new(InMemoryProofStore::new()),
        );
        store.save(&record("alice", b"shared")).await.unwrap();

        match store.save(&record("bob", b"shared")).await.unwrap() {
            SaveOutcome::Conflict { existing } => {
                assert_eq!(existing.owner_id, OwnerId::new("alice"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_production_never_touches_secondary() {
        let store = TieredProofStore::new(
            StoragePolicy::production(),
            Arc::new(schema_missing_tier()),
            Some(Arc::new(untouchable_tier())),
        );
        assert!(!store.has_secondary());

        let rec = record("alice", b"prod");
        assert!(matches!(
            store.find_by_fingerprint(&rec.fingerprint).await,
            Err(ProvenanceError::DataUnavailable)
        ));
        assert!(matches!(
            store.save(&rec).await,
            Err(ProvenanceError::DataUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_development_falls_back_degraded() {
        let secondary = Arc::new(InMemoryProofStore::new());
        let store = TieredProofStore::new(
            StoragePolicy::development(),
            Arc::new(schema_missing_tier()),
            Some(secondary.clone()),
        );

        let rec = record("alice", b"dev");
        match store.save(&rec).await.unwrap() {
            SaveOutcome::Persisted { tier, degraded, .. } => {
                assert_eq!(tier, StorageTier::Secondary);
                assert!(degraded);
            }
            other => panic!("expected persisted, got {other:?}"),
        }
        assert_eq!(secondary.len().await, 1);

        let lookup = store.find_by_fingerprint(&rec.fingerprint).await.unwrap();
        assert!(lookup.degraded);
        assert_eq!(lookup.tier, StorageTier::Secondary);
        assert!(lookup.record.is_some());
    }

    #[tokio::test]
    async fn test_development_without_secondary_is_unavailable() {
        let store =
            TieredProofStore::primary_only(StoragePolicy::development(), Arc::new(schema_missing_tier()));
        let fp = compute_fingerprint(b"x");
        assert!(matches!(
            store.find_by_fingerprint(&fp).await,
            Err(ProvenanceError::DataUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_non_recoverable_error_propagates_without_fallback() {
        let mut primary = MockProofTier::new();
        primary
            .expect_find()
            .returning(|_| Err(ProvenanceError::Internal("corrupt row".into())));
        primary.expect_name().return_const("mock");

        let store = TieredProofStore::new(
            StoragePolicy::development(),
            Arc::new(primary),
            Some(Arc::new(untouchable_tier())),
        );

        let err = store
            .find_by_fingerprint(&compute_fingerprint(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::Internal(_)));
    }

    #[tokio::test]
    async fn test_confirm_updates_status() {
        let store = TieredProofStore::primary_only(
            StoragePolicy::production(),
            Arc::new(InMemoryProofStore::new()),
        );
        let rec = record("alice", b"confirm");
        store.save(&rec).await.unwrap();

        let confirmed = store.confirm(&rec.fingerprint).await.unwrap().unwrap();
        assert_eq!(confirmed.status, ProofStatus::Confirmed);
        assert!(store
            .confirm(&compute_fingerprint(b"missing"))
            .await
            .unwrap()
            .is_none());
    }
}
