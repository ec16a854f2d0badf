//! Process-local ledger for development and tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{LedgerReceipt, LedgerVerification};
use crate::infra::{LedgerClient, LedgerRegistration, ProvenanceError, Result, StoragePolicy};

/// In-memory ledger. Every successful `register` yields a fresh
/// transaction id, so repeated calls for one fingerprint are visible.
pub struct MemoryLedger {
    transactions: RwLock<HashSet<String>>,
    register_calls: AtomicU64,
    offline: AtomicBool,
    latency: Duration,
}

impl MemoryLedger {
    /// Create a ledger for a non-production deployment
    pub fn new(policy: StoragePolicy) -> Result<Self> {
        if policy.is_production() {
            return Err(ProvenanceError::Configuration(
                "in-memory ledger cannot be used in production".to_string(),
            ));
        }
        Ok(Self::unchecked())
    }

    fn unchecked() -> Self {
        Self {
            transactions: RwLock::new(HashSet::new()),
            register_calls: AtomicU64::new(0),
            offline: AtomicBool::new(false),
            latency: Duration::ZERO,
        }
    }

    /// Ledger for tests; no policy check
    pub fn for_tests() -> Self {
        Self::unchecked()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Simulate a transport outage
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `register` calls received, failed ones included
    pub fn register_calls(&self) -> u64 {
        self.register_calls.load(Ordering::SeqCst)
    }

    async fn simulate_network(&self) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProvenanceError::LedgerUnavailable(
                "memory ledger offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn register(&self, registration: &LedgerRegistration) -> Result<LedgerReceipt> {
        let call = self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;

        let mut hasher = Sha256::new();
        hasher.update(registration.fingerprint.as_bytes());
        hasher.update(registration.owner_id.as_str().as_bytes());
        hasher.update(call.to_be_bytes());
        let transaction_id = format!("0x{}", hex::encode(hasher.finalize()));

        self.transactions
            .write()
            .await
            .insert(transaction_id.clone());

        debug!(
            fingerprint = %registration.fingerprint,
            transaction_id = %transaction_id,
            "Proof registered on memory ledger"
        );

        Ok(LedgerReceipt {
            explorer_url: format!("memory://tx/{transaction_id}"),
            transaction_id,
        })
    }

    async fn verify(&self, transaction_id: &str) -> Result<LedgerVerification> {
        self.simulate_network().await?;
        let confirmed = self.transactions.read().await.contains(transaction_id);
        Ok(LedgerVerification {
            transaction_id: transaction_id.to_string(),
            confirmed,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
