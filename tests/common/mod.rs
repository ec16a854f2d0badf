//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use provenance_registry::crypto::ContentFingerprint;
use provenance_registry::domain::{OwnerId, ProofRecord, ProofStatus};
use provenance_registry::infra::{
    InMemoryProofStore, InsertOutcome, MemoryMirrorJournal, MirrorJournal, ProofTier,
    ProvenanceError, Result, RetryConfig, SqliteMirrorJournal, StoragePolicy, TieredProofStore,
};
use provenance_registry::ledger::MemoryLedger;
use provenance_registry::resolver::{OwnershipResolver, RegisterRequest, ResolverConfig};

/// Bytes used by the "new content" scenarios
pub const B1: &[u8] = b"B1: unreleased demo track, master v3";
/// Bytes used by the race scenarios
pub const B2: &[u8] = b"B2: never-seen photograph, raw export";

/// Failure injected by [`FaultyTier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Fault {
    None = 0,
    SchemaMissing = 1,
    AccessRestricted = 2,
    Unavailable = 3,
}

impl Fault {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Fault::SchemaMissing,
            2 => Fault::AccessRestricted,
            3 => Fault::Unavailable,
            _ => Fault::None,
        }
    }

    fn error(self) -> Option<ProvenanceError> {
        match self {
            Fault::None => None,
            Fault::SchemaMissing => Some(ProvenanceError::StoreSchemaMissing(
                "relation \"proofs\" does not exist".into(),
            )),
            Fault::AccessRestricted => Some(ProvenanceError::StoreAccessRestricted(
                "permission denied for table proofs".into(),
            )),
            Fault::Unavailable => Some(ProvenanceError::StoreUnavailable(
                "pool timed out while waiting for an open connection".into(),
            )),
        }
    }
}

/// In-memory tier whose reads and writes can be switched to fail.
///
/// Counts every call, failed ones included, so tests can prove a tier
/// was never touched.
#[derive(Default)]
pub struct FaultyTier {
    inner: InMemoryProofStore,
    read_fault: AtomicU8,
    write_fault: AtomicU8,
    status_fault: AtomicU8,
    calls: AtomicU64,
}

impl FaultyTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail both reads and writes
    pub fn set_fault(&self, fault: Fault) {
        self.read_fault.store(fault as u8, Ordering::SeqCst);
        self.write_fault.store(fault as u8, Ordering::SeqCst);
    }

    /// Fail writes only; reads keep working
    pub fn set_write_fault(&self, fault: Fault) {
        self.write_fault.store(fault as u8, Ordering::SeqCst);
    }

    /// Fail status updates only; inserts and reads keep working
    pub fn set_status_fault(&self, fault: Fault) {
        self.status_fault.store(fault as u8, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    fn check(&self, fault: &AtomicU8) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match Fault::from_u8(fault.load(Ordering::SeqCst)).error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProofTier for FaultyTier {
    async fn find(&self, fingerprint: &ContentFingerprint) -> Result<Option<ProofRecord>> {
        self.check(&self.read_fault)?;
        self.inner.find(fingerprint).await
    }

    async fn insert_if_absent(&self, record: &ProofRecord) -> Result<InsertOutcome> {
        self.check(&self.write_fault)?;
        self.inner.insert_if_absent(record).await
    }

    async fn update_status(
        &self,
        fingerprint: &ContentFingerprint,
        status: ProofStatus,
    ) -> Result<Option<ProofRecord>> {
        self.check(&self.write_fault)?;
        self.check(&self.status_fault)?;
        self.inner.update_status(fingerprint, status).await
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<ProofRecord>> {
        self.check(&self.read_fault)?;
        self.inner.list_by_owner(owner).await
    }

    async fn ping(&self) -> Result<()> {
        self.check(&self.read_fault)
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}

/// Everything a resolver test needs a handle on
pub struct Harness {
    pub primary: Arc<FaultyTier>,
    pub secondary: Option<Arc<FaultyTier>>,
    pub ledger: Arc<MemoryLedger>,
    pub journal: Arc<MemoryMirrorJournal>,
    pub resolver: Arc<OwnershipResolver>,
}

impl Harness {
    /// Production policy, primary only
    pub fn production() -> Self {
        Self::build(StoragePolicy::production(), false, MemoryLedger::for_tests())
    }

    /// Production policy with a secondary handed in (and dropped by the store)
    pub fn production_with_secondary() -> Self {
        Self::build(StoragePolicy::production(), true, MemoryLedger::for_tests())
    }

    /// Development policy with a secondary tier
    pub fn development() -> Self {
        Self::build(StoragePolicy::development(), true, MemoryLedger::for_tests())
    }

    pub fn with_ledger(policy: StoragePolicy, ledger: MemoryLedger) -> Self {
        Self::build(policy, false, ledger)
    }

    fn build(policy: StoragePolicy, with_secondary: bool, ledger: MemoryLedger) -> Self {
        let primary = Arc::new(FaultyTier::new());
        let secondary = with_secondary.then(|| Arc::new(FaultyTier::new()));
        let ledger = Arc::new(ledger);
        let journal = Arc::new(MemoryMirrorJournal::new());

        let resolver = resolver_over(
            policy,
            primary.clone(),
            secondary.clone(),
            ledger.clone(),
            journal.clone(),
        );

        Self {
            primary,
            secondary,
            ledger,
            journal,
            resolver: Arc::new(resolver),
        }
    }
}

/// Resolver over the given tiers, ledger and journal, with test timings
pub fn resolver_over(
    policy: StoragePolicy,
    primary: Arc<FaultyTier>,
    secondary: Option<Arc<FaultyTier>>,
    ledger: Arc<MemoryLedger>,
    journal: Arc<dyn MirrorJournal>,
) -> OwnershipResolver {
    let store = TieredProofStore::new(
        policy,
        primary,
        secondary.map(|s| s as Arc<dyn ProofTier>),
    );

    OwnershipResolver::new(Arc::new(store), ledger)
        .with_config(
            ResolverConfig::default()
                .with_ledger_timeout(Duration::from_millis(500))
                .with_mirror_retry(RetryConfig::fast()),
        )
        .with_journal(journal)
}

/// SQLite journal file under the temp dir; same path reopens the same journal
pub async fn open_file_journal(path: &std::path::Path) -> Arc<SqliteMirrorJournal> {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let journal = SqliteMirrorJournal::from_path(&url).await.unwrap();
    journal.initialize().await.unwrap();
    Arc::new(journal)
}

/// Fresh journal path for one test
pub fn temp_journal_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("mirror-journal-{}.db", uuid::Uuid::new_v4()))
}

pub fn owner(id: &str) -> OwnerId {
    OwnerId::new(id)
}

/// Registration request with fixed metadata
pub fn register_request(content: &[u8], requester: &str) -> RegisterRequest {
    RegisterRequest {
        content: content.to_vec(),
        content_type: "audio/mpeg".to_string(),
        filename: "track.mp3".to_string(),
        requester: owner(requester),
        content_id: Some("content-42".to_string()),
    }
}
