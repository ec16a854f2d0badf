//! Ownership resolution
//!
//! Answers "can this requester claim this content?" and performs
//! registration. Per request:
//!
//! ```text
//! fingerprint -> find
//!   not found        -> ledger.register -> store.save -> Confirmed(new)
//!   same owner       -> Confirmed(existing), no ledger call
//!   different owner  -> Rejected(Conflict)
//!   data unavailable -> Rejected(Unverifiable)
//! ```
//!
//! Unavailability is never treated as "not found". A fingerprint held in the
//! mirror journal counts as registered.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn, Span};

use crate::crypto::{compute_fingerprint, ContentFingerprint};
use crate::domain::{
    ContentMetadata, LedgerVerification, MirrorStatus, OwnerId, OwnershipQueryResult,
    ProofRecord, ProofStatus, Registration, RegistrationOutcome, RejectionReason,
};
use crate::infra::{
    IdentityDirectory, LedgerClient, LedgerRegistration, MemoryMirrorJournal, MirrorJournal,
    OwnerDirectory, ProvenanceError, ReconcileReport, Result, Retry, RetryConfig, SaveOutcome,
    TieredProofStore,
};
use crate::metrics::{metric_names, MetricsRegistry};

const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolver tuning
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Deadline for each ledger call
    pub ledger_timeout: Duration,
    /// Backoff for the mirror write after a successful ledger registration
    pub mirror_retry: RetryConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ledger_timeout: DEFAULT_LEDGER_TIMEOUT,
            mirror_retry: RetryConfig::mirror(),
        }
    }
}

impl ResolverConfig {
    /// Read `LEDGER_TIMEOUT_SECS` and `MIRROR_RETRY_MAX`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("LEDGER_TIMEOUT_SECS") {
            let secs: u64 = value.parse().map_err(|_| {
                ProvenanceError::Configuration(format!("invalid LEDGER_TIMEOUT_SECS: {value}"))
            })?;
            config.ledger_timeout = Duration::from_secs(secs);
        }

        if let Ok(value) = std::env::var("MIRROR_RETRY_MAX") {
            let max: u32 = value.parse().map_err(|_| {
                ProvenanceError::Configuration(format!("invalid MIRROR_RETRY_MAX: {value}"))
            })?;
            config.mirror_retry = config.mirror_retry.with_max_retries(max);
        }

        Ok(config)
    }

    pub fn with_ledger_timeout(mut self, timeout: Duration) -> Self {
        self.ledger_timeout = timeout;
        self
    }

    pub fn with_mirror_retry(mut self, retry: RetryConfig) -> Self {
        self.mirror_retry = retry;
        self
    }
}

/// Content plus the claim made about it
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub content: Vec<u8>,
    pub content_type: String,
    pub filename: String,
    pub requester: OwnerId,
    pub content_id: Option<String>,
}

impl RegisterRequest {
    fn metadata(&self) -> ContentMetadata {
        ContentMetadata {
            content_type: self.content_type.clone(),
            filename: self.filename.clone(),
            file_size_bytes: self.content.len() as u64,
            content_id: self.content_id.clone(),
        }
    }
}

/// Orchestrates fingerprinting, the tiered store and the ledger
pub struct OwnershipResolver {
    store: Arc<TieredProofStore>,
    ledger: Arc<dyn LedgerClient>,
    directory: Arc<dyn OwnerDirectory>,
    config: ResolverConfig,
    journal: Arc<dyn MirrorJournal>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl OwnershipResolver {
    pub fn new(store: Arc<TieredProofStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            store,
            ledger,
            directory: Arc::new(IdentityDirectory),
            config: ResolverConfig::default(),
            journal: Arc::new(MemoryMirrorJournal::new()),
            metrics: None,
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the process-local journal, e.g. with a durable one
    pub fn with_journal(mut self, journal: Arc<dyn MirrorJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn OwnerDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &TieredProofStore {
        &self.store
    }

    /// Number of ledger-registered proofs waiting for a mirror write
    pub async fn unmirrored_count(&self) -> Result<u64> {
        self.journal.pending_count().await
    }

    /// Who owns this content, from the requester's point of view.
    ///
    /// Unavailability is reported in the result, not as an error.
    #[instrument(skip_all, fields(requester = %requester, fingerprint = tracing::field::Empty))]
    pub async fn check_ownership(
        &self,
        content: &[u8],
        requester: &OwnerId,
    ) -> Result<OwnershipQueryResult> {
        self.count(metric_names::OWNERSHIP_CHECKS).await;

        let fingerprint = compute_fingerprint(content);
        Span::current().record("fingerprint", tracing::field::display(&fingerprint));

        let (existing, degraded) = match self.find_existing(&fingerprint).await {
            Ok(found) => found,
            Err(ProvenanceError::DataUnavailable) => {
                self.count(metric_names::UNVERIFIABLE).await;
                return Ok(OwnershipQueryResult::unavailable(fingerprint));
            }
            Err(e) => return Err(e),
        };

        let Some((record, _)) = existing else {
            return Ok(OwnershipQueryResult::not_found(fingerprint).with_degraded(degraded));
        };

        let handle = self.directory.public_handle(&record.owner_id).await;
        let result = if record.is_owned_by(requester) {
            OwnershipQueryResult::owned(&record, handle)
        } else {
            OwnershipQueryResult::owned_by_other(&record, handle)
        };

        Ok(result.with_degraded(degraded))
    }

    /// Register content for the requester.
    ///
    /// Ledger failures (`LedgerRejected`, `LedgerUnavailable`,
    /// `LedgerTimeout`) are returned as errors and leave every tier
    /// untouched. After `LedgerTimeout` the outcome is unknown: the
    /// transaction may still land, so callers must not resubmit blindly.
    #[instrument(
        skip_all,
        fields(
            requester = %request.requester,
            size = request.content.len(),
            fingerprint = tracing::field::Empty
        )
    )]
    pub async fn register_proof(&self, request: RegisterRequest) -> Result<RegistrationOutcome> {
        let fingerprint = compute_fingerprint(&request.content);
        Span::current().record("fingerprint", tracing::field::display(&fingerprint));

        let existing = match self.find_existing(&fingerprint).await {
            Ok((existing, _)) => existing,
            Err(ProvenanceError::DataUnavailable) => {
                warn!("Ownership unverifiable; refusing registration");
                self.count(metric_names::UNVERIFIABLE).await;
                return Ok(RegistrationOutcome::Rejected(RejectionReason::Unverifiable));
            }
            Err(e) => return Err(e),
        };

        if let Some((record, mirror)) = existing {
            if record.is_owned_by(&request.requester) {
                debug!("Content already registered to requester");
                return Ok(RegistrationOutcome::Confirmed(Registration {
                    record,
                    newly_registered: false,
                    mirror,
                }));
            }

            self.count(metric_names::CONFLICTS).await;
            return Ok(RegistrationOutcome::Rejected(self.conflict(&record).await));
        }

        let registration = LedgerRegistration {
            fingerprint,
            owner_id: request.requester.clone(),
            metadata: request.metadata(),
        };

        let receipt = self
            .within_ledger_deadline(self.ledger.register(&registration))
            .await
            .map_err(|e| {
                warn!(
                    ledger = self.ledger.name(),
                    error_kind = e.kind(),
                    error = %e,
                    "Ledger registration failed; nothing persisted"
                );
                e
            })?;

        info!(
            transaction_id = %receipt.transaction_id,
            "Proof registered on ledger"
        );

        let record = ProofRecord::pending(
            fingerprint,
            request.requester,
            registration.metadata,
            receipt,
        );
        self.persist(record).await
    }

    /// Operator lookup by fingerprint, including unmirrored proofs
    #[instrument(skip(self), fields(fingerprint = %fingerprint))]
    pub async fn lookup(&self, fingerprint: &ContentFingerprint) -> Result<Option<ProofRecord>> {
        Ok(self
            .find_existing(fingerprint)
            .await?
            .0
            .map(|(record, _)| record))
    }

    /// Proofs held by one owner, newest first
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn proofs_owned_by(&self, owner: &OwnerId) -> Result<Vec<ProofRecord>> {
        self.store.list_by_owner(owner).await
    }

    /// Check a ledger transaction under the same deadline as registration
    #[instrument(skip(self))]
    pub async fn verify_transaction(&self, transaction_id: &str) -> Result<LedgerVerification> {
        self.within_ledger_deadline(self.ledger.verify(transaction_id))
            .await
    }

    /// Retry the mirror write once for every journaled proof
    #[instrument(skip(self))]
    pub async fn reconcile_unmirrored(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for entry in self.journal.pending().await? {
            let fingerprint = entry.record.fingerprint;
            match self.store.save(&entry.record).await {
                Ok(SaveOutcome::Persisted { record, .. }) => {
                    match self.store.confirm(&record.fingerprint).await {
                        Ok(Some(confirmed)) if confirmed.status == ProofStatus::Confirmed => {
                            self.journal.mark_resolved(&fingerprint).await?;
                            report.mirrored += 1;
                        }
                        Ok(_) => {
                            debug!(fingerprint = %fingerprint, "Mirrored proof not yet confirmed");
                            self.journal.record_attempt(&fingerprint).await?;
                        }
                        Err(e) => {
                            debug!(fingerprint = %fingerprint, error = %e, "Confirmation still failing");
                            self.journal.record_attempt(&fingerprint).await?;
                        }
                    }
                }
                Ok(SaveOutcome::Conflict { existing }) => {
                    warn!(
                        fingerprint = %fingerprint,
                        ledger_owner = %entry.record.owner_id,
                        stored_owner = %existing.owner_id,
                        transaction_id = %entry.record.ledger_transaction_id,
                        "Journaled proof conflicts with stored owner"
                    );
                    self.journal.mark_resolved(&fingerprint).await?;
                    report.conflicts.push(fingerprint);
                }
                Err(e) => {
                    debug!(
                        fingerprint = %fingerprint,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Mirror write still failing"
                    );
                    self.journal.record_attempt(&fingerprint).await?;
                }
            }
        }

        report.pending = self.journal.pending_count().await? as usize;
        self.add(metric_names::RECONCILED, report.mirrored as u64)
            .await;
        self.set_queue_depth(report.pending as u64).await;

        info!(
            mirrored = report.mirrored,
            conflicts = report.conflicts.len(),
            pending = report.pending,
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    /// Stored record (or journaled unmirrored record) for a fingerprint,
    /// with the mirror status it should be reported under. The second value
    /// is the `degraded` flag of the read. An unreadable journal means
    /// ownership cannot be determined.
    async fn find_existing(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> Result<(Option<(ProofRecord, MirrorStatus)>, bool)> {
        let lookup = self.store.find_by_fingerprint(fingerprint).await?;
        if lookup.degraded {
            self.count(metric_names::DEGRADED_READS).await;
        }

        if let Some(record) = lookup.record {
            let mirror = if lookup.degraded {
                MirrorStatus::Degraded
            } else {
                MirrorStatus::Mirrored
            };
            return Ok((Some((record, mirror)), lookup.degraded));
        }

        let journaled = match self.journal.find(fingerprint).await {
            Ok(entry) => entry.map(|e| (e.record, MirrorStatus::Unmirrored)),
            Err(e) => {
                warn!(
                    journal = self.journal.name(),
                    error_kind = e.kind(),
                    error = %e,
                    "Mirror journal unreadable"
                );
                return Err(ProvenanceError::DataUnavailable);
            }
        };
        Ok((journaled, lookup.degraded))
    }

    /// Save a freshly registered proof, retrying transient failures
    async fn persist(&self, record: ProofRecord) -> Result<RegistrationOutcome> {
        let retry = Retry::new(self.config.mirror_retry.clone());
        let saved = retry
            .run_with_predicate(
                "mirror_proof",
                || self.store.save(&record),
                ProvenanceError::is_retryable,
            )
            .await
            .into_result();

        match saved {
            Ok(SaveOutcome::Persisted {
                record: stored,
                degraded,
                ..
            }) => {
                let newly_registered = stored.id == record.id;
                let stored = match self.store.confirm(&stored.fingerprint).await {
                    Ok(Some(confirmed)) => confirmed,
                    Ok(None) => stored,
                    Err(e) => {
                        warn!(error = %e, "Proof stored but not confirmed; journaled");
                        self.journal_unmirrored(&stored).await;
                        stored
                    }
                };

                if newly_registered {
                    self.count(metric_names::REGISTRATIONS).await;
                }

                Ok(RegistrationOutcome::Confirmed(Registration {
                    record: stored,
                    newly_registered,
                    mirror: if degraded {
                        MirrorStatus::Degraded
                    } else {
                        MirrorStatus::Mirrored
                    },
                }))
            }
            Ok(SaveOutcome::Conflict { existing }) => {
                // Lost the race after our ledger write; report the stored winner
                let winner = self
                    .store
                    .find_by_fingerprint(&record.fingerprint)
                    .await
                    .ok()
                    .and_then(|lookup| lookup.record)
                    .unwrap_or(existing);
                warn!(
                    orphaned_transaction = %record.ledger_transaction_id,
                    winner = %winner.owner_id,
                    "Registration lost race to another owner"
                );
                self.count(metric_names::CONFLICTS).await;
                Ok(RegistrationOutcome::Rejected(self.conflict(&winner).await))
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    transaction_id = %record.ledger_transaction_id,
                    error = %e,
                    "Ledger registration succeeded but no tier accepted the proof; journaled"
                );
                self.journal_unmirrored(&record).await;
                self.count(metric_names::UNMIRRORED).await;

                Ok(RegistrationOutcome::Confirmed(Registration {
                    record,
                    newly_registered: true,
                    mirror: MirrorStatus::Unmirrored,
                }))
            }
            Err(e) => {
                // Keep the ledger proof reachable even though the caller sees the error
                self.journal_unmirrored(&record).await;
                Err(e)
            }
        }
    }

    async fn journal_unmirrored(&self, record: &ProofRecord) {
        if let Err(e) = self.journal.append(record).await {
            error!(
                fingerprint = %record.fingerprint,
                transaction_id = %record.ledger_transaction_id,
                journal = self.journal.name(),
                error = %e,
                "Ledger proof could not be journaled"
            );
        }
        if let Ok(depth) = self.journal.pending_count().await {
            self.set_queue_depth(depth).await;
        }
    }

    async fn conflict(&self, existing: &ProofRecord) -> RejectionReason {
        RejectionReason::Conflict {
            fingerprint: existing.fingerprint,
            owner_public_handle: self.directory.public_handle(&existing.owner_id).await,
            registered_at: existing.created_at,
        }
    }

    async fn within_ledger_deadline<T>(
        &self,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = self.config.ledger_timeout;
        let started = Instant::now();

        let result = match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(ProvenanceError::LedgerTimeout(deadline)),
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .observe_histogram(metric_names::LEDGER_LATENCY, started.elapsed().as_secs_f64())
                .await;
        }
        result
    }

    async fn count(&self, name: &str) {
        self.add(name, 1).await;
    }

    async fn add(&self, name: &str, value: u64) {
        if let Some(metrics) = &self.metrics {
            metrics.add_counter(name, value).await;
        }
    }

    async fn set_queue_depth(&self, depth: u64) {
        if let Some(metrics) = &self.metrics {
            metrics
                .set_gauge(metric_names::RECONCILIATION_QUEUE_DEPTH, depth)
                .await;
        }
    }
}
