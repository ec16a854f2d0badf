//! Provenance Registry Library
//!
//! Content ownership verification backed by ledger-anchored proofs and
//! tiered proof persistence.
//!
//! ## Modules
//!
//! - [`domain`] - Proof records, ownership results and registration outcomes
//! - [`crypto`] - Content fingerprinting
//! - [`infra`] - Proof tiers (PostgreSQL, SQLite, in-memory), storage policy, retry
//! - [`ledger`] - Ledger adapters (EVM registry contract, in-memory)
//! - [`resolver`] - Ownership resolution and proof registration
//! - [`metrics`] - Counters, gauges and histograms
//! - [`telemetry`] - Distributed tracing and OpenTelemetry integration
//! - [`api`] - REST API routes

pub mod api;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod ledger;
pub mod metrics;
pub mod migrations;
pub mod resolver;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use crypto::{compute_fingerprint, ContentFingerprint};
pub use domain::{
    MirrorStatus, OwnerId, OwnershipQueryResult, ProofRecord, ProofStatus, Registration,
    RegistrationOutcome, RejectionReason, StorageTier,
};
pub use infra::{ProvenanceError, Result, StoragePolicy, TieredProofStore};
pub use resolver::{OwnershipResolver, RegisterRequest, ResolverConfig};
