//! Infrastructure layer for the provenance registry
//!
//! Contains trait definitions and implementations for:
//! - Proof tiers (PostgreSQL primary, SQLite and in-memory secondary)
//! - Tiered store with environment-gated fallback
//! - Error taxonomy and driver error classification
//! - Retry with backoff for mirror writes
//! - Mirror journal for ledger-registered proofs not yet stored

mod error;
mod memory;
mod policy;
pub mod postgres;
mod reconcile;
mod retry;
pub mod sqlite;
mod tiered;
mod traits;

pub use error::*;
pub use memory::InMemoryProofStore;
pub use policy::{Environment, StoragePolicy};
pub use postgres::PgProofStore;
pub use reconcile::{MemoryMirrorJournal, ReconcileReport, UnmirroredProof};
pub use retry::{Retry, RetryConfig, RetryResult};
pub use sqlite::{SqliteMirrorJournal, SqliteProofStore};
pub use tiered::{Lookup, SaveOutcome, TierHealth, TieredProofStore};
pub use traits::*;
