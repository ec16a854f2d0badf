//! Ledger adapters
//!
//! Implementations of [`crate::infra::LedgerClient`]:
//! - [`EvmLedgerClient`] records proofs on an EVM registry contract
//! - [`MemoryLedger`] is a process-local stand-in for development and tests

mod evm;
mod memory;

pub use evm::{EvmLedgerClient, LedgerConfig};
pub use memory::MemoryLedger;
