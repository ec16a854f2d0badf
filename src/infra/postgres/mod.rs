//! PostgreSQL implementations for the primary proof tier

mod proof_store;

pub use proof_store::*;
