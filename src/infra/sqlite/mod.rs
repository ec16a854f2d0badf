//! SQLite implementations for the local development fallback tier and the
//! mirror journal

mod journal;
mod proof_store;

pub use journal::*;
pub use proof_store::*;
