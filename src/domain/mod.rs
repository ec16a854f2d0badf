//! Domain models for the provenance registry
//!
//! Proof records, ownership projections and registration outcomes.

mod ownership;
mod proof;
mod types;

pub use ownership::*;
pub use proof::*;
pub use types::*;
