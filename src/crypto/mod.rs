//! Cryptographic utilities for the provenance registry
//!
//! Provides:
//! - Content fingerprinting (SHA-256, hex encoded)

mod hash;

pub use hash::*;
