//! REST API handlers organized by domain.

pub mod health;
pub mod ledger;
pub mod ownership;

pub use health::*;
pub use ledger::*;
pub use ownership::*;
