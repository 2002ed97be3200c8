//! Analysis modules.
//!
//! Pure computations over an already-loaded record batch: statistics
//! aggregation and expiry notifications.

pub mod aggregator;
pub mod dates;
pub mod notifier;

pub use aggregator::*;
pub use notifier::*;
