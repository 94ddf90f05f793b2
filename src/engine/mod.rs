//! Adapters connecting windows to downstream consumers.

mod aggregate;

pub use aggregate::Aggregate;
