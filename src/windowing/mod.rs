//! Partitioned windows over tuple streams.
//!
//! A [`Window`] keeps, for every partition key, a bounded recent history of
//! tuples and invokes the registered processors at moments chosen by its
//! policies: on insert, on eviction or on a timer. Count and time based
//! sliding and batch windows are built by [`Windows`] from the policies in
//! [`policies`].
//!
//! ```text
//! insert(tuple)
//!   -> key function -> partition (created on first use, then locked)
//!   -> insertion policy -> contents policy -> eviction determiner
//!   -> trigger policy -> processors(&[T], &K)
//! ```

mod container;
mod partition;
mod partitioned_state;
pub mod policies;
mod window;
mod windows;

pub use container::{InsertionTimeList, TupleContainer};
pub use partition::{Partition, PartitionContext, PartitionGuard};
pub use partitioned_state::PartitionedState;
pub use policies::EvictionCause;
pub use window::{ContainerFactory, KeyFunction, PartitionProcessor, Window};
pub use windows::{DefinedWindow, Windows, unpartitioned};
