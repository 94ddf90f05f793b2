//! Partitioned, policy driven windows over in-process tuple streams.
//!
//! ```
//! use stream_windows::{Windows, unpartitioned};
//!
//! let window = Windows::last_n_process_on_insert(3, unpartitioned::<i32>()).unwrap();
//! window.register_partition_processor(|tuples, _key| {
//!     assert!(tuples.len() <= 3);
//!     Ok(())
//! });
//! for i in 0..10 {
//!     window.insert(i).unwrap();
//! }
//! ```

pub mod analytics;
pub mod engine;
mod error;
pub mod scheduler;
mod window_clause_parser;
mod window_definition;
pub mod windowing;

pub use analytics::Deadtime;
pub use engine::Aggregate;
pub use error::{
    ConfigError, ProcessorError, ProcessorResult, SchedulerError, WindowError, WindowResult,
};
pub use scheduler::{ScheduledHandle, ScheduledThreadPool, Scheduler};
pub use window_clause_parser::WindowClauseParser;
pub use window_definition::WindowDefinition;
pub use windowing::{
    DefinedWindow, EvictionCause, InsertionTimeList, Partition, PartitionContext,
    PartitionGuard, PartitionedState, TupleContainer, Window, Windows, unpartitioned,
};
