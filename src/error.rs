//! Error types for the windowing engine
//!
//! Configuration problems surface when a window is built or first used,
//! processor failures are handed back to whoever drove the insert or timer.

use std::time::Duration;
use thiserror::Error;

/// Error returned by a partition processor.
pub type ProcessorError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by partition processors.
pub type ProcessorResult = Result<(), ProcessorError>;

/// Errors raised by windows and their policies
#[derive(Error, Debug)]
pub enum WindowError {
    /// A count based window was configured with a zero size
    #[error("invalid window size: {size}, must be greater than 0")]
    InvalidSize { size: usize },

    /// A time based window was configured with a zero duration
    #[error("invalid window duration: {duration:?}, must be greater than 0")]
    InvalidDuration { duration: Duration },

    /// A time policy needed the scheduler before one was registered
    #[error("no scheduler registered, time based policies require register_scheduler before insert")]
    SchedulerNotRegistered,

    /// `register_scheduler` was called more than once
    #[error("a scheduler is already registered for this window")]
    SchedulerAlreadyRegistered,

    /// The scheduler refused a timer
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// A registered partition processor failed
    #[error("partition processor failed: {0}")]
    Processor(#[source] ProcessorError),
}

/// Errors raised by a [`crate::Scheduler`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler has been shut down
    #[error("scheduler has been shut down")]
    Shutdown,

    /// Fixed rate tasks need a non-zero period
    #[error("invalid period: {period:?}, must be greater than 0")]
    InvalidPeriod { period: Duration },
}

/// Errors raised while parsing a textual window clause
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The clause did not match any known window form
    #[error("malformed window clause: {clause:?}")]
    Malformed { clause: String },

    /// A number in the clause could not be used
    #[error("invalid value {value:?} in window clause: {reason}")]
    InvalidValue { value: String, reason: String },

    /// The time unit is not recognised
    #[error("unknown time unit: {unit:?}")]
    UnknownUnit { unit: String },
}

pub type WindowResult<T> = Result<T, WindowError>;
