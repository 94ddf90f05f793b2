//! Stream analytics built on the windowing primitives.

mod deadtime;

pub use deadtime::Deadtime;
