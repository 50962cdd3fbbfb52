//! Core traits for zonex
//!
//! The pipeline reaches its external collaborators only through these
//! interfaces.
//!
//! - [`RecordSink`]: idempotent, insert-or-ignore persistence of records
//! - [`ProgressReporter`]: throughput and ETA reporting

pub mod sink;
pub mod progress;

pub use sink::{RecordSink, RecordSinkFactory, StoreOutcome};
pub use progress::{ProgressReporter, ProgressSnapshot};
