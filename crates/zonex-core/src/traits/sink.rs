// # Record Sink Trait
//
// Defines the persistence boundary of the pipeline.
//
// ## Purpose
//
// A sink stores extracted domain records keyed on `(name, tld)` with
// insert-or-ignore semantics. Neither pipeline dedup policy is global across
// a file, several shards or several runs, so the sink's uniqueness constraint
// is the correctness backstop.
//
// ## Implementations
//
// - In-memory: `MemoryRecordSink`
// - JSON document file: `FileRecordSink`
// - Per-first-character shard files: `ShardFileSink`
// - MongoDB: `zonex-sink-mongodb` crate
//
// ## Usage
//
// ```rust,ignore
// use zonex_core::{CandidateRecord, RecordSink, StoreOutcome};
//
// let sink = /* RecordSink implementation */;
// match sink.store(&CandidateRecord::new("com", "example")).await? {
//     StoreOutcome::Inserted => {}
//     StoreOutcome::Duplicate => {} // already stored, not an error
// }
// sink.flush().await?;
// ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::SinkConfig;
use crate::record::CandidateRecord;

/// Outcome of a single store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Record was new and has been stored
    Inserted,
    /// A record with the same key already exists (no-op)
    Duplicate,
}

/// Trait for record sink implementations
///
/// Implementations must be thread-safe: the write dispatcher issues several
/// stores concurrently without ordering between them.
///
/// ## Contract
///
/// - A duplicate key is `Ok(StoreOutcome::Duplicate)`, never an error
/// - Any other failure is `Err`; the pipeline logs it and moves on
/// - `flush()` must persist everything accepted so far
/// - Sinks do not retry; a failed store is lost
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Store a record if its key is not present
    ///
    /// # Returns
    ///
    /// - `Ok(StoreOutcome::Inserted)`: record stored
    /// - `Ok(StoreOutcome::Duplicate)`: key already present
    /// - `Err(Error)`: storage failure
    async fn store(&self, record: &CandidateRecord) -> Result<StoreOutcome, crate::Error>;

    /// Persist any pending writes
    async fn flush(&self) -> Result<(), crate::Error>;

    /// Number of records held by the sink
    async fn count(&self) -> Result<u64, crate::Error>;

    /// Short name for logs
    fn sink_name(&self) -> &'static str;
}

/// Helper trait for constructing sinks from configuration
///
/// Creation is async because remote sinks connect and prepare indexes.
#[async_trait]
pub trait RecordSinkFactory: Send + Sync {
    /// Create a RecordSink instance from configuration
    async fn create(&self, config: &SinkConfig) -> Result<Arc<dyn RecordSink>, crate::Error>;
}
