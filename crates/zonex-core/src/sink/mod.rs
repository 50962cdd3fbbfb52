// # Record Sink Implementations
//
// This module provides implementations of the RecordSink trait for
// different persistence strategies.

pub mod file;
pub mod memory;
pub mod shard;

pub use file::{FileRecordSink, FileRecordSinkFactory};
pub use memory::{MemoryRecordSink, MemoryRecordSinkFactory};
pub use shard::{ShardFileSink, list_shards};
