// # zonex-core
//
// Core library for streaming second-level domain extraction from DNS zone
// files.
//
// ## Architecture Overview
//
// - **LineReassembler**: rebuilds complete lines from arbitrary byte chunks
// - **LineFilter**: classifies lines as extractable records or noise
// - **RecordParser**: turns an accepted line into a `CandidateRecord`
// - **DedupWindow**: proximity or batch-set dedup between drains
// - **RecordSink**: trait for idempotent persistence keyed on `(name, tld)`
// - **ExtractEngine**: owns one run and wires the above together
// - **SinkRegistry**: plugin-based registry for sinks
//
// ## Design Principles
//
// 1. **Streaming**: memory is bounded by the read chunk and the dedup window
// 2. **Chunk Invariance**: output never depends on where chunks split
// 3. **Plugin-Based**: sinks are registered by name, no hard-coded if-else
// 4. **Library-First**: the binary only loads config and runs a stage
// 5. **Idempotency**: the sink's unique key makes reruns safe

pub mod classifier;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod parser;
pub mod progress;
pub mod reassembler;
pub mod record;
pub mod registry;
pub mod sink;
pub mod stages;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, FilterConfig, SinkConfig, Stage, ZonexConfig};
pub use dedup::DedupPolicy;
pub use engine::{EngineEvent, ExtractEngine, RunSummary};
pub use error::{Error, Result};
pub use record::CandidateRecord;
pub use registry::SinkRegistry;
pub use sink::{FileRecordSink, MemoryRecordSink, ShardFileSink};
pub use traits::{ProgressReporter, ProgressSnapshot, RecordSink, RecordSinkFactory, StoreOutcome};
