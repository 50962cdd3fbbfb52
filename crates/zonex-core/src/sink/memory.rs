// # Memory Record Sink
//
// In-memory implementation of RecordSink.
//
// ## Purpose
//
// A fast sink with the same insert-or-ignore contract as the persistent
// ones. Useful for tests, dry runs and counting how many distinct names a
// zone file holds without writing anything.
//
// ## Crash Behavior
//
// Everything is lost when the process exits.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::SinkConfig;
use crate::record::CandidateRecord;
use crate::traits::sink::{RecordSink, RecordSinkFactory, StoreOutcome};

/// In-memory sink unique on `(name, tld)`
///
/// Records are kept in insertion order.
///
/// # Example
///
/// ```rust,no_run
/// use zonex_core::sink::MemoryRecordSink;
/// use zonex_core::{CandidateRecord, RecordSink, StoreOutcome};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let sink = MemoryRecordSink::new();
///     let record = CandidateRecord::new("com", "example");
///
///     assert_eq!(sink.store(&record).await?, StoreOutcome::Inserted);
///     assert_eq!(sink.store(&record).await?, StoreOutcome::Duplicate);
///     assert_eq!(sink.len().await, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSink {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    keys: HashSet<(String, String)>,
    records: Vec<CandidateRecord>,
}

impl MemoryRecordSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Whether the sink is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// Whether a record with this key is stored
    pub async fn contains(&self, name: &str, tld: &str) -> bool {
        self.inner
            .read()
            .await
            .keys
            .contains(&(name.to_string(), tld.to_string()))
    }

    /// Stored records in insertion order
    pub async fn records(&self) -> Vec<CandidateRecord> {
        self.inner.read().await.records.clone()
    }

    /// Remove every record
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.keys.clear();
        guard.records.clear();
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn store(&self, record: &CandidateRecord) -> Result<StoreOutcome, Error> {
        let mut guard = self.inner.write().await;
        if !guard
            .keys
            .insert((record.name.clone(), record.tld.clone()))
        {
            return Ok(StoreOutcome::Duplicate);
        }
        guard.records.push(record.clone());
        Ok(StoreOutcome::Inserted)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing is buffered
        Ok(())
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.len().await as u64)
    }

    fn sink_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for the `memory` sink type
#[derive(Debug, Default)]
pub struct MemoryRecordSinkFactory;

#[async_trait]
impl RecordSinkFactory for MemoryRecordSinkFactory {
    async fn create(&self, config: &SinkConfig) -> Result<Arc<dyn RecordSink>, Error> {
        match config {
            SinkConfig::Memory => Ok(Arc::new(MemoryRecordSink::new())),
            other => Err(Error::config(format!(
                "memory sink factory cannot build a '{}' sink",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_insert_or_ignore() {
        let sink = MemoryRecordSink::new();
        assert!(sink.is_empty().await);

        let record = CandidateRecord::new("com", "example");
        assert_eq!(sink.store(&record).await.unwrap(), StoreOutcome::Inserted);
        assert_eq!(sink.store(&record).await.unwrap(), StoreOutcome::Duplicate);

        assert_eq!(sink.count().await.unwrap(), 1);
        assert!(sink.contains("example", "com").await);
    }

    #[tokio::test]
    async fn test_memory_sink_key_includes_tld() {
        let sink = MemoryRecordSink::new();
        sink.store(&CandidateRecord::new("com", "example")).await.unwrap();
        let outcome = sink
            .store(&CandidateRecord::new("net", "example"))
            .await
            .unwrap();
        assert_eq!(outcome, StoreOutcome::Inserted);
        assert_eq!(sink.len().await, 2);
    }

    #[tokio::test]
    async fn test_memory_sink_preserves_order() {
        let sink = MemoryRecordSink::new();
        for name in ["b", "a", "c", "a"] {
            sink.store(&CandidateRecord::new("com", name)).await.unwrap();
        }
        let names: Vec<String> = sink.records().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);

        sink.clear().await;
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_factory_rejects_other_types() {
        let factory = MemoryRecordSinkFactory;
        assert!(factory.create(&SinkConfig::Memory).await.is_ok());
        let err = factory
            .create(&SinkConfig::File {
                path: "x.json".to_string(),
            })
            .await;
        assert!(err.is_err());
    }
}
