//! Test doubles and common utilities for pipeline contract tests
//!
//! The doubles record what the engine hands them so tests can assert on
//! behavior without a real database.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use zonex_core::error::{Error, Result};
use zonex_core::progress::SilentProgress;
use zonex_core::traits::{RecordSink, StoreOutcome};
use zonex_core::{CandidateRecord, DedupPolicy, ExtractEngine, RunSummary, ZonexConfig};

/// A sink that records every store and counts flushes
#[derive(Default)]
pub struct RecordingSink {
    keys: std::sync::Mutex<HashSet<(String, String)>>,
    stored: std::sync::Mutex<Vec<CandidateRecord>>,
    store_calls: AtomicUsize,
    flush_calls: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names stored, in the order the sink saw them
    pub fn names(&self) -> Vec<String> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    /// Names stored, sorted
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names = self.names();
        names.sort();
        names
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for RecordingSink {
    async fn store(&self, record: &CandidateRecord) -> Result<StoreOutcome> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        let key = (record.name.clone(), record.tld.clone());
        if !self.keys.lock().unwrap().insert(key) {
            return Ok(StoreOutcome::Duplicate);
        }
        self.stored.lock().unwrap().push(record.clone());
        Ok(StoreOutcome::Inserted)
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.stored.lock().unwrap().len() as u64)
    }

    fn sink_name(&self) -> &'static str {
        "recording"
    }
}

/// A sink that rejects every name starting with `prefix`
pub struct FlakySink {
    prefix: &'static str,
    inner: RecordingSink,
}

impl FlakySink {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            inner: RecordingSink::new(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.sorted_names()
    }

    pub fn flush_calls(&self) -> usize {
        self.inner.flush_calls()
    }
}

#[async_trait]
impl RecordSink for FlakySink {
    async fn store(&self, record: &CandidateRecord) -> Result<StoreOutcome> {
        if record.name.starts_with(self.prefix) {
            return Err(Error::sink_write(format!("write timeout for {}", record.name)));
        }
        self.inner.store(record).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }

    fn sink_name(&self) -> &'static str {
        "flaky"
    }
}

/// A sink whose stores never complete
#[derive(Default)]
pub struct StalledSink {
    store_calls: AtomicUsize,
    flush_calls: AtomicUsize,
}

impl StalledSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for StalledSink {
    async fn store(&self, _record: &CandidateRecord) -> Result<StoreOutcome> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(0)
    }

    fn sink_name(&self) -> &'static str {
        "stalled"
    }
}

/// Engine configuration for `.com` with the given dedup policy
pub fn com_config(policy: DedupPolicy) -> ZonexConfig {
    ZonexConfig::new("com").with_dedup_policy(policy)
}

/// A small zone file exercising every classifier rule
pub fn sample_zone() -> &'static [u8] {
    b"; comment line\n\
      $ORIGIN COM.\n\
      $TTL 900\n\
      @ IN SOA a.gtld-servers.net. nstld.verisign-grs.com. 1 1800 900 604800 86400\n\
      COM. NS a.gtld-servers.net.\n\
      alpha NS ns1.alpha.net.\n\
      alpha NS ns2.alpha.net.\n\
      \tIN A 192.0.2.1\n\
      ns1.glue A 192.0.2.53\n\
      bravo NS ns1.bravo.org.\n\
      \n\
      charlie NS ns1.charlie.io.\n\
      charlie NS ns2.charlie.io.\n\
      charlie NS ns3.charlie.io.\n\
      delta NS ns1.delta.com."
}

/// Feed `chunks` through a fresh engine into a fresh recording sink
pub async fn run_chunks(
    config: &ZonexConfig,
    chunks: &[&[u8]],
) -> (Arc<RecordingSink>, RunSummary) {
    let mut builder = tokio_test::io::Builder::new();
    let mut total = 0u64;
    for chunk in chunks {
        builder.read(chunk);
        total += chunk.len() as u64;
    }

    let sink = Arc::new(RecordingSink::new());
    let (engine, _events) =
        ExtractEngine::new(config, sink.clone(), Arc::new(SilentProgress)).unwrap();
    let summary = engine.run(builder.build(), total).await.unwrap();
    (sink, summary)
}

/// Split `data` into pieces of the given sizes, cycling through `sizes`
pub fn split_cycling<'a>(data: &'a [u8], sizes: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut rest = data;
    let mut i = 0;
    while !rest.is_empty() {
        let size = sizes[i % sizes.len()].clamp(1, rest.len());
        let (head, tail) = rest.split_at(size);
        chunks.push(head);
        rest = tail;
        i += 1;
    }
    chunks
}
