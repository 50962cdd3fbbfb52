//! Bounded concurrent sink writes
//!
//! Stores are issued without waiting for earlier ones to acknowledge, but at
//! most `max_in_flight` are outstanding at once. Each store is independently
//! idempotent through the sink's unique key, so no ordering is kept between
//! them. The run waits for [`WriteDispatcher::drain`] before it completes.
//!
//! Waiting for a permit is a suspension point, so
//! [`WriteDispatcher::dispatch_or_shutdown`] gives up on the record once the
//! shutdown signal is set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{error, trace, warn};

use crate::engine::shutdown_requested;
use crate::error::{Error, Result};
use crate::progress::ProgressCounters;
use crate::record::CandidateRecord;
use crate::traits::sink::{RecordSink, StoreOutcome};

/// Issues sink writes with a concurrency cap
pub struct WriteDispatcher {
    sink: Arc<dyn RecordSink>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    counters: Arc<ProgressCounters>,
}

impl WriteDispatcher {
    /// Create a dispatcher allowing `max_in_flight` concurrent stores
    pub fn new(
        sink: Arc<dyn RecordSink>,
        max_in_flight: usize,
        counters: Arc<ProgressCounters>,
    ) -> Self {
        Self {
            sink,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: JoinSet::new(),
            counters,
        }
    }

    /// Sink the dispatcher writes to
    pub fn sink(&self) -> &Arc<dyn RecordSink> {
        &self.sink
    }

    /// Stores not yet reaped
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Hand a record to the sink
    ///
    /// Suspends only while the in-flight cap is reached.
    pub async fn dispatch(&mut self, record: CandidateRecord) -> Result<()> {
        let permit = self.acquire().await?;
        self.spawn_store(permit, record);
        Ok(())
    }

    /// Hand a record to the sink unless shutdown is signalled first
    ///
    /// A free permit always wins over the signal. Returns `false` when the
    /// signal arrived while the cap was reached; the record is not forwarded.
    pub async fn dispatch_or_shutdown(
        &mut self,
        record: CandidateRecord,
        shutdown: &mut Option<watch::Receiver<bool>>,
    ) -> Result<bool> {
        let permit = tokio::select! {
            biased;
            permit = self.acquire() => permit?,
            _ = shutdown_requested(shutdown) => return Ok(false),
        };
        self.spawn_store(permit, record);
        Ok(true)
    }

    fn acquire(&self) -> impl Future<Output = Result<OwnedSemaphorePermit>> + use<> {
        let permits = Arc::clone(&self.permits);
        async move {
            permits
                .acquire_owned()
                .await
                .map_err(|_| Error::Other("write dispatcher closed".to_string()))
        }
    }

    fn spawn_store(&mut self, permit: OwnedSemaphorePermit, record: CandidateRecord) {
        self.reap();

        self.counters.inc_forwarded();
        let sink = Arc::clone(&self.sink);
        let counters = Arc::clone(&self.counters);

        self.tasks.spawn(async move {
            let _permit = permit;
            match sink.store(&record).await {
                Ok(StoreOutcome::Inserted) => counters.inc_inserted(),
                Ok(StoreOutcome::Duplicate) | Err(Error::DuplicateKey(_)) => {
                    trace!("{} already stored", record.name);
                    counters.inc_sink_duplicate();
                }
                Err(e) => {
                    warn!("Failed to store {}.{}: {}", record.name, record.tld, e);
                    counters.inc_sink_failure();
                }
            }
        });
    }

    /// Wait for every in-flight store to finish
    pub async fn drain(&mut self) {
        while let Some(res) = self.tasks.join_next().await {
            self.record_join(res);
        }
    }

    /// Cancel in-flight stores and reap them
    pub async fn abort(&mut self) {
        self.tasks.abort_all();
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = &res {
                if e.is_cancelled() {
                    self.counters.inc_sink_failure();
                    continue;
                }
            }
            self.record_join(res);
        }
    }

    /// Give in-flight stores `grace` to finish, then abort the rest
    pub async fn settle(&mut self, grace: Duration) {
        if tokio::time::timeout(grace, self.drain()).await.is_err() {
            warn!(
                "{} writes still in flight after {:?}, aborting",
                self.in_flight(),
                grace
            );
            self.abort().await;
        }
    }

    fn reap(&mut self) {
        while let Some(res) = self.tasks.try_join_next() {
            self.record_join(res);
        }
    }

    fn record_join(&self, res: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = res {
            error!("Sink write task failed: {}", e);
            self.counters.inc_sink_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryRecordSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FailingSink;

    #[async_trait]
    impl RecordSink for FailingSink {
        async fn store(&self, record: &CandidateRecord) -> Result<StoreOutcome> {
            if record.name.starts_with('x') {
                return Err(Error::sink_write("connection reset"));
            }
            if record.name.starts_with('d') {
                return Err(Error::duplicate_key(record.name.clone()));
            }
            Ok(StoreOutcome::Inserted)
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        async fn count(&self) -> Result<u64> {
            Ok(0)
        }

        fn sink_name(&self) -> &'static str {
            "failing"
        }
    }

    struct SlowSink {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RecordSink for SlowSink {
        async fn store(&self, _record: &CandidateRecord) -> Result<StoreOutcome> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(StoreOutcome::Inserted)
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        async fn count(&self) -> Result<u64> {
            Ok(0)
        }

        fn sink_name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_duplicates_absorbed_and_failures_counted() {
        let counters = Arc::new(ProgressCounters::new());
        let mut dispatcher = WriteDispatcher::new(Arc::new(FailingSink), 4, counters.clone());

        for name in ["a", "xbad", "dup", "b"] {
            dispatcher
                .dispatch(CandidateRecord::new("com", name))
                .await
                .unwrap();
        }
        dispatcher.drain().await;

        let s = counters.snapshot(0, Duration::ZERO);
        assert_eq!(s.records_forwarded, 4);
        assert_eq!(s.records_inserted, 2);
        assert_eq!(s.sink_duplicates, 1);
        assert_eq!(s.sink_failures, 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_cap_is_respected() {
        let sink = Arc::new(SlowSink {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let counters = Arc::new(ProgressCounters::new());
        let mut dispatcher = WriteDispatcher::new(sink.clone(), 3, counters.clone());

        for i in 0..20 {
            dispatcher
                .dispatch(CandidateRecord::new("com", format!("n{}", i)))
                .await
                .unwrap();
        }
        dispatcher.drain().await;

        assert!(sink.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(counters.snapshot(0, Duration::ZERO).records_inserted, 20);
    }

    struct StalledSink;

    #[async_trait]
    impl RecordSink for StalledSink {
        async fn store(&self, _record: &CandidateRecord) -> Result<StoreOutcome> {
            std::future::pending().await
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        async fn count(&self) -> Result<u64> {
            Ok(0)
        }

        fn sink_name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_permit_wait() {
        let counters = Arc::new(ProgressCounters::new());
        let mut dispatcher = WriteDispatcher::new(Arc::new(StalledSink), 1, counters.clone());
        let (tx, rx) = watch::channel(false);
        let mut shutdown = Some(rx);

        let first = dispatcher
            .dispatch_or_shutdown(CandidateRecord::new("com", "a"), &mut shutdown)
            .await
            .unwrap();
        assert!(first);

        tx.send(true).unwrap();
        let second = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.dispatch_or_shutdown(CandidateRecord::new("com", "b"), &mut shutdown),
        )
        .await
        .expect("permit wait should observe the shutdown signal")
        .unwrap();
        assert!(!second);

        dispatcher.settle(Duration::from_millis(10)).await;
        let s = counters.snapshot(0, Duration::ZERO);
        assert_eq!(s.records_forwarded, 1);
        assert_eq!(s.sink_failures, 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_free_permit_wins_over_shutdown() {
        let sink = Arc::new(MemoryRecordSink::new());
        let counters = Arc::new(ProgressCounters::new());
        let mut dispatcher = WriteDispatcher::new(sink.clone(), 4, counters);
        let (_tx, rx) = watch::channel(true);
        let mut shutdown = Some(rx);

        let sent = dispatcher
            .dispatch_or_shutdown(CandidateRecord::new("com", "a"), &mut shutdown)
            .await
            .unwrap();
        assert!(sent);

        dispatcher.settle(Duration::from_secs(5)).await;
        assert_eq!(sink.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_sink_duplicates_through_dispatcher() {
        let sink = Arc::new(MemoryRecordSink::new());
        let counters = Arc::new(ProgressCounters::new());
        let mut dispatcher = WriteDispatcher::new(sink.clone(), 8, counters.clone());

        for name in ["a", "a", "a"] {
            dispatcher
                .dispatch(CandidateRecord::new("com", name))
                .await
                .unwrap();
        }
        dispatcher.drain().await;

        assert_eq!(sink.len().await, 1);
        let s = counters.snapshot(0, Duration::ZERO);
        assert_eq!(s.records_inserted, 1);
        assert_eq!(s.sink_duplicates, 2);
    }
}
