//! Run counters and progress reporters

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

use crate::traits::progress::{ProgressReporter, ProgressSnapshot};

/// Monotonic counters for one run
///
/// Shared through `Arc` with in-flight sink writes, hence atomics.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    bytes_consumed: AtomicU64,
    lines_processed: AtomicU64,
    duplicates_dropped: AtomicU64,
    malformed_lines: AtomicU64,
    records_forwarded: AtomicU64,
    records_inserted: AtomicU64,
    sink_duplicates: AtomicU64,
    sink_failures: AtomicU64,
    invariant_violations: AtomicU64,
}

impl ProgressCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_consumed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_lines(&self, n: u64) {
        self.lines_processed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_duplicates(&self, n: u64) {
        self.duplicates_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forwarded(&self) {
        self.records_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_inserted(&self) {
        self.records_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sink_duplicate(&self) {
        self.sink_duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_invariant_violation(&self) {
        self.invariant_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes consumed so far
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed.load(Ordering::Relaxed)
    }

    /// Copy the counters into a snapshot
    pub fn snapshot(&self, total_bytes: u64, elapsed: Duration) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_consumed: self.bytes_consumed.load(Ordering::Relaxed),
            total_bytes,
            elapsed,
            lines_processed: self.lines_processed.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
            records_inserted: self.records_inserted.load(Ordering::Relaxed),
            sink_duplicates: self.sink_duplicates.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            invariant_violations: self.invariant_violations.load(Ordering::Relaxed),
        }
    }
}

/// Reporter that writes throttled `info!` lines
pub struct LogProgressReporter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl LogProgressReporter {
    /// Log at most once per `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    fn due(&self) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return false;
        };
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl ProgressReporter for LogProgressReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        if !self.due() {
            return;
        }
        let (eth, etm) = snapshot.eta_hours_minutes().unwrap_or((0, 0));
        let percent = format!("{:.1}", snapshot.percent());
        let eta = format!("{}h{:02}m", eth, etm);
        info!(
            percent = %percent,
            eta = %eta,
            lines = snapshot.lines_processed,
            dupes = snapshot.duplicates_dropped,
            "running"
        );
    }

    fn finish(&self, snapshot: &ProgressSnapshot) {
        info!(
            bytes = snapshot.bytes_consumed,
            lines = snapshot.lines_processed,
            dupes = snapshot.duplicates_dropped,
            malformed = snapshot.malformed_lines,
            forwarded = snapshot.records_forwarded,
            inserted = snapshot.records_inserted,
            sink_duplicates = snapshot.sink_duplicates,
            sink_failures = snapshot.sink_failures,
            elapsed_secs = snapshot.elapsed.as_secs_f64(),
            lines_per_sec = snapshot.lines_per_sec().round(),
            "finished"
        );
    }
}

/// Reporter that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn report(&self, _snapshot: &ProgressSnapshot) {}

    fn finish(&self, _snapshot: &ProgressSnapshot) {}
}
