// # Progress Reporter Trait
//
// The engine hands a snapshot of its counters to the reporter at every chunk
// boundary. Rendering (log lines, bars) is up to the implementation.

use serde::Serialize;
use std::time::Duration;

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Bytes read from the source so far
    pub bytes_consumed: u64,
    /// Expected total bytes (0 if unknown)
    pub total_bytes: u64,
    /// Wall time since the run started
    pub elapsed: Duration,
    /// Complete lines seen
    pub lines_processed: u64,
    /// Candidates removed by pipeline dedup
    pub duplicates_dropped: u64,
    /// Lines rejected by the classifier
    pub malformed_lines: u64,
    /// Records handed to the sink
    pub records_forwarded: u64,
    /// Stores that inserted a new record
    pub records_inserted: u64,
    /// Stores absorbed as duplicate keys
    pub sink_duplicates: u64,
    /// Stores that failed
    pub sink_failures: u64,
    /// Accepted lines that parsed to nothing
    pub invariant_violations: u64,
}

impl ProgressSnapshot {
    /// Percent of the input consumed, in `0.0..=100.0`
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.bytes_consumed as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    /// Estimated time remaining by linear extrapolation
    ///
    /// `elapsed * (total / consumed - 1)`, zero once everything is consumed,
    /// `None` before the first byte.
    pub fn eta(&self) -> Option<Duration> {
        if self.bytes_consumed >= self.total_bytes {
            return Some(Duration::ZERO);
        }
        if self.bytes_consumed == 0 {
            return None;
        }
        let ratio = self.total_bytes as f64 / self.bytes_consumed as f64 - 1.0;
        Some(self.elapsed.mul_f64(ratio))
    }

    /// ETA split into whole hours and remaining minutes
    pub fn eta_hours_minutes(&self) -> Option<(u64, u64)> {
        self.eta().map(|eta| {
            let minutes = eta.as_secs() / 60;
            (minutes / 60, minutes % 60)
        })
    }

    /// Lines per second over the whole run
    pub fn lines_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.lines_processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Trait for progress reporter implementations
///
/// Called synchronously from the processing loop, so implementations must be
/// cheap and must never block.
pub trait ProgressReporter: Send + Sync {
    /// Report progress after a chunk has been processed
    fn report(&self, snapshot: &ProgressSnapshot);

    /// Report the final state of a run
    fn finish(&self, snapshot: &ProgressSnapshot);
}
