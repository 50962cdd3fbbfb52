//! Extraction engine
//!
//! The ExtractEngine owns everything one run needs:
//! - the line reassembler and its open line
//! - the classifier and parser
//! - the dedup window
//! - the write dispatcher and run counters
//!
//! There is no process-wide state, so several engines can run in one
//! process.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  chunk   ┌─────────────┐  line   ┌────────────┐
//! │ AsyncRead  │────────▶│ Reassembler │───────▶│ LineFilter │
//! └────────────┘          └─────────────┘         └────────────┘
//!                                                        │ accepted
//!                                                        ▼
//! ┌────────────┐  store   ┌─────────────┐ record  ┌────────────┐
//! │ RecordSink │◀────────│ Dispatcher  │◀───────│ DedupWindow│◀── RecordParser
//! └────────────┘          └─────────────┘         └────────────┘
//! ```
//!
//! ## Chunk Flow
//!
//! 1. Await the next chunk (the only suspension point besides write permits)
//! 2. Fold it into the reassembler; only completed lines come out
//! 3. Classify, parse and push each line into the dedup window
//! 4. Drain the window once it reaches the buffer threshold, keeping the
//!    most recent candidate back
//! 5. Dispatch drained records without waiting for acknowledgments
//! 6. Report progress
//!
//! At end of stream the open line is flushed, the window is drained in
//! full, in-flight writes are awaited and the sink is flushed.
//!
//! ## Shutdown
//!
//! The signal is observed at both suspension points. Once it is set, the
//! open line is dropped and closed lines are forwarded while write permits
//! are free. In-flight writes get `shutdown_grace_ms` to finish before they
//! are aborted, and the sink is flushed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::classifier::LineFilter;
use crate::config::ZonexConfig;
use crate::dedup::{DedupPolicy, DedupWindow};
use crate::dispatch::WriteDispatcher;
use crate::error::{Error, Result};
use crate::parser::RecordParser;
use crate::progress::ProgressCounters;
use crate::reassembler::LineReassembler;
use crate::traits::progress::{ProgressReporter, ProgressSnapshot};
use crate::traits::sink::RecordSink;

/// Events emitted by the ExtractEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Run started
    Started {
        total_bytes: u64,
        policy: DedupPolicy,
    },

    /// A dedup window was drained to the dispatcher
    WindowDrained {
        forwarded: usize,
        duplicates: u64,
    },

    /// Source exhausted and all writes settled
    Finished {
        lines_processed: u64,
        records_forwarded: u64,
    },

    /// Run stopped by the shutdown signal
    Cancelled {
        bytes_consumed: u64,
    },
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Wall-clock start
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Wall-clock end
    pub finished_at: chrono::DateTime<chrono::Utc>,
    /// Counters at the end of the run
    pub snapshot: ProgressSnapshot,
    /// Whether the shutdown signal stopped the run early
    pub cancelled: bool,
}

/// Streaming zone file extraction pipeline
///
/// ## Lifecycle
///
/// 1. Create with [`ExtractEngine::new()`]
/// 2. Consume with [`ExtractEngine::run()`] or [`ExtractEngine::run_file()`]
///
/// An engine is built for exactly one run.
pub struct ExtractEngine {
    filter: LineFilter,
    parser: RecordParser,
    reassembler: LineReassembler,
    window: DedupWindow,
    dispatcher: WriteDispatcher,
    counters: Arc<ProgressCounters>,
    reporter: Arc<dyn ProgressReporter>,
    read_chunk_size: usize,
    buffer_full_threshold: usize,
    shutdown_grace: Duration,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ExtractEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `config`: run configuration (TLD, filter tables, engine settings)
    /// - `sink`: where records go
    /// - `reporter`: progress reporter
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver)
    pub fn new(
        config: &ZonexConfig,
        sink: Arc<dyn RecordSink>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        if config.tld.is_empty() {
            return Err(Error::config("TLD cannot be empty"));
        }
        config.engine.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        let counters = Arc::new(ProgressCounters::new());

        let engine = Self {
            filter: LineFilter::from_config(&config.filter, &config.tld),
            parser: RecordParser::new(config.tld.clone()),
            reassembler: LineReassembler::new(),
            window: DedupWindow::new(config.engine.dedup_policy),
            dispatcher: WriteDispatcher::new(
                sink,
                config.engine.max_in_flight_writes,
                Arc::clone(&counters),
            ),
            counters,
            reporter,
            read_chunk_size: config.engine.read_chunk_size,
            buffer_full_threshold: config.engine.chunk_buffer_full_threshold,
            shutdown_grace: Duration::from_millis(config.engine.shutdown_grace_ms),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Counters shared with in-flight writes
    pub fn counters(&self) -> Arc<ProgressCounters> {
        Arc::clone(&self.counters)
    }

    /// Run the pipeline over a zone file
    pub async fn run_file(
        self,
        path: impl AsRef<std::path::Path>,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<RunSummary> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(Error::SourceRead)?;
        let total_bytes = file.metadata().await.map_err(Error::SourceRead)?.len();
        info!("Extracting {} ({} bytes)", path.display(), total_bytes);
        self.run_with_shutdown(file, total_bytes, shutdown).await
    }

    /// Run the pipeline until the reader is exhausted
    ///
    /// `total_bytes` is only used for progress; pass 0 if unknown.
    pub async fn run<R>(self, reader: R, total_bytes: u64) -> Result<RunSummary>
    where
        R: AsyncRead + Unpin,
    {
        self.run_with_shutdown(reader, total_bytes, None).await
    }

    /// Run the pipeline, stopping early when `shutdown` flips to `true`
    ///
    /// The signal is honored while awaiting the next chunk, while waiting for
    /// a write permit and while waiting for in-flight writes at the end of
    /// the run.
    pub async fn run_with_shutdown<R>(
        mut self,
        mut reader: R,
        total_bytes: u64,
        mut shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<RunSummary>
    where
        R: AsyncRead + Unpin,
    {
        let started_at = chrono::Utc::now();
        let start = Instant::now();
        self.emit_event(EngineEvent::Started {
            total_bytes,
            policy: self.window.policy(),
        });
        debug!(
            "Engine started: policy {:?}, chunk {} bytes, window {} records, sink {}",
            self.window.policy(),
            self.read_chunk_size,
            self.buffer_full_threshold,
            self.dispatcher.sink().sink_name()
        );

        let mut buf = vec![0u8; self.read_chunk_size];
        let mut cancelled = false;

        loop {
            let read = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    cancelled = true;
                    break;
                }
                read = reader.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    error!("Source read failed after {} bytes: {}", self.counters.bytes_consumed(), e);
                    self.dispatcher.drain().await;
                    if let Err(flush_err) = self.dispatcher.sink().flush().await {
                        error!("Failed to flush sink after read error: {}", flush_err);
                    }
                    return Err(Error::SourceRead(e));
                }
            };

            self.counters.add_bytes(n as u64);
            if !self.process_chunk(n, &buf, &mut shutdown).await? {
                cancelled = true;
                break;
            }
            self.reporter
                .report(&self.counters.snapshot(total_bytes, start.elapsed()));
        }

        if cancelled {
            info!(
                "Shutdown signal received after {} bytes, dropping the open line",
                self.counters.bytes_consumed()
            );
            // closed lines already in the window are complete records
            self.drain_window(true, &mut shutdown).await?;
        } else {
            // the source is exhausted, so the open line is final
            if let Some(line) = self.reassembler.flush() {
                self.ingest_line(&line);
            }
            if !self.drain_window(true, &mut shutdown).await? {
                cancelled = true;
            } else {
                tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut shutdown) => {
                        info!("Shutdown signal received while waiting for writes");
                        cancelled = true;
                    }
                    _ = self.dispatcher.drain() => {}
                }
            }
        }

        if cancelled {
            self.dispatcher.settle(self.shutdown_grace).await;
        }
        self.dispatcher.sink().flush().await?;

        let snapshot = self.counters.snapshot(total_bytes, start.elapsed());
        self.reporter.finish(&snapshot);
        if cancelled {
            self.emit_event(EngineEvent::Cancelled {
                bytes_consumed: snapshot.bytes_consumed,
            });
        } else {
            self.emit_event(EngineEvent::Finished {
                lines_processed: snapshot.lines_processed,
                records_forwarded: snapshot.records_forwarded,
            });
        }

        Ok(RunSummary {
            started_at,
            finished_at: chrono::Utc::now(),
            snapshot,
            cancelled,
        })
    }

    /// Returns `false` if shutdown interrupted the drain
    async fn process_chunk(
        &mut self,
        n: usize,
        buf: &[u8],
        shutdown: &mut Option<watch::Receiver<bool>>,
    ) -> Result<bool> {
        let lines = self.reassembler.feed(&buf[..n]);
        for line in &lines {
            self.ingest_line(line);
        }

        if self.window.pending_len() >= self.buffer_full_threshold {
            return self.drain_window(false, shutdown).await;
        }
        Ok(true)
    }

    /// Classify, parse and queue one complete line
    fn ingest_line(&mut self, line: &str) {
        self.counters.add_lines(1);

        if let Err(reason) = self.filter.classify(line) {
            trace!("Dropped line {:?}: {:?}", line, reason);
            self.counters.inc_malformed();
            return;
        }

        match self.parser.parse(line) {
            Ok(record) => {
                self.window.push(record);
            }
            Err(e) => {
                error!("Classifier and parser disagree: {}", e);
                self.counters.inc_invariant_violation();
            }
        }
    }

    /// Drain the window into the dispatcher
    ///
    /// Returns `false` if shutdown arrived while waiting for a write permit;
    /// the records not yet dispatched are dropped.
    async fn drain_window(
        &mut self,
        stream_exhausted: bool,
        shutdown: &mut Option<watch::Receiver<bool>>,
    ) -> Result<bool> {
        let drained = self.window.drain(stream_exhausted);
        self.counters.add_duplicates(drained.duplicates);

        let forwarded = drained.records.len();
        debug!(
            "Window drained: {} forwarded, {} duplicates, {} retained",
            forwarded,
            drained.duplicates,
            self.window.pending_len()
        );
        self.emit_event(EngineEvent::WindowDrained {
            forwarded,
            duplicates: drained.duplicates,
        });

        for (sent, record) in drained.records.into_iter().enumerate() {
            if !self.dispatcher.dispatch_or_shutdown(record, shutdown).await? {
                warn!(
                    "Shutdown while waiting for a write permit, {} drained records not forwarded",
                    forwarded - sent
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Emit an engine event, dropping it if the channel is full
    fn emit_event(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Resolves once the shutdown flag is set; never resolves without a signal
///
/// A dropped sender without a signal is not a shutdown.
pub(crate) async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
