//! Pipeline stages
//!
//! A zone file can go straight into a sink (`direct`) or through the
//! three-step shard workflow:
//!
//! ```text
//! extract:    com.zone ──▶ ExtractEngine ──▶ data/a.com.zone, data/b.com.zone, ...
//! transform:  data/*   ──▶ batch-set dedup, rewritten in place
//! load:       data/*   ──▶ WriteDispatcher ──▶ RecordSink
//! ```
//!
//! Hidden files in the data directory are ignored by transform and load.
//! Every stage returns a [`RunSummary`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{Stage, ZonexConfig};
use crate::dedup::dedup_batch_set;
use crate::dispatch::WriteDispatcher;
use crate::engine::{ExtractEngine, RunSummary, shutdown_requested};
use crate::error::{Error, Result};
use crate::progress::ProgressCounters;
use crate::record::CandidateRecord;
use crate::registry::SinkRegistry;
use crate::sink::{ShardFileSink, list_shards};
use crate::traits::{ProgressReporter, RecordSink};

/// Validate `config` and run its stage
///
/// Sinks for the direct and load stages are built through `registry`.
pub async fn run_stage(
    config: &ZonexConfig,
    registry: &SinkRegistry,
    reporter: Arc<dyn ProgressReporter>,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<RunSummary> {
    config.validate()?;
    info!("Running {} stage for .{}", config.stage.name(), config.tld);

    match config.stage {
        Stage::Direct => {
            let sink = registry.create_sink(&config.sink).await?;
            run_direct(config, sink, reporter, shutdown).await
        }
        Stage::Extract => run_extract(config, reporter, shutdown).await,
        Stage::Transform => run_transform(config, reporter, shutdown).await,
        Stage::Load => {
            let sink = registry.create_sink(&config.sink).await?;
            run_load(config, sink, reporter, shutdown).await
        }
    }
}

/// Zone file straight into `sink`
pub async fn run_direct(
    config: &ZonexConfig,
    sink: Arc<dyn RecordSink>,
    reporter: Arc<dyn ProgressReporter>,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<RunSummary> {
    let (engine, _events) = ExtractEngine::new(config, sink, reporter)?;
    engine.run_file(&config.source_file_path, shutdown).await
}

/// Zone file into per-first-character shard files under `data_dir`
pub async fn run_extract(
    config: &ZonexConfig,
    reporter: Arc<dyn ProgressReporter>,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<RunSummary> {
    let sink = Arc::new(ShardFileSink::new(&config.data_dir, config.shard_suffix()).await?);
    let (engine, _events) = ExtractEngine::new(config, sink, reporter)?;
    engine.run_file(&config.source_file_path, shutdown).await
}

/// Deduplicate every shard in place
///
/// Each shard keeps the first occurrence of every name in file order.
pub async fn run_transform(
    config: &ZonexConfig,
    reporter: Arc<dyn ProgressReporter>,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<RunSummary> {
    let started_at = chrono::Utc::now();
    let start = Instant::now();

    let shards = list_shards(Path::new(&config.data_dir)).await?;
    let total_bytes = total_size(&shards).await?;
    let counters = ProgressCounters::new();
    let mut cancelled = false;

    for path in &shards {
        if shutdown_signalled(&shutdown) {
            cancelled = true;
            break;
        }

        let data = fs::read(path).await.map_err(Error::SourceRead)?;
        counters.add_bytes(data.len() as u64);

        let content = String::from_utf8_lossy(&data);
        let lines = shard_lines(&content);
        counters.add_lines(lines.len() as u64);

        let (unique, removed) = dedup_batch_set(&lines);
        counters.add_duplicates(removed);
        rewrite_shard(path, &unique).await?;

        debug!(
            "Transformed {}: {} names, {} duplicates removed",
            path.display(),
            unique.len(),
            removed
        );
        reporter.report(&counters.snapshot(total_bytes, start.elapsed()));
    }

    let snapshot = counters.snapshot(total_bytes, start.elapsed());
    reporter.finish(&snapshot);
    Ok(RunSummary {
        started_at,
        finished_at: chrono::Utc::now(),
        snapshot,
        cancelled,
    })
}

/// Every shard line into `sink` as `{tld, name}`
///
/// Relies on the sink's unique key, so loading twice changes nothing.
pub async fn run_load(
    config: &ZonexConfig,
    sink: Arc<dyn RecordSink>,
    reporter: Arc<dyn ProgressReporter>,
    mut shutdown: Option<watch::Receiver<bool>>,
) -> Result<RunSummary> {
    config.engine.validate()?;
    let started_at = chrono::Utc::now();
    let start = Instant::now();

    let shards = list_shards(Path::new(&config.data_dir)).await?;
    let total_bytes = total_size(&shards).await?;
    let counters = Arc::new(ProgressCounters::new());
    let mut dispatcher = WriteDispatcher::new(
        Arc::clone(&sink),
        config.engine.max_in_flight_writes,
        Arc::clone(&counters),
    );
    let mut cancelled = false;

    for path in &shards {
        if shutdown_signalled(&shutdown) {
            cancelled = true;
            break;
        }

        let data = fs::read(path).await.map_err(Error::SourceRead)?;
        counters.add_bytes(data.len() as u64);

        let content = String::from_utf8_lossy(&data);
        for name in shard_lines(&content) {
            counters.add_lines(1);
            let record = CandidateRecord::new(config.tld.as_str(), name);
            if !dispatcher.dispatch_or_shutdown(record, &mut shutdown).await? {
                cancelled = true;
                break;
            }
        }
        if cancelled {
            info!("Shutdown signal received while loading {}", path.display());
            break;
        }

        debug!("Loaded {}", path.display());
        reporter.report(&counters.snapshot(total_bytes, start.elapsed()));
    }

    if !cancelled {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                info!("Shutdown signal received while waiting for writes");
                cancelled = true;
            }
            _ = dispatcher.drain() => {}
        }
    }
    if cancelled {
        dispatcher
            .settle(Duration::from_millis(config.engine.shutdown_grace_ms))
            .await;
    }
    sink.flush().await?;

    let snapshot = counters.snapshot(total_bytes, start.elapsed());
    reporter.finish(&snapshot);
    Ok(RunSummary {
        started_at,
        finished_at: chrono::Utc::now(),
        snapshot,
        cancelled,
    })
}

/// Non-blank lines of a shard
fn shard_lines(content: &str) -> Vec<&str> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Replace a shard's contents via a hidden temp file and rename
async fn rewrite_shard(path: &Path, names: &[String]) -> Result<()> {
    let mut body = names.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Other(format!("shard path {} has no file name", path.display())))?;
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&temp_path, body).await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}

async fn total_size(paths: &[PathBuf]) -> Result<u64> {
    let mut total = 0;
    for path in paths {
        total += fs::metadata(path).await?.len();
    }
    Ok(total)
}

fn shutdown_signalled(shutdown: &Option<watch::Receiver<bool>>) -> bool {
    shutdown.as_ref().is_some_and(|rx| *rx.borrow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use crate::sink::{FileRecordSink, MemoryRecordSink};
    use tempfile::tempdir;

    fn shard_config(dir: &Path) -> ZonexConfig {
        ZonexConfig::new("com").with_data_dir(dir.to_string_lossy())
    }

    #[test]
    fn test_shard_lines_drops_blank_lines() {
        assert_eq!(shard_lines("a\nb\r\n\n\n"), vec!["a", "b"]);
        assert!(shard_lines("").is_empty());
    }

    #[tokio::test]
    async fn test_transform_dedups_in_place_and_skips_hidden() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.com.zone"), "apple\navocado\napple\n\n")
            .await
            .unwrap();
        fs::write(dir.path().join("b.com.zone"), "banana\n").await.unwrap();
        fs::write(dir.path().join(".hidden"), "x\nx\n").await.unwrap();

        let summary = run_transform(&shard_config(dir.path()), Arc::new(SilentProgress), None)
            .await
            .unwrap();

        let a = fs::read_to_string(dir.path().join("a.com.zone")).await.unwrap();
        assert_eq!(a, "apple\navocado\n");
        let hidden = fs::read_to_string(dir.path().join(".hidden")).await.unwrap();
        assert_eq!(hidden, "x\nx\n");

        assert_eq!(summary.snapshot.duplicates_dropped, 1);
        assert_eq!(summary.snapshot.lines_processed, 4);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let dir = tempdir().unwrap();
        let shards = dir.path().join("data");
        fs::create_dir(&shards).await.unwrap();
        fs::write(shards.join("a.com.zone"), "apple\napple\n").await.unwrap();
        fs::write(shards.join("b.com.zone"), "banana\n").await.unwrap();

        let config = shard_config(&shards);
        let store = dir.path().join("store.json");

        for _ in 0..2 {
            let sink = Arc::new(FileRecordSink::new(&store).await.unwrap());
            run_load(&config, sink.clone(), Arc::new(SilentProgress), None)
                .await
                .unwrap();
            assert_eq!(sink.count().await.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn test_load_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.com.zone"), "apple\n").await.unwrap();

        let (tx, rx) = watch::channel(true);
        let sink = Arc::new(MemoryRecordSink::new());
        let summary = run_load(
            &shard_config(dir.path()),
            sink.clone(),
            Arc::new(SilentProgress),
            Some(rx),
        )
        .await
        .unwrap();
        drop(tx);

        assert!(summary.cancelled);
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_stage_validates_config() {
        let registry = SinkRegistry::with_builtins();
        let config = ZonexConfig::new("com");
        let result = run_stage(&config, &registry, Arc::new(SilentProgress), None).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
