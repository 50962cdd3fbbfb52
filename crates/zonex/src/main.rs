// # zonex - zone file extractor
//
// Thin integration layer over zonex-core. All extraction logic lives in the
// library; this binary only:
// 1. Reads the JSON configuration file
// 2. Initializes tracing and the runtime
// 3. Registers sinks
// 4. Runs the configured stage and reports the summary
//
// ## Usage
//
// ```bash
// zonex [CONFIG]    # CONFIG defaults to zonex.json
// ```
//
// ## Example configuration
//
// ```json
// {
//   "tld": "com",
//   "source_file_path": "/srv/zones/com.zone",
//   "stage": "direct",
//   "sink": { "type": "mongodb", "connection_string": "mongodb://localhost/zone" },
//   "engine": { "dedup_policy": "proximity", "max_in_flight_writes": 64 }
// }
// ```
//
// The shard workflow runs the same file three times with `"stage"` set to
// `extract`, `transform` and `load`.

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use zonex_core::progress::LogProgressReporter;
use zonex_core::{SinkRegistry, ZonexConfig};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_CONFIG_PATH: &str = "zonex.json";

/// Exit codes for different termination scenarios
///
/// - 0: Run completed (including a clean shutdown on signal)
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum ZonexExitCode {
    /// Run completed
    Clean = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ZonexExitCode> for ExitCode {
    fn from(code: ZonexExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Load and parse the configuration file
fn load_config(path: &str) -> Result<ZonexConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path))?;
    let config: ZonexConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file {}", path))?;
    Ok(config)
}

fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ZonexExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ZonexExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ZonexExitCode::ConfigError.into();
    }

    info!("Starting zonex ({} stage, .{})", config.stage.name(), config.tld);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZonexExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run(config).await {
            Ok(()) => ZonexExitCode::Clean,
            Err(e) => {
                error!("Run failed: {:#}", e);
                match e.downcast_ref::<zonex_core::Error>() {
                    Some(zonex_core::Error::Config(_)) => ZonexExitCode::ConfigError,
                    _ => ZonexExitCode::RuntimeError,
                }
            }
        }
    });

    result.into()
}

/// Run the configured stage
async fn run(config: ZonexConfig) -> Result<()> {
    let registry = SinkRegistry::with_builtins();

    #[cfg(feature = "mongodb")]
    {
        info!("Registering MongoDB sink");
        zonex_sink_mongodb::register(&registry);
    }

    info!("Available sinks: {}", registry.list_sinks().join(", "));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                info!("Received {}, stopping after in-flight writes", signal);
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Shutdown signal handling unavailable: {}", e),
        }
    });

    let reporter = Arc::new(LogProgressReporter::new(Duration::from_secs(
        config.engine.progress_interval_secs,
    )));
    let outcome = zonex_core::stages::run_stage(&config, &registry, reporter, Some(shutdown_rx)).await;
    signal_task.abort();

    let summary = outcome?;
    let elapsed = summary.finished_at - summary.started_at;
    info!(
        "{} stage {} in {}s: {} lines, {} forwarded, {} inserted, {} duplicates, {} failures",
        config.stage.name(),
        if summary.cancelled { "cancelled" } else { "finished" },
        elapsed.num_seconds(),
        summary.snapshot.lines_processed,
        summary.snapshot.records_forwarded,
        summary.snapshot.records_inserted,
        summary.snapshot.duplicates_dropped + summary.snapshot.sink_duplicates,
        summary.snapshot.sink_failures
    );
    if summary.snapshot.invariant_violations > 0 {
        warn!(
            "{} accepted lines parsed to an empty name",
            summary.snapshot.invariant_violations
        );
    }

    Ok(())
}

/// Wait for SIGTERM or SIGINT
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
