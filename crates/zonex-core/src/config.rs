//! Configuration types for zonex
//!
//! A run is a batch job with fixed configuration, normally loaded from a JSON
//! file by the `zonex` binary.

use serde::{Deserialize, Serialize};

use crate::dedup::DedupPolicy;

/// Main zonex configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonexConfig {
    /// TLD label applied to every record (e.g. "com")
    pub tld: String,

    /// Path to the zone file (direct and extract stages)
    #[serde(default)]
    pub source_file_path: String,

    /// Intermediate shard directory (extract, transform and load stages)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Shard file suffix; defaults to "<tld>.zone"
    #[serde(default)]
    pub shard_suffix: Option<String>,

    /// Which stage to run
    #[serde(default)]
    pub stage: Stage,

    /// Persistence sink for the direct and load stages
    #[serde(default)]
    pub sink: SinkConfig,

    /// Line classifier tables
    #[serde(default)]
    pub filter: FilterConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Log level: trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ZonexConfig {
    /// Create a configuration for the given TLD with defaults
    pub fn new(tld: impl Into<String>) -> Self {
        Self {
            tld: tld.into(),
            source_file_path: String::new(),
            data_dir: default_data_dir(),
            shard_suffix: None,
            stage: Stage::default(),
            sink: SinkConfig::default(),
            filter: FilterConfig::default(),
            engine: EngineConfig::default(),
            log_level: default_log_level(),
        }
    }

    /// Set the zone file path
    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.source_file_path = path.into();
        self
    }

    /// Set the shard directory
    pub fn with_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the stage to run
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Set the sink
    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    /// Set the dedup policy
    pub fn with_dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.engine.dedup_policy = policy;
        self
    }

    /// Shard file suffix, e.g. "com.zone" for `a.com.zone`
    pub fn shard_suffix(&self) -> String {
        self.shard_suffix
            .clone()
            .unwrap_or_else(|| format!("{}.zone", self.tld))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.tld.is_empty() {
            return Err(crate::Error::config("TLD cannot be empty"));
        }
        if self.tld.contains('.') || self.tld.chars().any(char::is_whitespace) {
            return Err(crate::Error::config(format!(
                "TLD must be a bare label, got '{}'",
                self.tld
            )));
        }

        match self.stage {
            Stage::Direct | Stage::Extract => {
                if self.source_file_path.is_empty() {
                    return Err(crate::Error::config(format!(
                        "source_file_path is required for the {} stage",
                        self.stage.name()
                    )));
                }
            }
            Stage::Transform | Stage::Load => {}
        }

        if matches!(self.stage, Stage::Extract | Stage::Transform | Stage::Load)
            && self.data_dir.is_empty()
        {
            return Err(crate::Error::config(format!(
                "data_dir is required for the {} stage",
                self.stage.name()
            )));
        }

        if let Some(suffix) = &self.shard_suffix {
            if suffix.is_empty() || suffix.contains('/') {
                return Err(crate::Error::config(format!(
                    "shard_suffix must be a non-empty file name suffix, got '{}'",
                    suffix
                )));
            }
        }

        if matches!(self.stage, Stage::Direct | Stage::Load) {
            self.sink.validate()?;
        }
        self.engine.validate()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(crate::Error::config(format!(
                "log_level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            ))),
        }
    }
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Zone file straight into the sink
    #[default]
    Direct,
    /// Zone file into per-first-character shard files
    Extract,
    /// Deduplicate every shard file in place
    Transform,
    /// Shard files into the sink
    Load,
}

impl Stage {
    /// Stage name as used in configuration and logs
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Direct => "direct",
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
        }
    }
}

/// Persistence sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// In-memory sink (not persistent)
    #[default]
    Memory,

    /// JSON document file with a unique (name, tld) constraint
    File {
        /// Path to the store file
        path: String,
    },

    /// MongoDB collection (requires the mongodb sink plugin)
    Mongodb {
        /// Connection string, e.g. mongodb://localhost/zone
        connection_string: String,
        /// Collection name
        #[serde(default = "default_collection")]
        collection: String,
    },

    /// Custom sink
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SinkConfig {
    /// Validate the sink configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SinkConfig::Memory => Ok(()),
            SinkConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("File sink path cannot be empty"));
                }
                Ok(())
            }
            SinkConfig::Mongodb {
                connection_string,
                collection,
            } => {
                if connection_string.is_empty() {
                    return Err(crate::Error::config(
                        "MongoDB connection string cannot be empty",
                    ));
                }
                if collection.is_empty() {
                    return Err(crate::Error::config("MongoDB collection cannot be empty"));
                }
                Ok(())
            }
            SinkConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom sink factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom sink config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the sink type name used for registry lookup
    pub fn type_name(&self) -> &str {
        match self {
            SinkConfig::Memory => "memory",
            SinkConfig::File { .. } => "file",
            SinkConfig::Mongodb { .. } => "mongodb",
            SinkConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Line classifier tables
///
/// Extractor variants differ only in these tables. Add "-" to the leading
/// tokens to reject hyphen-led labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Prefixes that disqualify a line. `None` means the built-in set,
    /// including the uppercased zone apex ("COM. ").
    #[serde(default)]
    pub forbidden_leading_tokens: Option<Vec<String>>,

    /// Characters that disqualify a line when found in its first token
    #[serde(default = "default_forbidden_substrings")]
    pub forbidden_substrings: Vec<char>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            forbidden_leading_tokens: None,
            forbidden_substrings: default_forbidden_substrings(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Dedup strategy applied before the sink
    #[serde(default)]
    pub dedup_policy: DedupPolicy,

    /// Pending candidates that trigger a window drain
    ///
    /// Bounds memory for batch-set dedup on huge files.
    #[serde(default = "default_chunk_buffer_full_threshold")]
    pub chunk_buffer_full_threshold: usize,

    /// Bytes requested per read from the source
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Maximum sink writes in flight at once
    #[serde(default = "default_max_in_flight_writes")]
    pub max_in_flight_writes: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Minimum seconds between progress log lines
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    /// Milliseconds in-flight writes get to finish after a shutdown signal
    ///
    /// Writes still pending after this are aborted and counted as failures.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.chunk_buffer_full_threshold == 0 {
            return Err(crate::Error::config(
                "chunk_buffer_full_threshold must be > 0",
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(crate::Error::config("read_chunk_size must be > 0"));
        }
        if self.max_in_flight_writes == 0 {
            return Err(crate::Error::config("max_in_flight_writes must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_policy: DedupPolicy::default(),
            chunk_buffer_full_threshold: default_chunk_buffer_full_threshold(),
            read_chunk_size: default_read_chunk_size(),
            max_in_flight_writes: default_max_in_flight_writes(),
            event_channel_capacity: default_event_channel_capacity(),
            progress_interval_secs: default_progress_interval_secs(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_collection() -> String {
    "domains".to_string()
}

fn default_forbidden_substrings() -> Vec<char> {
    vec!['.', '@', ' ', '+', '=', '/', ':']
}

fn default_chunk_buffer_full_threshold() -> usize {
    5000
}

fn default_read_chunk_size() -> usize {
    64 * 1024
}

fn default_max_in_flight_writes() -> usize {
    64
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_progress_interval_secs() -> u64 {
    5
}

fn default_shutdown_grace_ms() -> u64 {
    1000
}
