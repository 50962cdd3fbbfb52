// # File Record Sink
//
// JSON document store implementation of RecordSink.
//
// ## Purpose
//
// Persists extracted records across runs with a unique `(name, tld)`
// constraint, so re-running the pipeline against the same file leaves the
// record count unchanged.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: the previous file is kept as `.backup`
// - Recovery: a corrupt main file falls back to the backup
//
// ## Write Scheduling
//
// Stores only touch memory and mark the sink dirty. `flush()` writes the
// whole document; per-record writes would make multi-gigabyte runs crawl.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "updated_at": "2025-01-09T12:00:00Z",
//   "records": [
//     { "tld": "com", "name": "example" }
//   ]
// }
// ```

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::SinkConfig;
use crate::record::CandidateRecord;
use crate::traits::sink::{RecordSink, RecordSinkFactory, StoreOutcome};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-backed document sink with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use zonex_core::sink::FileRecordSink;
/// use zonex_core::{CandidateRecord, RecordSink};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let sink = FileRecordSink::new("/var/lib/zonex/com.json").await?;
///     sink.store(&CandidateRecord::new("com", "example")).await?;
///     sink.flush().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileRecordSink {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug, Default)]
struct FileState {
    keys: HashSet<(String, String)>,
    records: Vec<CandidateRecord>,
    dirty: bool,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    records: Vec<CandidateRecord>,
}

impl FileRecordSink {
    /// Create or load a file sink
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing store file
    /// 3. Fall back to the backup if the store file is corrupt
    /// 4. Start empty if both fail or neither exists
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let records = Self::load_with_recovery(&path).await?;

        let mut state = FileState::default();
        for record in records {
            if state.keys.insert((record.name.clone(), record.tld.clone())) {
                state.records.push(record);
            }
        }
        tracing::debug!(
            "Opened file sink {} with {} records",
            path.display(),
            state.records.len()
        );

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Load the store file, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<Vec<CandidateRecord>, Error> {
        match Self::load(path).await {
            Ok(records) => Ok(records),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with an empty store.");
                    return Ok(Vec::new());
                }

                match Self::load(&backup_path).await {
                    Ok(records) => {
                        tracing::info!("Recovered store from backup: {} records", records.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(records)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with an empty store.",
                            backup_err
                        );
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Vec<CandidateRecord>, Error> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::sink_write(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;
        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.records)
    }

    /// Write the whole store atomically
    async fn write_store(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;

        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            updated_at: Some(chrono::Utc::now()),
            records: guard.records.clone(),
        };
        let json = serde_json::to_string(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::sink_write(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::sink_write(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.flush().await.map_err(|e| {
                Error::sink_write(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::sink_write(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        guard.dirty = false;
        tracing::trace!("Store written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for FileRecordSink {
    async fn store(&self, record: &CandidateRecord) -> Result<StoreOutcome, Error> {
        let mut guard = self.state.write().await;
        if !guard
            .keys
            .insert((record.name.clone(), record.tld.clone()))
        {
            return Ok(StoreOutcome::Duplicate);
        }
        guard.records.push(record.clone());
        guard.dirty = true;
        Ok(StoreOutcome::Inserted)
    }

    async fn flush(&self) -> Result<(), Error> {
        if self.state.read().await.dirty {
            self.write_store().await
        } else {
            Ok(())
        }
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.state.read().await.records.len() as u64)
    }

    fn sink_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for the `file` sink type
#[derive(Debug, Default)]
pub struct FileRecordSinkFactory;

#[async_trait]
impl RecordSinkFactory for FileRecordSinkFactory {
    async fn create(&self, config: &SinkConfig) -> Result<Arc<dyn RecordSink>, Error> {
        match config {
            SinkConfig::File { path } => Ok(Arc::new(FileRecordSink::new(path).await?)),
            other => Err(Error::config(format!(
                "file sink factory cannot build a '{}' sink",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_sink_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("com.json");

        let sink = FileRecordSink::new(&path).await.unwrap();
        let record = CandidateRecord::new("com", "example");
        assert_eq!(sink.store(&record).await.unwrap(), StoreOutcome::Inserted);
        assert_eq!(sink.store(&record).await.unwrap(), StoreOutcome::Duplicate);

        // nothing hits disk before flush
        assert!(!path.exists());
        sink.flush().await.unwrap();
        assert!(path.exists());

        let reopened = FileRecordSink::new(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert_eq!(
            reopened.store(&record).await.unwrap(),
            StoreOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_file_sink_recovers_from_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("com.json");

        let sink = FileRecordSink::new(&path).await.unwrap();
        sink.store(&CandidateRecord::new("com", "first")).await.unwrap();
        sink.flush().await.unwrap();

        // second write moves the first document to .backup
        sink.store(&CandidateRecord::new("com", "second")).await.unwrap();
        sink.flush().await.unwrap();
        assert!(FileRecordSink::backup_path(&path).exists());

        fs::write(&path, b"not json at all").await.unwrap();

        let recovered = FileRecordSink::new(&path).await.unwrap();
        assert_eq!(recovered.count().await.unwrap(), 1);
        assert_eq!(
            recovered
                .store(&CandidateRecord::new("com", "first"))
                .await
                .unwrap(),
            StoreOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_file_sink_flush_is_noop_when_clean() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let sink = FileRecordSink::new(&path).await.unwrap();
        sink.flush().await.unwrap();
        assert!(!path.exists());
        assert!(path.parent().unwrap().exists());
    }
}
