// # Shard File Sink
//
// Intermediate representation between extraction and loading.
//
// Names are grouped by first character and appended, one per line, to
// `<data_dir>/<first_char>.<suffix>`. Shards are not deduplicated here; the
// transform stage rewrites each shard with batch-set dedup and the load stage
// relies on the final sink's unique index.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReadDirStream;

use crate::Error;
use crate::record::CandidateRecord;
use crate::traits::sink::{RecordSink, StoreOutcome};

/// Buffered bytes that trigger an automatic commit
const DEFAULT_COMMIT_THRESHOLD: usize = 4 * 1024 * 1024;

/// Per-first-character shard writer
#[derive(Debug)]
pub struct ShardFileSink {
    data_dir: PathBuf,
    suffix: String,
    commit_threshold: usize,
    buffers: Mutex<ShardBuffers>,
}

#[derive(Debug, Default)]
struct ShardBuffers {
    by_key: BTreeMap<char, String>,
    bytes: usize,
}

impl ShardFileSink {
    /// Create a shard sink, creating `data_dir` if needed
    pub async fn new(data_dir: impl AsRef<Path>, suffix: impl Into<String>) -> Result<Self, Error> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).await.map_err(|e| {
            Error::config(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            data_dir,
            suffix: suffix.into(),
            commit_threshold: DEFAULT_COMMIT_THRESHOLD,
            buffers: Mutex::new(ShardBuffers::default()),
        })
    }

    /// Commit buffered names once this many bytes are pending
    pub fn with_commit_threshold(mut self, bytes: usize) -> Self {
        self.commit_threshold = bytes;
        self
    }

    /// Path of the shard holding names starting with `key`
    pub fn shard_path(&self, key: char) -> PathBuf {
        self.data_dir.join(format!("{}.{}", key, self.suffix))
    }

    /// Append every buffered shard to disk
    ///
    /// A buffer is released only once its append succeeds. Shards that fail
    /// stay buffered for the next commit and are named in the error.
    async fn commit(&self, buffers: &mut ShardBuffers) -> Result<(), Error> {
        let keys: Vec<char> = buffers.by_key.keys().copied().collect();
        let mut failed = Vec::new();

        for key in keys {
            let Some(data) = buffers.by_key.get(&key) else {
                continue;
            };
            let appended = self.append(key, data).await;
            match appended {
                Ok(()) => {
                    buffers.by_key.remove(&key);
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    failed.push(self.shard_path(key).display().to_string());
                }
            }
        }
        buffers.bytes = buffers.by_key.values().map(String::len).sum();

        if !failed.is_empty() {
            return Err(Error::sink_write(format!(
                "Failed to commit {} shard(s), kept buffered: {}",
                failed.len(),
                failed.join(", ")
            )));
        }
        tracing::trace!("Committed shards under {}", self.data_dir.display());
        Ok(())
    }

    async fn append(&self, key: char, data: &str) -> Result<(), Error> {
        let path = self.shard_path(key);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                Error::sink_write(format!("Failed to open shard {}: {}", path.display(), e))
            })?;
        file.write_all(data.as_bytes()).await.map_err(|e| {
            Error::sink_write(format!("Failed to append to shard {}: {}", path.display(), e))
        })?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for ShardFileSink {
    async fn store(&self, record: &CandidateRecord) -> Result<StoreOutcome, Error> {
        let Some(key) = record.name.chars().next() else {
            return Err(Error::sink_write("cannot shard an empty name"));
        };

        let mut buffers = self.buffers.lock().await;
        let shard = buffers.by_key.entry(key).or_default();
        shard.push_str(&record.name);
        shard.push('\n');
        buffers.bytes += record.name.len() + 1;

        if buffers.bytes >= self.commit_threshold {
            self.commit(&mut buffers).await?;
        }
        Ok(StoreOutcome::Inserted)
    }

    async fn flush(&self) -> Result<(), Error> {
        let mut buffers = self.buffers.lock().await;
        self.commit(&mut buffers).await
    }

    async fn count(&self) -> Result<u64, Error> {
        let buffers = self.buffers.lock().await;
        let mut lines = buffers
            .by_key
            .values()
            .map(|data| data.matches('\n').count() as u64)
            .sum::<u64>();

        for path in list_shards(&self.data_dir).await? {
            if path.to_string_lossy().ends_with(&format!(".{}", self.suffix)) {
                let data = fs::read(&path).await?;
                lines += data.iter().filter(|&&b| b == b'\n').count() as u64;
            }
        }
        Ok(lines)
    }

    fn sink_name(&self) -> &'static str {
        "shard"
    }
}

/// Non-hidden regular files in a shard directory, sorted by name
pub async fn list_shards(data_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let entries = fs::read_dir(data_dir).await.map_err(|e| {
        Error::config(format!(
            "Failed to read data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;

    let mut stream = ReadDirStream::new(entries);
    let mut shards = Vec::new();
    while let Some(entry) = stream.next().await {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type().await?.is_file() {
            shards.push(entry.path());
        }
    }
    shards.sort();
    Ok(shards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_shard_sink_groups_by_first_char() {
        let dir = tempdir().unwrap();
        let sink = ShardFileSink::new(dir.path(), "com.zone").await.unwrap();

        for name in ["apple", "banana", "avocado", "apple"] {
            sink.store(&CandidateRecord::new("com", name)).await.unwrap();
        }
        sink.flush().await.unwrap();

        let a = fs::read_to_string(dir.path().join("a.com.zone")).await.unwrap();
        let b = fs::read_to_string(dir.path().join("b.com.zone")).await.unwrap();
        assert_eq!(a, "apple\navocado\napple\n");
        assert_eq!(b, "banana\n");
        assert_eq!(sink.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_shard_sink_appends_across_flushes() {
        let dir = tempdir().unwrap();
        let sink = ShardFileSink::new(dir.path(), "com.zone").await.unwrap();

        sink.store(&CandidateRecord::new("com", "one")).await.unwrap();
        sink.flush().await.unwrap();
        sink.store(&CandidateRecord::new("com", "other")).await.unwrap();
        sink.flush().await.unwrap();

        let o = fs::read_to_string(sink.shard_path('o')).await.unwrap();
        assert_eq!(o, "one\nother\n");
    }

    #[tokio::test]
    async fn test_shard_sink_auto_commits() {
        let dir = tempdir().unwrap();
        let sink = ShardFileSink::new(dir.path(), "com.zone")
            .await
            .unwrap()
            .with_commit_threshold(1);

        sink.store(&CandidateRecord::new("com", "zeta")).await.unwrap();
        assert!(sink.shard_path('z').exists());
    }

    #[tokio::test]
    async fn test_failed_shard_keeps_its_buffer_and_spares_the_others() {
        let dir = tempdir().unwrap();
        let sink = ShardFileSink::new(dir.path(), "com.zone").await.unwrap();

        for name in ["apple", "banana", "cherry"] {
            sink.store(&CandidateRecord::new("com", name)).await.unwrap();
        }

        // a directory in place of the `a` shard makes its append fail
        let blocked = sink.shard_path('a');
        fs::create_dir(&blocked).await.unwrap();

        let err = sink.flush().await.unwrap_err();
        assert!(err.to_string().contains("a.com.zone"));
        let b = fs::read_to_string(sink.shard_path('b')).await.unwrap();
        let c = fs::read_to_string(sink.shard_path('c')).await.unwrap();
        assert_eq!(b, "banana\n");
        assert_eq!(c, "cherry\n");
        assert_eq!(sink.count().await.unwrap(), 3);

        fs::remove_dir(&blocked).await.unwrap();
        sink.flush().await.unwrap();

        let a = fs::read_to_string(&blocked).await.unwrap();
        assert_eq!(a, "apple\n");
        // b and c were not written twice
        assert_eq!(sink.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_auto_commit_keeps_byte_count() {
        let dir = tempdir().unwrap();
        let sink = ShardFileSink::new(dir.path(), "com.zone")
            .await
            .unwrap()
            .with_commit_threshold(1);
        fs::create_dir(sink.shard_path('z')).await.unwrap();

        assert!(sink.store(&CandidateRecord::new("com", "zeta")).await.is_err());
        assert!(sink.store(&CandidateRecord::new("com", "yak")).await.is_err());
        assert_eq!(fs::read_to_string(sink.shard_path('y')).await.unwrap(), "yak\n");
        assert_eq!(sink.buffers.lock().await.bytes, "zeta\n".len());
    }

    #[tokio::test]
    async fn test_list_shards_skips_hidden_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.com.zone"), b"a\n").await.unwrap();
        fs::write(dir.path().join(".DS_Store"), b"junk").await.unwrap();
        fs::create_dir(dir.path().join("sub")).await.unwrap();

        let shards = list_shards(dir.path()).await.unwrap();
        assert_eq!(shards, vec![dir.path().join("a.com.zone")]);
    }
}
