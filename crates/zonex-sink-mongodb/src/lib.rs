// # MongoDB Record Sink
//
// Stores extracted records as `{ tld, name }` documents in a MongoDB
// collection with a unique compound index on `(name, tld)`.
//
// ## Behavior
//
// - The index is created on connect; creating an existing index is a no-op
// - A duplicate key error (code 11000) is reported as `StoreOutcome::Duplicate`
// - Every other driver error is `Error::SinkWrite`; the engine counts it and
//   moves on
// - Inserts carry no ordering between them
//
// ## Connection String
//
// The database comes from the connection string path
// (`mongodb://localhost/zone`). Without one, the `zone` database is used.

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use std::sync::Arc;
use zonex_core::config::SinkConfig;
use zonex_core::traits::{RecordSink, RecordSinkFactory, StoreOutcome};
use zonex_core::{CandidateRecord, Error, Result, SinkRegistry};

/// Database used when the connection string names none
const DEFAULT_DATABASE: &str = "zone";

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed record sink
pub struct MongoRecordSink {
    collection: Collection<CandidateRecord>,
}

impl MongoRecordSink {
    /// Connect and make sure the unique `(name, tld)` index exists
    pub async fn connect(connection_string: &str, collection: &str) -> Result<Self> {
        let client = Client::with_uri_str(connection_string)
            .await
            .map_err(|e| Error::config(format!("Invalid MongoDB connection string: {}", e)))?;

        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        let collection = database.collection::<CandidateRecord>(collection);

        let index = IndexModel::builder()
            .keys(doc! { "name": 1, "tld": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection
            .create_index(index)
            .await
            .map_err(|e| Error::sink_write(format!("Failed to create unique index: {}", e)))?;

        tracing::info!(
            "Connected to MongoDB collection {}.{}",
            database.name(),
            collection.name()
        );
        Ok(Self { collection })
    }
}

/// Whether a driver error is a unique index violation
fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => false,
    }
}

#[async_trait]
impl RecordSink for MongoRecordSink {
    async fn store(&self, record: &CandidateRecord) -> Result<StoreOutcome> {
        match self.collection.insert_one(record).await {
            Ok(_) => Ok(StoreOutcome::Inserted),
            Err(e) if is_duplicate_key(&e) => Ok(StoreOutcome::Duplicate),
            Err(e) => Err(Error::sink_write(format!(
                "insert of {}.{} failed: {}",
                record.name, record.tld, e
            ))),
        }
    }

    async fn flush(&self) -> Result<()> {
        // Inserts are written through
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        self.collection
            .count_documents(doc! {})
            .await
            .map_err(|e| Error::sink_write(format!("count failed: {}", e)))
    }

    fn sink_name(&self) -> &'static str {
        "mongodb"
    }
}

/// Factory for the `mongodb` sink type
#[derive(Debug, Default)]
pub struct MongoRecordSinkFactory;

#[async_trait]
impl RecordSinkFactory for MongoRecordSinkFactory {
    async fn create(&self, config: &SinkConfig) -> Result<Arc<dyn RecordSink>> {
        match config {
            SinkConfig::Mongodb {
                connection_string,
                collection,
            } => Ok(Arc::new(
                MongoRecordSink::connect(connection_string, collection).await?,
            )),
            other => Err(Error::config(format!(
                "mongodb sink factory cannot build a '{}' sink",
                other.type_name()
            ))),
        }
    }
}

/// Register the MongoDB sink with a registry
pub fn register(registry: &SinkRegistry) {
    registry.register_sink("mongodb", Arc::new(MongoRecordSinkFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register() {
        let registry = SinkRegistry::with_builtins();
        assert!(!registry.has_sink("mongodb"));
        register(&registry);
        assert!(registry.has_sink("mongodb"));
    }

    #[tokio::test]
    async fn test_factory_rejects_other_sink_types() {
        let result = MongoRecordSinkFactory.create(&SinkConfig::Memory).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_connection_string() {
        let result = MongoRecordSink::connect("not-a-mongo-uri", "domains").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
