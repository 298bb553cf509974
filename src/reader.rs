use thiserror::Error;
use tracing::{info, warn};

use crate::error::AppError;
use crate::source::{SourceKind, SourceRecord};
use crate::store::DocumentStore;

/// Result of reading one legacy collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found(Vec<SourceRecord>),
    NotFound,
}

impl ReadOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ReadOutcome::Found(_))
    }

    pub fn len(&self) -> usize {
        match self {
            ReadOutcome::Found(records) => records.len(),
            ReadOutcome::NotFound => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The records read; empty for a missing collection.
    pub fn into_records(self) -> Vec<SourceRecord> {
        match self {
            ReadOutcome::Found(records) => records,
            ReadOutcome::NotFound => Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read collection {collection}: {source}")]
    Store {
        collection: String,
        #[source]
        source: AppError,
    },
    #[error("document {collection}/{id} does not match the {kind:?} shape: {source}")]
    Decode {
        collection: String,
        id: String,
        kind: SourceKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads legacy collections and decodes each document into its typed shape.
#[derive(Debug)]
pub struct CollectionReader<'a, S> {
    store: &'a S,
}

impl<'a, S: DocumentStore> CollectionReader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Read `collection` as `kind`. A missing collection is not an error: it
    /// comes back as `ReadOutcome::NotFound` with a warning logged.
    pub async fn read(&self, collection: &str, kind: SourceKind) -> Result<ReadOutcome, ReadError> {
        let documents = match self.store.read_collection(collection).await {
            Ok(documents) => documents,
            Err(err) if err.is_not_found() => {
                warn!(
                    target: "hrmerge",
                    event = "collection_missing",
                    collection = %collection,
                    code = %err.code()
                );
                return Ok(ReadOutcome::NotFound);
            }
            Err(source) => {
                return Err(ReadError::Store {
                    collection: collection.to_string(),
                    source,
                })
            }
        };

        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            let record = SourceRecord::decode(collection, document.id.clone(), kind, document.body)
                .map_err(|source| ReadError::Decode {
                    collection: collection.to_string(),
                    id: document.id,
                    kind,
                    source,
                })?;
            records.push(record);
        }
        info!(
            target: "hrmerge",
            event = "collection_read",
            collection = %collection,
            count = records.len()
        );
        Ok(ReadOutcome::Found(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalDocument;
    use crate::store::SqliteStore;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect sqlite::memory:");
        SqliteStore::from_pool(pool).await.expect("apply schema")
    }

    /// Fails every read the way a vanished database file would.
    struct UnreadableStore;

    impl DocumentStore for UnreadableStore {
        async fn read_collection(
            &self,
            _collection: &str,
        ) -> crate::error::AppResult<Vec<crate::store::StoredDocument>> {
            let io = std::io::Error::from(std::io::ErrorKind::NotFound);
            Err(AppError::from(sqlx::Error::Io(io)))
        }

        async fn upsert(&self, _: &str, _: &CanonicalDocument) -> crate::error::AppResult<()> {
            Ok(())
        }

        async fn commit_batch(
            &self,
            _: &str,
            _: &[CanonicalDocument],
        ) -> crate::error::AppResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn store_io_failure_is_not_a_missing_collection() {
        let err = CollectionReader::new(&UnreadableStore)
            .read("employees", SourceKind::Employee)
            .await
            .expect_err("io failure must propagate");
        match err {
            ReadError::Store { collection, source } => {
                assert_eq!(collection, "employees");
                assert_eq!(source.code(), "IO/NotFound");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_collection_reads_as_not_found() {
        let store = memory_store().await;
        let outcome = CollectionReader::new(&store)
            .read("employeeProfiles", SourceKind::Profile)
            .await
            .expect("not found is not an error");
        assert_eq!(outcome, ReadOutcome::NotFound);
        assert!(outcome.into_records().is_empty());
    }

    #[tokio::test]
    async fn decodes_records_with_store_ids() {
        let store = memory_store().await;
        let body = json!({ "userId": "u1", "position": "Nurse" });
        store
            .upsert(
                "employees",
                &CanonicalDocument::new("e1", body.as_object().cloned().unwrap_or_default()),
            )
            .await
            .expect("seed");

        let outcome = CollectionReader::new(&store)
            .read("employees", SourceKind::Employee)
            .await
            .expect("read");
        assert!(outcome.is_found());
        let records = outcome.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), "e1");
        assert_eq!(records[0].collection(), "employees");
        assert_eq!(records[0].kind(), SourceKind::Employee);
    }

    #[tokio::test]
    async fn malformed_record_is_a_decode_error() {
        let store = memory_store().await;
        let body = json!({ "skills": 42 });
        store
            .upsert(
                "employees",
                &CanonicalDocument::new("e9", body.as_object().cloned().unwrap_or_default()),
            )
            .await
            .expect("seed");

        let err = CollectionReader::new(&store)
            .read("employees", SourceKind::Employee)
            .await
            .expect_err("skills must be a list");
        match err {
            ReadError::Decode { id, .. } => assert_eq!(id, "e9"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
