pub mod schema;
pub mod sqlite;

use serde_json::Value;

use crate::canonical::CanonicalDocument;
use crate::error::AppResult;

pub use sqlite::SqliteStore;

/// Largest number of writes the store accepts in one atomic batch.
pub const MAX_BATCH_OPS: usize = 500;

/// A document as it sits in the store, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub body: Value,
}

/// The three primitives the consolidation engine needs from a document store.
///
/// Calls are awaited one at a time by the engine; implementations need not
/// be safe for concurrent writers on the same collection.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Ceiling on operations per `commit_batch` call.
    fn max_batch_ops(&self) -> usize {
        MAX_BATCH_OPS
    }

    /// Every document of `collection`, ordered by id. A collection that does
    /// not exist is reported as a not-found error (see `AppError::is_not_found`).
    async fn read_collection(&self, collection: &str) -> AppResult<Vec<StoredDocument>>;

    /// Create or overwrite one document by id.
    async fn upsert(&self, collection: &str, document: &CanonicalDocument) -> AppResult<()>;

    /// Create or overwrite all `documents` atomically: either every write
    /// lands or none does.
    async fn commit_batch(&self, collection: &str, documents: &[CanonicalDocument])
        -> AppResult<()>;
}
