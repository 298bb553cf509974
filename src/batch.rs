//! Chunked, strictly sequential batch writes.
//!
//! Each chunk is one atomic store batch. Chunks are committed in order and
//! the first failure stops the write: chunks already committed stay
//! committed and later chunks are never sent. Callers that need the whole
//! collection to land must treat a [`BatchCommitError`] as "restore and
//! re-run", since the store is left partially written.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::canonical::CanonicalDocument;
use crate::error::AppError;
use crate::store::DocumentStore;

/// Leave-request writes stay below the store ceiling to leave headroom.
pub const LEAVE_REQUEST_BATCH_OPS: usize = 400;

#[derive(Debug, Error)]
pub enum BatchCommitError {
    #[error("batch size {requested} is outside 1..={limit} for {collection}")]
    InvalidBatchSize {
        collection: String,
        requested: usize,
        limit: usize,
    },
    #[error(
        "batch {chunk} of {chunks} for {collection} failed after {committed} documents were committed: {source}"
    )]
    Commit {
        collection: String,
        /// 1-based index of the chunk that failed.
        chunk: usize,
        chunks: usize,
        committed: usize,
        #[source]
        source: AppError,
    },
}

impl BatchCommitError {
    /// Documents that were durably written before the failure.
    pub fn committed(&self) -> usize {
        match self {
            BatchCommitError::InvalidBatchSize { .. } => 0,
            BatchCommitError::Commit { committed, .. } => *committed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub collection: String,
    /// Size of each chunk, in commit order.
    pub batches: Vec<usize>,
    /// Running committed count after each chunk.
    pub progress: Vec<usize>,
    pub committed: usize,
    pub dry_run: bool,
}

/// Split `documents` into consecutive chunks of at most `max` items.
/// `max` must be non-zero.
pub fn chunks<T>(documents: &[T], max: usize) -> impl Iterator<Item = &[T]> {
    debug_assert!(max > 0, "chunk size must be non-zero");
    documents.chunks(max.max(1))
}

#[derive(Debug)]
pub struct BatchWriter<'a, S> {
    store: &'a S,
    max_ops_per_batch: usize,
    dry_run: bool,
}

impl<'a, S: DocumentStore> BatchWriter<'a, S> {
    pub fn new(store: &'a S, max_ops_per_batch: usize) -> Self {
        Self {
            store,
            max_ops_per_batch,
            dry_run: false,
        }
    }

    /// Plan chunks and report them without committing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn max_ops_per_batch(&self) -> usize {
        self.max_ops_per_batch
    }

    pub async fn write(
        &self,
        documents: &[CanonicalDocument],
        collection: &str,
    ) -> Result<CommitReport, BatchCommitError> {
        let limit = self.store.max_batch_ops();
        if self.max_ops_per_batch == 0 || self.max_ops_per_batch > limit {
            return Err(BatchCommitError::InvalidBatchSize {
                collection: collection.to_string(),
                requested: self.max_ops_per_batch,
                limit,
            });
        }

        let total_chunks = documents.len().div_ceil(self.max_ops_per_batch);
        let mut report = CommitReport {
            collection: collection.to_string(),
            dry_run: self.dry_run,
            ..CommitReport::default()
        };

        for (index, chunk) in chunks(documents, self.max_ops_per_batch).enumerate() {
            if !self.dry_run {
                if let Err(source) = self.store.commit_batch(collection, chunk).await {
                    warn!(
                        target: "hrmerge",
                        event = "batch_failed",
                        collection = %collection,
                        chunk = index + 1,
                        chunks = total_chunks,
                        committed = report.committed,
                        code = %source.code()
                    );
                    return Err(BatchCommitError::Commit {
                        collection: collection.to_string(),
                        chunk: index + 1,
                        chunks: total_chunks,
                        committed: report.committed,
                        source,
                    });
                }
            }
            report.committed += chunk.len();
            report.batches.push(chunk.len());
            report.progress.push(report.committed);
            info!(
                target: "hrmerge",
                event = "batch_committed",
                collection = %collection,
                chunk = index + 1,
                chunks = total_chunks,
                size = chunk.len(),
                committed = report.committed,
                total = documents.len(),
                dry_run = self.dry_run
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_split_at_the_limit() {
        let items: Vec<u32> = (0..1234).collect();
        let sizes: Vec<usize> = chunks(&items, 400).map(<[u32]>::len).collect();
        assert_eq!(sizes, vec![400, 400, 400, 34]);
    }

    #[test]
    fn chunks_of_exact_multiple_have_no_tail() {
        let items: Vec<u32> = (0..1000).collect();
        let sizes: Vec<usize> = chunks(&items, 500).map(<[u32]>::len).collect();
        assert_eq!(sizes, vec![500, 500]);
    }

    #[test]
    fn chunks_of_nothing_is_empty() {
        let items: Vec<u32> = Vec::new();
        assert_eq!(chunks(&items, 500).count(), 0);
    }

    #[test]
    fn chunks_preserve_order() {
        let items: Vec<u32> = (0..7).collect();
        let flattened: Vec<u32> = chunks(&items, 3).flatten().copied().collect();
        assert_eq!(flattened, items);
    }
}
