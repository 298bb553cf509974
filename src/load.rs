//! Seeding a store from a JSON export.
//!
//! The export is one object keyed by collection name. Each collection is
//! either an object of `id -> body` or an array of bodies carrying an `id`
//! field. Documents are written through the same batch writer the migration
//! uses, so an export larger than one batch is chunked the same way.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::batch::{BatchCommitError, BatchWriter};
use crate::canonical::CanonicalDocument;
use crate::store::DocumentStore;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read export {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("export is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("export must be an object keyed by collection name")]
    NotAnObject,
    #[error("collection {collection}: {reason}")]
    Shape { collection: String, reason: String },
    #[error(transparent)]
    Commit(#[from] BatchCommitError),
}

/// Documents per collection. Array entries keep their order; object entries
/// come back in id order.
pub fn parse_export(raw: &str) -> Result<BTreeMap<String, Vec<CanonicalDocument>>, LoadError> {
    let Value::Object(collections) = serde_json::from_str::<Value>(raw)? else {
        return Err(LoadError::NotAnObject);
    };

    let mut parsed = BTreeMap::new();
    for (collection, documents) in collections {
        let shape = |reason: &str| LoadError::Shape {
            collection: collection.clone(),
            reason: reason.to_string(),
        };
        let docs = match documents {
            Value::Object(by_id) => by_id
                .into_iter()
                .map(|(id, body)| match body {
                    Value::Object(body) => Ok(CanonicalDocument::new(id, body)),
                    _ => Err(shape(&format!("document {id} is not an object"))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    let Value::Object(mut body) = item else {
                        return Err(shape("array entries must be objects"));
                    };
                    let id = match body.remove("id") {
                        Some(Value::String(id)) if !id.is_empty() => id,
                        Some(Value::Number(n)) => n.to_string(),
                        _ => return Err(shape("array entries need a non-empty id")),
                    };
                    Ok(CanonicalDocument::new(id, body))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(shape("expected an object or an array")),
        };
        parsed.insert(collection, docs);
    }
    Ok(parsed)
}

pub async fn load_export<S: DocumentStore>(
    store: &S,
    path: &Path,
) -> Result<BTreeMap<String, usize>, LoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let writer = BatchWriter::new(store, store.max_batch_ops());
    let mut counts = BTreeMap::new();
    for (collection, documents) in parse_export(&raw)? {
        let report = writer.write(&documents, &collection).await?;
        counts.insert(collection, report.committed);
    }
    Ok(counts)
}
