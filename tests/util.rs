#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use hrmerge_lib::error::{AppError, AppResult};
use hrmerge_lib::store::{StoredDocument, MAX_BATCH_OPS};
use hrmerge_lib::{CanonicalDocument, DocumentStore, SqliteStore};
use serde_json::{Map, Value};
use sqlx::sqlite::SqlitePoolOptions;

pub async fn temp_store() -> SqliteStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    SqliteStore::from_pool(pool).await.expect("apply schema")
}

pub fn doc(id: &str, body: Value) -> CanonicalDocument {
    let body = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    CanonicalDocument::new(id, body)
}

pub async fn seed<S: DocumentStore>(store: &S, collection: &str, docs: &[(&str, Value)]) {
    for (id, body) in docs {
        store
            .upsert(collection, &doc(id, body.clone()))
            .await
            .expect("seed document");
    }
}

/// Every document of `collection` keyed by id, or empty when it does not exist.
pub async fn documents<S: DocumentStore>(store: &S, collection: &str) -> BTreeMap<String, Value> {
    match store.read_collection(collection).await {
        Ok(docs) => docs.into_iter().map(|d| (d.id, d.body)).collect(),
        Err(err) if err.is_not_found() => BTreeMap::new(),
        Err(err) => panic!("read {collection}: {err}"),
    }
}

pub async fn body_of<S: DocumentStore>(store: &S, collection: &str, id: &str) -> Value {
    documents(store, collection)
        .await
        .remove(id)
        .unwrap_or_else(|| panic!("{collection}/{id} missing"))
}

pub fn without(mut value: Value, field: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.remove(field);
    }
    value
}

/// In-memory store that records every batch commit and can be told to fail
/// the n-th one (1-based, counted across collections).
#[derive(Default)]
pub struct RecordingStore {
    pub data: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    pub commits: Mutex<Vec<(String, usize)>>,
    pub fail_on_commit: Option<usize>,
}

impl RecordingStore {
    pub fn failing_on(commit: usize) -> Self {
        Self {
            fail_on_commit: Some(commit),
            ..Self::default()
        }
    }

    pub fn commit_sizes(&self, collection: &str) -> Vec<usize> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, size)| *size)
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.data
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn put(&self, collection: &str, documents: &[CanonicalDocument]) {
        let mut data = self.data.lock().unwrap();
        let entry = data.entry(collection.to_string()).or_default();
        for document in documents {
            let mut body = document.body.clone();
            for field in &document.server_timestamps {
                body.insert(field.clone(), Value::String("2024-01-01T00:00:00.000Z".into()));
            }
            entry.insert(document.id.clone(), Value::Object(body));
        }
    }
}

impl DocumentStore for RecordingStore {
    async fn read_collection(&self, collection: &str) -> AppResult<Vec<StoredDocument>> {
        let data = self.data.lock().unwrap();
        match data.get(collection) {
            Some(docs) if !docs.is_empty() => Ok(docs
                .iter()
                .map(|(id, body)| StoredDocument {
                    id: id.clone(),
                    body: body.clone(),
                })
                .collect()),
            _ => Err(AppError::collection_not_found(collection)),
        }
    }

    async fn upsert(&self, collection: &str, document: &CanonicalDocument) -> AppResult<()> {
        self.put(collection, std::slice::from_ref(document));
        Ok(())
    }

    async fn commit_batch(&self, collection: &str, documents: &[CanonicalDocument]) -> AppResult<()> {
        let attempt = {
            let mut commits = self.commits.lock().unwrap();
            commits.push((collection.to_string(), documents.len()));
            commits.len()
        };
        if documents.len() > MAX_BATCH_OPS {
            return Err(AppError::new(AppError::BATCH_LIMIT_CODE, "too many operations"));
        }
        if self.fail_on_commit == Some(attempt) {
            return Err(AppError::new("STORE/UNAVAILABLE", "injected commit failure"));
        }
        self.put(collection, documents);
        Ok(())
    }
}
