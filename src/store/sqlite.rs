use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Row, Sqlite, SqlitePool, Transaction};

use super::{schema, DocumentStore, StoredDocument, MAX_BATCH_OPS};
use crate::canonical::CanonicalDocument;
use crate::error::{AppError, AppResult};

const UPSERT_SQL: &str = "INSERT INTO documents (collection, id, body, created_at, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?4) \
     ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at";

/// Document store on a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and bring its schema
    /// up to date.
    pub async fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    AppError::from(err).with_context("path", parent.display().to_string())
                })?;
            }
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .log_statements(log::LevelFilter::Off);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .after_connect(|conn, _| {
                Box::pin(async move {
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok::<_, sqlx::Error>(())
                })
            })
            .connect_with(opts)
            .await?;
        tracing::info!(target: "hrmerge", event = "db_open", path = %path.display());
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, applying the schema first.
    pub async fn from_pool(pool: SqlitePool) -> AppResult<Self> {
        schema::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn write_one(
        tx: &mut Transaction<'_, Sqlite>,
        collection: &str,
        document: &CanonicalDocument,
        stamp: &str,
        now_ms: i64,
    ) -> AppResult<()> {
        let body = Value::Object(stamped_body(document, stamp)).to_string();
        sqlx::query(UPSERT_SQL)
            .bind(collection)
            .bind(&document.id)
            .bind(body)
            .bind(now_ms)
            .execute(&mut **tx)
            .await
            .map_err(|err| {
                AppError::from(err)
                    .with_context("collection", collection)
                    .with_context("id", document.id.as_str())
            })?;
        Ok(())
    }
}

/// Body with every declared server timestamp set to the commit time.
fn stamped_body(document: &CanonicalDocument, stamp: &str) -> Map<String, Value> {
    let mut body = document.body.clone();
    for field in &document.server_timestamps {
        body.insert(field.clone(), Value::String(stamp.to_string()));
    }
    body
}

fn commit_stamp() -> (String, i64) {
    let now = Utc::now();
    (
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
        now.timestamp_millis(),
    )
}

impl DocumentStore for SqliteStore {
    async fn read_collection(&self, collection: &str) -> AppResult<Vec<StoredDocument>> {
        let rows = sqlx::query("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Err(AppError::collection_not_found(collection));
        }
        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let raw: String = row.try_get("body")?;
            let body: Value = serde_json::from_str(&raw).map_err(|err| {
                AppError::from(err)
                    .with_context("collection", collection)
                    .with_context("id", id.as_str())
            })?;
            documents.push(StoredDocument { id, body });
        }
        Ok(documents)
    }

    async fn upsert(&self, collection: &str, document: &CanonicalDocument) -> AppResult<()> {
        let (stamp, now_ms) = commit_stamp();
        let mut tx = self.pool.begin().await?;
        Self::write_one(&mut tx, collection, document, &stamp, now_ms).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_batch(
        &self,
        collection: &str,
        documents: &[CanonicalDocument],
    ) -> AppResult<()> {
        if documents.len() > MAX_BATCH_OPS {
            return Err(AppError::new(
                AppError::BATCH_LIMIT_CODE,
                format!(
                    "batch of {} operations exceeds the limit of {MAX_BATCH_OPS}",
                    documents.len()
                ),
            )
            .with_context("collection", collection));
        }
        let (stamp, now_ms) = commit_stamp();
        let mut tx = self.pool.begin().await?;
        for document in documents {
            // Dropping `tx` on error rolls the whole batch back.
            Self::write_one(&mut tx, collection, document, &stamp, now_ms).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect sqlite::memory:");
        SqliteStore::from_pool(pool).await.expect("apply schema")
    }

    fn doc(id: &str, body: Value) -> CanonicalDocument {
        CanonicalDocument::new(id, body.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let store = memory_store().await;
        let err = store.read_collection("employees").await.expect_err("absent");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id_and_reads_in_id_order() {
        let store = memory_store().await;
        store.upsert("users", &doc("b", json!({ "n": 1 }))).await.expect("upsert b");
        store.upsert("users", &doc("a", json!({ "n": 2 }))).await.expect("upsert a");
        store.upsert("users", &doc("b", json!({ "n": 3 }))).await.expect("overwrite b");

        let docs = store.read_collection("users").await.expect("read");
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(docs[1].body, json!({ "n": 3 }));
    }

    #[tokio::test]
    async fn server_timestamps_are_filled_at_commit() {
        let store = memory_store().await;
        let document = doc("g", json!({ "x": true })).with_server_timestamp("migratedAt");
        store
            .commit_batch("settings", std::slice::from_ref(&document))
            .await
            .expect("commit");
        let docs = store.read_collection("settings").await.expect("read");
        let stamp = docs[0].body["migratedAt"].as_str().expect("stamp is a string");
        assert!(stamp.ends_with('Z'));
        assert_eq!(docs[0].body["x"], json!(true));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_without_writes() {
        let store = memory_store().await;
        let docs: Vec<_> = (0..=MAX_BATCH_OPS)
            .map(|i| doc(&format!("d{i:04}"), json!({})))
            .collect();
        let err = store.commit_batch("users", &docs).await.expect_err("too big");
        assert_eq!(err.code(), AppError::BATCH_LIMIT_CODE);
        assert!(store.read_collection("users").await.is_err());
    }

    #[tokio::test]
    async fn failing_write_rolls_back_the_whole_batch() {
        let store = memory_store().await;
        sqlx::query(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON documents \
             WHEN NEW.id = 'poison' BEGIN SELECT RAISE(ABORT, 'poisoned'); END;",
        )
        .execute(store.pool())
        .await
        .expect("create trigger");

        let docs = vec![doc("ok-1", json!({})), doc("poison", json!({})), doc("ok-2", json!({}))];
        let err = store.commit_batch("users", &docs).await.expect_err("trigger aborts");
        assert!(err.message().contains("poisoned"));
        assert!(store.read_collection("users").await.is_err());
    }
}
