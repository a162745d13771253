// src/store/sqlite.rs
//! SQLite-backed document store.
//!
//! Every collection lives in a single `documents` table, keyed by
//! `<database>.<collection>`. The autoincrement `seq` column is the
//! store-assigned identifier and gives cursors a stable resume point.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{Document, DocumentCursor, DocumentStore, StoreError};

pub struct SqliteStore {
    pool: SqlitePool,
    database: String,
    schema: OnceCell<()>,
}

impl SqliteStore {
    /// Build a lazily connecting pool. Nothing touches the database until the
    /// first operation, so reachability is decided by [`DocumentStore::health_check`].
    pub fn connect_lazy(address: &str, database: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(address)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database exists per connection; pin it to one.
        let in_memory = address.contains(":memory:");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Unavailable(format!("creating {}: {e}", parent.display()))
                    })?;
                }
            }
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_lazy_with(options);

        Ok(Self {
            pool,
            database: database.to_string(),
            schema: OnceCell::new(),
        })
    }

    fn qualified(&self, collection: &str) -> String {
        format!("{}.{}", self.database, collection)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS documents (
                        seq INTEGER PRIMARY KEY AUTOINCREMENT,
                        collection TEXT NOT NULL,
                        body TEXT NOT NULL
                    )
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    "CREATE INDEX IF NOT EXISTS idx_documents_collection_seq ON documents (collection, seq)",
                )
                .execute(&self.pool)
                .await?;

                debug!(database = %self.database, "document schema ready");
                Ok::<(), StoreError>(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        self.ensure_schema().await
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        self.ensure_schema().await?;
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(self.qualified(collection))
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn delete_all(&self, collection: &str) -> Result<u64, StoreError> {
        self.ensure_schema().await?;
        let res = sqlx::query("DELETE FROM documents WHERE collection = ?")
            .bind(self.qualified(collection))
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn cursor(
        &self,
        collection: &str,
        batch_size: usize,
    ) -> Result<Box<dyn DocumentCursor>, StoreError> {
        self.ensure_schema().await?;
        Ok(Box::new(SqliteCursor {
            pool: self.pool.clone(),
            collection: self.qualified(collection),
            batch_size: batch_size.max(1) as i64,
            last_seq: 0,
            exhausted: false,
            closed: false,
        }))
    }

    async fn bulk_insert_unordered(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<u64, StoreError> {
        self.ensure_schema().await?;
        let key = self.qualified(collection);

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        let mut failed = 0u64;
        let mut last_error = String::new();

        for doc in &docs {
            let body = match serde_json::to_string(doc) {
                Ok(b) => b,
                Err(e) => {
                    failed += 1;
                    last_error = e.to_string();
                    continue;
                }
            };
            match sqlx::query("INSERT INTO documents (collection, body) VALUES (?, ?)")
                .bind(&key)
                .bind(body)
                .execute(&mut *tx)
                .await
            {
                Ok(_) => inserted += 1,
                Err(e) => {
                    failed += 1;
                    last_error = e.to_string();
                }
            }
        }
        tx.commit().await?;

        if failed > 0 {
            return Err(StoreError::BulkWrite {
                inserted,
                failed,
                message: last_error,
            });
        }
        Ok(inserted)
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!(database = %self.database, "document store connection closed");
        }
    }
}

struct SqliteCursor {
    pool: SqlitePool,
    collection: String,
    batch_size: i64,
    last_seq: i64,
    exhausted: bool,
    closed: bool,
}

#[async_trait]
impl DocumentCursor for SqliteCursor {
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>, StoreError> {
        if self.closed {
            return Err(StoreError::CursorClosed);
        }
        if self.exhausted {
            return Ok(None);
        }

        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT seq, body FROM documents WHERE collection = ? AND seq > ? ORDER BY seq LIMIT ?",
        )
        .bind(&self.collection)
        .bind(self.last_seq)
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        if (rows.len() as i64) < self.batch_size {
            self.exhausted = true;
        }

        let mut batch = Vec::with_capacity(rows.len());
        for (seq, body) in rows {
            self.last_seq = seq;
            batch.push(decode_body(seq, &body));
        }
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }
}

/// Stored bodies are verbatim feed payloads; anything that is not a JSON
/// object becomes an empty document and is discarded downstream.
fn decode_body(seq: i64, body: &str) -> Document {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(seq, "stored document is not a JSON object");
            Document::new()
        }
        Err(e) => {
            warn!(seq, error = %e, "stored document is not valid JSON");
            Document::new()
        }
    }
}
