// src/store/mod.rs
//! Generic document-store seam used by the feed reader and the pipeline.
//!
//! Collections hold schemaless JSON objects. Backends only need to offer the
//! handful of operations below; everything else (validation, batching policy,
//! retries) lives with the callers.

pub mod memory;
pub mod readiness;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;
pub use readiness::wait_for_store;
pub use sqlite::SqliteStore;

/// One stored record: a JSON object.
pub type Document = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Health probe or connection attempt failed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unordered bulk write where some documents were not persisted
    #[error("bulk write persisted {inserted} documents, {failed} failed: {message}")]
    BulkWrite {
        inserted: u64,
        failed: u64,
        message: String,
    },

    #[error("cursor already closed")]
    CursorClosed,

    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Cheap reachability probe.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Number of documents in `collection`. Approximate values are acceptable.
    async fn count(&self, collection: &str) -> Result<u64, StoreError>;

    /// Remove every document in `collection`; returns how many were removed.
    async fn delete_all(&self, collection: &str) -> Result<u64, StoreError>;

    /// Open a batched read cursor over `collection` in insertion order.
    async fn cursor(
        &self,
        collection: &str,
        batch_size: usize,
    ) -> Result<Box<dyn DocumentCursor>, StoreError>;

    /// Insert as many documents as possible. A partial failure is reported as
    /// [`StoreError::BulkWrite`] carrying the number that did land.
    async fn bulk_insert_unordered(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<u64, StoreError>;

    /// Release connections. Idempotent.
    async fn close(&self) {}
}

#[async_trait]
pub trait DocumentCursor: Send {
    /// Next batch, or `None` once the collection is exhausted.
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>, StoreError>;

    /// Release the cursor whether or not it was exhausted.
    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Count that never fails the caller: errors are logged and reported as unknown.
pub async fn best_effort_count<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
) -> Option<u64> {
    match store.count(collection).await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::error!(error = %e, collection, "failed to count documents");
            None
        }
    }
}
