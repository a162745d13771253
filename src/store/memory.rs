// src/store/memory.rs
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Document, DocumentCursor, DocumentStore, StoreError};

/// In-process store. Used by tests and offline runs; the builder methods
/// inject failures at each seam of the store contract.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    open_cursors: Arc<AtomicUsize>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Vec<Document>>,
    probes: u32,
    unreachable_probes: u32,
    insert_calls: usize,
    failing_insert_calls: HashSet<usize>,
    reject_marker: Option<String>,
    fail_counts: bool,
    fail_cursor_after: Option<usize>,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I>(self, collection: &str, docs: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        self.insert_raw(collection, docs);
        self
    }

    /// Health probes fail until `probes` attempts have been made.
    pub fn unreachable_for(self, probes: u32) -> Self {
        self.lock().unreachable_probes = probes;
        self
    }

    /// The `call`-th bulk insert (1-based) fails as a whole.
    pub fn fail_insert_call(self, call: usize) -> Self {
        self.lock().failing_insert_calls.insert(call);
        self
    }

    /// Documents carrying `field` are rejected individually during bulk inserts.
    pub fn reject_documents_with(self, field: &str) -> Self {
        self.lock().reject_marker = Some(field.to_string());
        self
    }

    pub fn fail_counts(self) -> Self {
        self.lock().fail_counts = true;
        self
    }

    /// Cursors error out after serving `batches` batches.
    pub fn fail_cursor_after(self, batches: usize) -> Self {
        self.lock().fail_cursor_after = Some(batches);
        self
    }

    pub fn insert_raw<I>(&self, collection: &str, docs: I)
    where
        I: IntoIterator<Item = Document>,
    {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
    }

    /// Snapshot of a collection in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn probes(&self) -> u32 {
        self.lock().probes
    }

    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }

    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.probes += 1;
        if inner.probes <= inner.unreachable_probes {
            return Err(StoreError::Unavailable(format!(
                "probe {} refused",
                inner.probes
            )));
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let inner = self.lock();
        if inner.fail_counts {
            return Err(StoreError::Backend("count refused".into()));
        }
        Ok(inner.collections.get(collection).map_or(0, |c| c.len()) as u64)
    }

    async fn delete_all(&self, collection: &str) -> Result<u64, StoreError> {
        let removed = self
            .lock()
            .collections
            .remove(collection)
            .map_or(0, |c| c.len());
        Ok(removed as u64)
    }

    async fn cursor(
        &self,
        collection: &str,
        batch_size: usize,
    ) -> Result<Box<dyn DocumentCursor>, StoreError> {
        let inner = self.lock();
        let docs = inner
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default();
        let batches: VecDeque<Vec<Document>> = docs
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            batches,
            served: 0,
            fail_after: inner.fail_cursor_after,
            open_cursors: Arc::clone(&self.open_cursors),
            closed: false,
        }))
    }

    async fn bulk_insert_unordered(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        inner.insert_calls += 1;
        let call = inner.insert_calls;
        if inner.failing_insert_calls.contains(&call) {
            return Err(StoreError::Backend(format!(
                "bulk insert call {call} rejected"
            )));
        }

        let marker = inner.reject_marker.clone();
        let (rejected, accepted): (Vec<Document>, Vec<Document>) = docs
            .into_iter()
            .partition(|d| marker.as_ref().is_some_and(|m| d.contains_key(m)));

        let inserted = accepted.len() as u64;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(accepted);

        if rejected.is_empty() {
            Ok(inserted)
        } else {
            Err(StoreError::BulkWrite {
                inserted,
                failed: rejected.len() as u64,
                message: "documents rejected by store".into(),
            })
        }
    }

    async fn close(&self) {
        self.lock().closed = true;
    }
}

struct MemoryCursor {
    batches: VecDeque<Vec<Document>>,
    served: usize,
    fail_after: Option<usize>,
    open_cursors: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>, StoreError> {
        if self.closed {
            return Err(StoreError::CursorClosed);
        }
        if self.fail_after.is_some_and(|n| self.served >= n) {
            return Err(StoreError::Backend("cursor lost".into()));
        }
        let next = self.batches.pop_front();
        if next.is_some() {
            self.served += 1;
        }
        Ok(next)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if !self.closed {
            self.closed = true;
            self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        if !self.closed {
            self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(n: i64) -> Document {
        json!({ "n": n }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn cursor_serves_fixed_size_batches_in_order() {
        let store = MemoryStore::new().with_documents("raw", (0..5).map(doc));
        let mut cur = store.cursor("raw", 2).await.unwrap();
        let mut sizes = Vec::new();
        while let Some(b) = cur.next_batch().await.unwrap() {
            sizes.push(b.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(store.open_cursors(), 1);
        cur.close().await.unwrap();
        assert_eq!(store.open_cursors(), 0);
        assert!(matches!(cur.next_batch().await, Err(StoreError::CursorClosed)));
    }

    #[tokio::test]
    async fn rejected_documents_surface_as_aggregate_error() {
        let store = MemoryStore::new().reject_documents_with("bad");
        let mut bad = doc(2);
        bad.insert("bad".into(), json!(true));
        let err = store
            .bulk_insert_unordered("out", vec![doc(1), bad, doc(3)])
            .await
            .unwrap_err();
        match err {
            StoreError::BulkWrite {
                inserted, failed, ..
            } => {
                assert_eq!(inserted, 2);
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.documents("out").len(), 2);
    }

    #[tokio::test]
    async fn probes_fail_until_budget_spent() {
        let store = MemoryStore::new().unreachable_for(2);
        assert!(store.health_check().await.is_err());
        assert!(store.health_check().await.is_err());
        assert!(store.health_check().await.is_ok());
        assert_eq!(store.probes(), 3);
    }
}
