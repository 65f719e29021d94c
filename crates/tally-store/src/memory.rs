//! # In-Memory Store
//!
//! A `DocumentStore` held entirely in process memory, with the same change
//! feed and batch semantics as the SQLite backend. Used by tests, demos and
//! dry runs of bulk jobs.
//!
//! ## Failure Injection
//! ```text
//! store.fail_writes_after(1);
//!   write #1  ──► Ok
//!   write #2  ──► Err(Unavailable)   (nothing applied)
//!   write #3  ──► Err(Unavailable)
//! store.clear_failures();
//! ```
//! Every `set`/`update`/`delete`/`add` call and every batch `commit` counts as
//! one write. Reads never fail.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::batch::{WriteBatch, WriteOp};
use crate::document::{merge_into, Collection, CollectionSnapshot, Document, StoredDocument};
use crate::error::{StoreError, StoreResult};
use crate::feed::{FeedHub, Subscription};
use crate::store::DocumentStore;

type Data = HashMap<Collection, BTreeMap<String, Document>>;

#[derive(Debug, Default)]
struct Inner {
    data: Mutex<Data>,
    feeds: FeedHub,
    /// Remaining successful writes before injected failures start.
    write_budget: Mutex<Option<usize>>,
}

/// Shared in-memory document store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Lets `n` more writes succeed, then fails every write with `Unavailable`.
    pub fn fail_writes_after(&self, n: usize) {
        *lock(&self.inner.write_budget) = Some(n);
    }

    pub fn clear_failures(&self) {
        *lock(&self.inner.write_budget) = None;
    }

    /// Pushes an error to every subscriber of `collection`.
    pub fn emit_error(&self, collection: Collection, error: StoreError) {
        self.inner.feeds.publish(collection, Err(error));
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: Collection) -> usize {
        lock(&self.inner.data).get(&collection).map_or(0, BTreeMap::len)
    }

    fn take_write_budget(&self) -> StoreResult<()> {
        let mut budget = lock(&self.inner.write_budget);
        match budget.as_mut() {
            Some(0) => Err(StoreError::Unavailable("injected write failure".to_string())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn snapshot(&self, collection: Collection) -> CollectionSnapshot {
        let data = lock(&self.inner.data);
        let documents = data
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, fields)| StoredDocument::new(key.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        CollectionSnapshot {
            collection,
            documents,
        }
    }

    fn notify(&self, collections: &[Collection]) {
        for &collection in collections {
            if self.inner.feeds.has_subscribers(collection) {
                let snapshot = self.snapshot(collection);
                debug!(collection = %collection, documents = snapshot.len(), "Publishing snapshot");
                self.inner.feeds.publish(collection, Ok(Arc::new(snapshot)));
            }
        }
    }

    /// Applies ops to a scratch copy and swaps it in only if all succeed.
    fn write(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        self.take_write_budget()?;

        let touched = WriteBatch::from(ops.clone()).collections();
        {
            let mut data = lock(&self.inner.data);
            let mut scratch = data.clone();
            for op in ops {
                apply(&mut scratch, op)?;
            }
            *data = scratch;
        }

        self.notify(&touched);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn apply(data: &mut Data, op: WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::Set {
            collection,
            key,
            fields,
            merge,
        } => {
            let docs = data.entry(collection).or_default();
            match docs.get_mut(&key) {
                Some(existing) if merge => merge_into(existing, fields),
                _ => {
                    docs.insert(key, fields);
                }
            }
        }
        WriteOp::Update {
            collection,
            key,
            fields,
        } => {
            let existing = data
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(&key))
                .ok_or_else(|| StoreError::not_found(collection, key.clone()))?;
            merge_into(existing, fields);
        }
        WriteOp::Delete { collection, key } => {
            if let Some(docs) = data.get_mut(&collection) {
                docs.remove(&key);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(&self, collection: Collection, key: &str) -> StoreResult<Option<Document>> {
        Ok(lock(&self.inner.data)
            .get(&collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn list_documents(&self, collection: Collection) -> StoreResult<Vec<StoredDocument>> {
        Ok(self.snapshot(collection).documents)
    }

    async fn set_document(&self, collection: Collection, key: &str, fields: Document, merge: bool) -> StoreResult<()> {
        self.write(vec![WriteOp::Set {
            collection,
            key: key.to_string(),
            fields,
            merge,
        }])
    }

    async fn update_document(&self, collection: Collection, key: &str, partial: Document) -> StoreResult<()> {
        self.write(vec![WriteOp::Update {
            collection,
            key: key.to_string(),
            fields: partial,
        }])
    }

    async fn delete_document(&self, collection: Collection, key: &str) -> StoreResult<()> {
        self.write(vec![WriteOp::Delete {
            collection,
            key: key.to_string(),
        }])
    }

    async fn add_document(&self, collection: Collection, fields: Document) -> StoreResult<String> {
        let key = Uuid::new_v4().to_string();
        self.write(vec![WriteOp::Set {
            collection,
            key: key.clone(),
            fields,
            merge: false,
        }])?;
        Ok(key)
    }

    async fn subscribe(&self, collection: Collection) -> StoreResult<Subscription> {
        let receiver = self.inner.feeds.receiver(collection);
        let initial = Arc::new(self.snapshot(collection));
        Ok(Subscription::new(collection, Ok(initial), receiver))
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.write(batch.into_iter().collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fields;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_and_merge() {
        let store = MemoryStore::new();
        store
            .set_document(Collection::Customers, "010", fields([("name", json!("Mona")), ("loyaltyPoints", json!(250))]), false)
            .await
            .unwrap();
        store
            .set_document(Collection::Customers, "010", fields([("loyaltyPoints", json!(300))]), true)
            .await
            .unwrap();

        let doc = store.get_document(Collection::Customers, "010").await.unwrap().unwrap();
        assert_eq!(doc["name"], json!("Mona"));
        assert_eq!(doc["loyaltyPoints"], json!(300));

        store
            .set_document(Collection::Customers, "010", fields([("name", json!("Replaced"))]), false)
            .await
            .unwrap();
        let doc = store.get_document(Collection::Customers, "010").await.unwrap().unwrap();
        assert!(doc.get("loyaltyPoints").is_none());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_document(Collection::Customers, "nobody", fields([("tier", json!("Gold"))]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.count(Collection::Customers), 0);
    }

    #[tokio::test]
    async fn test_add_and_queries() {
        let store = MemoryStore::new();
        let key = store
            .add_document(Collection::Sales, fields([("whatsappNumber", json!("010")), ("price", json!(100))]))
            .await
            .unwrap();
        store
            .add_document(Collection::Sales, fields([("whatsappNumber", json!("011"))]))
            .await
            .unwrap();
        store
            .set_document(Collection::Customers, "010", fields([("tags", json!(["مستورد"]))]), false)
            .await
            .unwrap();

        let hits = store.query_eq(Collection::Sales, "whatsappNumber", &json!("010")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, key);

        let tagged = store.query_contains(Collection::Customers, "tags", &json!("مستورد")).await.unwrap();
        assert_eq!(tagged.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = MemoryStore::new();
        store
            .set_document(Collection::Sales, "s1", fields([("price", json!(1))]), false)
            .await
            .unwrap();

        let mut batch = store.batch();
        batch
            .delete(Collection::Sales, "s1")
            .update(Collection::Customers, "missing", fields([("tier", json!("Gold"))]));
        assert!(store.commit(batch).await.unwrap_err().is_not_found());
        assert_eq!(store.count(Collection::Sales), 1);

        let mut batch = store.batch();
        batch
            .set(Collection::Customers, "010", fields([("name", json!("A"))]), false)
            .update(Collection::Customers, "010", fields([("tier", json!("Gold"))]))
            .delete(Collection::Sales, "s1");
        store.commit(batch).await.unwrap();
        assert_eq!(store.count(Collection::Sales), 0);
        let doc = store.get_document(Collection::Customers, "010").await.unwrap().unwrap();
        assert_eq!(doc["tier"], json!("Gold"));
    }

    #[tokio::test]
    async fn test_subscription_receives_full_snapshots() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Collection::Sales).await.unwrap();
        let initial = sub.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        store
            .set_document(Collection::Sales, "a", fields([("price", json!(1))]), false)
            .await
            .unwrap();
        store
            .set_document(Collection::Sales, "b", fields([("price", json!(2))]), false)
            .await
            .unwrap();

        assert_eq!(sub.next().await.unwrap().unwrap().len(), 1);
        let latest = sub.next().await.unwrap().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest.documents[1].key, "b");

        store.emit_error(Collection::Sales, StoreError::Unavailable("offline".to_string()));
        assert!(sub.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_injected_write_failures() {
        let store = MemoryStore::new();
        store.fail_writes_after(1);
        store
            .set_document(Collection::Sales, "a", Document::new(), false)
            .await
            .unwrap();
        let err = store
            .set_document(Collection::Sales, "b", Document::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.count(Collection::Sales), 1);

        store.clear_failures();
        store.delete_document(Collection::Sales, "a").await.unwrap();
        assert_eq!(store.count(Collection::Sales), 0);
    }
}
