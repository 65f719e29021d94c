//! # DocumentStore Contract
//!
//! The minimal keyed-document interface the engine depends on. Anything that
//! can fetch, write, query and watch JSON documents by key can back Tally.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    dyn DocumentStore (Send + Sync)                      │
//! │                                                                         │
//! │   get_document ─ list_documents ─ query_eq ─ query_contains             │
//! │   set_document ─ update_document ─ delete_document ─ add_document       │
//! │   subscribe ──► Subscription (snapshot stream + error channel)          │
//! │   batch() + commit ──► atomic multi-document write                      │
//! │                                                                         │
//! │   ┌────────────────┐                    ┌────────────────┐              │
//! │   │  MemoryStore   │                    │  SqliteStore   │              │
//! │   │  tests, demos  │                    │  sqlx + WAL    │              │
//! │   └────────────────┘                    └────────────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no optimistic concurrency: the last write to a key wins.

use async_trait::async_trait;
use serde_json::Value;

use crate::batch::WriteBatch;
use crate::document::{field_contains, field_equals, Collection, Document, StoredDocument};
use crate::error::StoreResult;
use crate::feed::Subscription;

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetches one document, `None` if absent.
    async fn get_document(&self, collection: Collection, key: &str) -> StoreResult<Option<Document>>;

    /// Every document of a collection, ordered by key.
    async fn list_documents(&self, collection: Collection) -> StoreResult<Vec<StoredDocument>>;

    /// Writes a document. With `merge` the given fields are laid over the
    /// existing ones; without it the document is replaced.
    async fn set_document(&self, collection: Collection, key: &str, fields: Document, merge: bool) -> StoreResult<()>;

    /// Overwrites the given top-level fields. Fails `NotFound` if absent.
    async fn update_document(&self, collection: Collection, key: &str, partial: Document) -> StoreResult<()>;

    /// Removes a document. Deleting a missing key is not an error.
    async fn delete_document(&self, collection: Collection, key: &str) -> StoreResult<()>;

    /// Stores a document under a freshly generated key and returns the key.
    async fn add_document(&self, collection: Collection, fields: Document) -> StoreResult<String>;

    /// Documents whose `field` equals `value`.
    async fn query_eq(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<StoredDocument>> {
        let docs = self.list_documents(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| field_equals(&doc.fields, field, value))
            .collect())
    }

    /// Documents whose array `field` contains `value`.
    async fn query_contains(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<StoredDocument>> {
        let docs = self.list_documents(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| field_contains(&doc.fields, field, value))
            .collect())
    }

    /// Opens a live subscription. The current snapshot is delivered first.
    async fn subscribe(&self, collection: Collection) -> StoreResult<Subscription>;

    /// Starts an empty batch.
    fn batch(&self) -> WriteBatch {
        WriteBatch::new()
    }

    /// Applies every write of the batch, or none of them.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}
