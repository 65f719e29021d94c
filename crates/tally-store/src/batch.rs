//! # Write Batches
//!
//! A batch groups writes that must land together: either every operation is
//! applied or none is.

use crate::document::{Collection, Document};

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        collection: Collection,
        key: String,
        fields: Document,
        merge: bool,
    },
    /// Fails the batch if the document does not exist.
    Update {
        collection: Collection,
        key: String,
        fields: Document,
    },
    Delete {
        collection: Collection,
        key: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Set { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. } => *collection,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            WriteOp::Set { key, .. } | WriteOp::Update { key, .. } | WriteOp::Delete { key, .. } => key,
        }
    }
}

/// An ordered list of writes committed atomically by
/// [`DocumentStore::commit`](crate::DocumentStore::commit).
///
/// ## Example
/// ```rust
/// use serde_json::json;
/// use tally_store::{document::fields, Collection, WriteBatch};
///
/// let mut batch = WriteBatch::new();
/// batch
///     .update(Collection::Customers, "01001234567", fields([("loyaltyPoints", json!(0))]))
///     .delete(Collection::Sales, "s-1");
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch::default()
    }

    pub fn set(&mut self, collection: Collection, key: impl Into<String>, fields: Document, merge: bool) -> &mut Self {
        self.ops.push(WriteOp::Set {
            collection,
            key: key.into(),
            fields,
            merge,
        });
        self
    }

    pub fn update(&mut self, collection: Collection, key: impl Into<String>, fields: Document) -> &mut Self {
        self.ops.push(WriteOp::Update {
            collection,
            key: key.into(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: Collection, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection,
            key: key.into(),
        });
        self
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Distinct collections touched, in first-seen order.
    pub fn collections(&self) -> Vec<Collection> {
        let mut seen = Vec::new();
        for op in &self.ops {
            let collection = op.collection();
            if !seen.contains(&collection) {
                seen.push(collection);
            }
        }
        seen
    }
}

impl From<Vec<WriteOp>> for WriteBatch {
    fn from(ops: Vec<WriteOp>) -> Self {
        WriteBatch { ops }
    }
}

impl IntoIterator for WriteBatch {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
