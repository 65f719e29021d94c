//! # Documents
//!
//! A document is a JSON object stored under a string key inside a named
//! collection.
//!
//! ```text
//! Collection::Customers
//! ├── "01001234567" → { "name": "Mona", "loyaltyPoints": 350, "tier": "Bronze", ... }
//! └── "01112345678" → { ... }
//!
//! Collection::Sales
//! └── "7c1e…" (uuid) → { "date": "2024-03-10", "price": 150, ... }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{StoreError, StoreResult};

/// Document body: top-level fields of a JSON object.
pub type Document = Map<String, Value>;

// =============================================================================
// Collection
// =============================================================================

/// The collections Tally reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Sales,
    Customers,
    Services,
    AuditLogs,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Sales,
        Collection::Customers,
        Collection::Services,
        Collection::AuditLogs,
    ];

    /// Name used as the persisted collection identifier.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Sales => "sales",
            Collection::Customers => "customers",
            Collection::Services => "services",
            Collection::AuditLogs => "auditLogs",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Serializes a value into a document body.
///
/// Fails unless the value serializes to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Deserializes a document body.
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc.clone()))?)
}

/// Builds a partial document from field/value pairs.
///
/// ## Example
/// ```rust
/// use serde_json::json;
/// use tally_store::document::fields;
///
/// let partial = fields([("loyaltyPoints", json!(350))]);
/// assert_eq!(partial["loyaltyPoints"], json!(350));
/// ```
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Document {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Overwrites top-level fields of `target` with those of `partial`.
pub fn merge_into(target: &mut Document, partial: Document) {
    for (key, value) in partial {
        target.insert(key, value);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Field Predicates
// =============================================================================

/// `where field == value`
pub fn field_equals(doc: &Document, field: &str, value: &Value) -> bool {
    doc.get(field) == Some(value)
}

/// `where field array-contains value`
pub fn field_contains(doc: &Document, field: &str, value: &Value) -> bool {
    matches!(doc.get(field), Some(Value::Array(items)) if items.contains(value))
}

// =============================================================================
// Stored Documents & Snapshots
// =============================================================================

/// A document together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub fields: Document,
}

impl StoredDocument {
    pub fn new(key: impl Into<String>, fields: Document) -> Self {
        StoredDocument {
            key: key.into(),
            fields,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        from_document(&self.fields)
    }
}

/// The full content of a collection at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub collection: Collection,
    /// Ordered by key.
    pub documents: Vec<StoredDocument>,
}

impl CollectionSnapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        loyalty_points: i64,
        tags: Vec<String>,
    }

    #[test]
    fn test_round_trip_through_document() {
        let sample = Sample {
            loyalty_points: 350,
            tags: vec!["vip".to_string()],
        };
        let doc = to_document(&sample).unwrap();
        assert_eq!(doc["loyaltyPoints"], json!(350));
        assert_eq!(from_document::<Sample>(&doc).unwrap(), sample);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(matches!(
            to_document(&42),
            Err(StoreError::Serialization(msg)) if msg.contains("a number")
        ));
    }

    #[test]
    fn test_merge_and_predicates() {
        let mut doc = fields([("name", json!("Mona")), ("tags", json!(["vip", "مستورد"]))]);
        merge_into(&mut doc, fields([("name", json!("Mona A."))]));
        assert_eq!(doc["name"], json!("Mona A."));
        assert!(doc.contains_key("tags"));

        assert!(field_equals(&doc, "name", &json!("Mona A.")));
        assert!(!field_equals(&doc, "missing", &json!(null)));
        assert!(field_contains(&doc, "tags", &json!("مستورد")));
        assert!(!field_contains(&doc, "name", &json!("Mona A.")));
    }
}
