//! # Audit Log
//!
//! Best-effort activity records in the `auditLogs` collection. A failed
//! audit write is logged and swallowed: it never fails the operation that
//! triggered it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

use tally_core::{AuditEvent, Money};
use tally_store::document::to_document;
use tally_store::{Collection, DocumentStore};

use crate::error::EngineResult;

/// Writes audit events on behalf of one operator.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn DocumentStore>,
    user: String,
}

impl AuditLog {
    pub fn new(store: Arc<dyn DocumentStore>, user: impl Into<String>) -> Self {
        AuditLog {
            store,
            user: user.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Records `action`, optionally with an amount and the client involved.
    pub async fn record(&self, action: impl Into<String>, amount: Option<Money>, client: Option<&str>) {
        let mut event = AuditEvent::new(action, self.user.clone(), Utc::now());
        if let Some(amount) = amount {
            event = event.with_amount(amount);
        }
        if let Some(client) = client.filter(|c| !c.is_empty()) {
            event = event.with_client(client);
        }
        self.write(event).await;
    }

    async fn write(&self, event: AuditEvent) {
        let fields = match to_document(&event) {
            Ok(fields) => fields,
            Err(e) => {
                error!(error = %e, action = %event.action, "Failed to encode audit event");
                return;
            }
        };

        match self.store.add_document(Collection::AuditLogs, fields).await {
            Ok(key) => debug!(key = %key, action = %event.action, "Audit event recorded"),
            Err(e) => error!(error = %e, action = %event.action, "Failed to record audit event"),
        }
    }

    /// The newest `limit` events, newest first. Undecodable records are skipped.
    pub async fn recent(&self, limit: usize) -> EngineResult<Vec<AuditEvent>> {
        let docs = self.store.list_documents(Collection::AuditLogs).await?;
        let mut events: Vec<AuditEvent> = docs.iter().filter_map(|doc| doc.decode().ok()).collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::MemoryStore;

    #[tokio::test]
    async fn test_record_and_recent() {
        let store = MemoryStore::new();
        let audit = AuditLog::new(Arc::new(store.clone()), "owner@shop");

        audit.record("Added sale", Some(Money::from_major(100)), Some("Mona")).await;
        audit.record("Deleted customer", None, Some("")).await;

        let events = audit.recent(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.user == "owner@shop"));

        let sale = events.iter().find(|e| e.action == "Added sale").unwrap();
        assert_eq!(sale.amount, Some(Money::from_major(100)));
        assert_eq!(sale.client.as_deref(), Some("Mona"));

        let deleted = events.iter().find(|e| e.action == "Deleted customer").unwrap();
        assert_eq!(deleted.client, None);

        assert_eq!(audit.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let store = MemoryStore::new();
        store.fail_writes_after(0);
        let audit = AuditLog::new(Arc::new(store.clone()), "owner");

        audit.record("Added sale", None, None).await;
        assert_eq!(store.count(Collection::AuditLogs), 0);
        assert!(audit.recent(5).await.unwrap().is_empty());
    }
}
