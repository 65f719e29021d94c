//! # Application State
//!
//! The in-memory picture of the store: every sale, every customer, and the
//! per-customer aggregates derived from both. It changes only when a full
//! collection snapshot arrives from the change feed.
//!
//! ## Snapshot Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sales snapshot ─────► apply_sales_snapshot() ─────┐                    │
//! │                                                    ├─► recompute()      │
//! │  customers snapshot ─► apply_customers_snapshot() ─┘      │             │
//! │                                                           ▼             │
//! │                         views = aggregate(sales, customers)             │
//! │                         tier_changes(views) ──► Vec<TierChange>         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tier changes are only reported once both collections have been seen, so
//! a customers snapshot arriving before the sales never reads as a demotion.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use tally_core::ledger_view::{aggregate, tier_changes};
use tally_core::{Customer, CustomerView, Sale, TierChange};
use tally_store::{Collection, CollectionSnapshot, StoredDocument};

// =============================================================================
// AppState
// =============================================================================

#[derive(Debug, Default)]
pub struct AppState {
    /// Newest first.
    sales: Vec<Sale>,
    customers: BTreeMap<String, Customer>,
    views: BTreeMap<String, CustomerView>,
    sales_loaded: bool,
    customers_loaded: bool,
}

impl AppState {
    pub fn new() -> Self {
        AppState::default()
    }

    /// Replaces every sale with the snapshot's content.
    pub fn apply_sales_snapshot(&mut self, snapshot: &CollectionSnapshot) -> Vec<TierChange> {
        let mut sales = decode_sales(&snapshot.documents);
        sales.sort_by(|a, b| b.date.cmp(&a.date));

        debug!(count = sales.len(), "Applied sales snapshot");
        self.sales = sales;
        self.sales_loaded = true;
        self.recompute()
    }

    /// Replaces every customer with the snapshot's content.
    pub fn apply_customers_snapshot(&mut self, snapshot: &CollectionSnapshot) -> Vec<TierChange> {
        let customers = decode_customers(&snapshot.documents);

        debug!(count = customers.len(), "Applied customers snapshot");
        self.customers = customers;
        self.customers_loaded = true;
        self.recompute()
    }

    /// Dispatches on the snapshot's collection. Other collections are ignored.
    pub fn apply_snapshot(&mut self, snapshot: &CollectionSnapshot) -> Vec<TierChange> {
        match snapshot.collection {
            Collection::Sales => self.apply_sales_snapshot(snapshot),
            Collection::Customers => self.apply_customers_snapshot(snapshot),
            Collection::Services | Collection::AuditLogs => Vec::new(),
        }
    }

    fn recompute(&mut self) -> Vec<TierChange> {
        self.views = aggregate(&self.sales, &self.customers);

        if self.is_loaded() {
            tier_changes(&self.views)
        } else {
            Vec::new()
        }
    }

    /// Both collections have been seen at least once.
    pub fn is_loaded(&self) -> bool {
        self.sales_loaded && self.customers_loaded
    }

    pub fn sales(&self) -> &[Sale] {
        &self.sales
    }

    pub fn sale(&self, id: &str) -> Option<&Sale> {
        self.sales.iter().find(|s| s.id == id)
    }

    pub fn customers(&self) -> &BTreeMap<String, Customer> {
        &self.customers
    }

    pub fn customer(&self, contact: &str) -> Option<&Customer> {
        self.customers.get(contact)
    }

    pub fn views(&self) -> &BTreeMap<String, CustomerView> {
        &self.views
    }

    pub fn view(&self, contact: &str) -> Option<&CustomerView> {
        self.views.get(contact)
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decodes sale documents, taking each id from its key. Bad documents are
/// logged and skipped.
pub(crate) fn decode_sales(documents: &[StoredDocument]) -> Vec<Sale> {
    documents
        .iter()
        .filter_map(|doc| match doc.decode::<Sale>() {
            Ok(mut sale) => {
                sale.id = doc.key.clone();
                Some(sale)
            }
            Err(e) => {
                warn!(key = %doc.key, error = %e, "Skipping undecodable sale");
                None
            }
        })
        .collect()
}

/// Decodes customer documents keyed by contact. The key wins over any
/// `whatsappNumber` stored in the body.
pub(crate) fn decode_customers(documents: &[StoredDocument]) -> BTreeMap<String, Customer> {
    documents
        .iter()
        .filter_map(|doc| match doc.decode::<Customer>() {
            Ok(mut customer) => {
                customer.whatsapp_number = doc.key.clone();
                Some((doc.key.clone(), customer))
            }
            Err(e) => {
                warn!(key = %doc.key, error = %e, "Skipping undecodable customer");
                None
            }
        })
        .collect()
}

// =============================================================================
// Shared Handle
// =============================================================================

/// Cheaply cloneable shared access to the state.
///
/// Guards must not be held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<AppState>>,
}

impl StateHandle {
    pub fn new() -> Self {
        StateHandle::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, AppState> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, AppState> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
