//! # Loyalty Engine
//!
//! The controller behind every dashboard action that touches sales,
//! customers or points. Each entry point validates its input, reads the
//! current documents from the store, asks `tally_core::loyalty` what should
//! change, and writes the result.
//!
//! ## Sale Save Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  on_sale_saved(form, editing_id, pending)                               │
//! │                                                                         │
//! │  1. Sale::from_form()          ──► ValidationError (nothing written)    │
//! │  2. read previous sale + customers                                      │
//! │  3. re-check pending redemption ──► OverRedemption (nothing written)    │
//! │  4. write sale                  ──► StoreError (nothing written)        │
//! │  5. plan_sale_saved() + redemption debit ──► one batch                  │
//! │        └─ failure ──► SaveOutcome.loyalty_error (sale stays written)    │
//! │  6. audit event (best effort)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State
//! The engine never patches [`AppState`](crate::state::AppState) after a
//! write. The view moves only when a snapshot arrives, through
//! [`LoyaltyEngine::apply_snapshot`] or [`LoyaltyEngine::refresh_from_store`].
//!
//! ## Concurrency
//! One logical writer is assumed. Balance updates are read-modify-write
//! without version checks, so the last write to a customer wins.

use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use tally_core::catalog::normalize_service;
use tally_core::loyalty::{
    apply_delta, grant_bonus, plan_cash_back, plan_sale_deleted, plan_sale_saved, reconcile,
    redeem_for_discount, LedgerEntry, LoyaltyPolicy, PendingRedemption, PointsCorrection,
};
use tally_core::validation::{
    normalize_contact, require_contact, validate_points, validate_required_text, validate_tag,
};
use tally_core::{
    Customer, CustomerNote, Money, PaymentStatus, Sale, SaleForm, Service, TagChange, Tier,
    TierChange, ValidationError,
};
use tally_store::document::{fields, from_document, to_document};
use tally_store::{Collection, CollectionSnapshot, DocumentStore, StoreError, StoreResult, WriteOp};

use crate::audit::AuditLog;
use crate::batch::{BatchReport, BatchRunner};
use crate::config::TallyConfig;
use crate::error::{EngineError, EngineResult};
use crate::import::ImportRow;
use crate::state::{decode_customers, decode_sales, StateHandle};

/// Audit user when none is configured.
const SYSTEM_USER: &str = "system";

// =============================================================================
// Outcomes
// =============================================================================

/// Result of saving a sale.
///
/// The sale itself is always committed when this is returned. A failure of
/// the points update that follows is reported in `loyalty_error`; running
/// reconciliation repairs the balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub sale_id: String,
    /// Net balance change applied to the sale's contact. For a newly created
    /// customer this is the opening balance.
    pub points_delta: i64,
    /// Net balance change of every contact the save touched, including the
    /// previous contact of an edited sale that moved or lost its contact.
    pub balance_changes: BTreeMap<String, i64>,
    pub created_customer: bool,
    /// Points debited by a discount redemption, 0 if none applied.
    pub redeemed_points: i64,
    pub loyalty_error: Option<String>,
}

/// Result of deleting a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub sale_id: String,
    pub points_reversed: i64,
    pub loyalty_error: Option<String>,
}

/// Result of a cash-back redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CashBackOutcome {
    /// Key of the negative refund sale.
    pub sale_id: String,
    pub cash_value: Money,
    pub remaining_points: i64,
}

/// Result of a full points reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Balances actually rewritten.
    pub updated_count: usize,
    pub corrections: Vec<PointsCorrection>,
    pub batch: BatchReport,
}

// =============================================================================
// Engine
// =============================================================================

/// The loyalty controller.
#[derive(Clone)]
pub struct LoyaltyEngine {
    store: Arc<dyn DocumentStore>,
    policy: LoyaltyPolicy,
    import_tag: String,
    batches: BatchRunner,
    audit: AuditLog,
    state: StateHandle,
}

impl LoyaltyEngine {
    /// Creates an engine over `store`, auditing as the system user.
    pub fn new(store: Arc<dyn DocumentStore>, config: &TallyConfig) -> Self {
        LoyaltyEngine {
            policy: config.policy(),
            import_tag: config.loyalty.import_tag.clone(),
            batches: BatchRunner::new(store.clone(), &config.batch),
            audit: AuditLog::new(store.clone(), SYSTEM_USER),
            state: StateHandle::new(),
            store,
        }
    }

    /// Attributes audit events to `user`.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.audit = AuditLog::new(self.store.clone(), user);
        self
    }

    pub fn policy(&self) -> &LoyaltyPolicy {
        &self.policy
    }

    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    // =========================================================================
    // Sales
    // =========================================================================

    /// Saves a new or edited sale and moves the points it earns.
    ///
    /// ## Arguments
    /// * `form` - dashboard input, validated before anything is read or written
    /// * `editing_id` - key of the sale being edited, `None` to create
    /// * `pending` - a discount redemption taken while filling the form; it is
    ///   debited only if the saved sale still carries the same contact
    pub async fn on_sale_saved(
        &self,
        form: &SaleForm,
        editing_id: Option<&str>,
        pending: Option<PendingRedemption>,
    ) -> EngineResult<SaveOutcome> {
        let mut sale = Sale::from_form(form, false)?;

        let previous = match editing_id {
            Some(id) => Some(self.load_sale(id).await?),
            None => None,
        };

        let contact = sale.whatsapp_number.clone();
        let customer = match contact.as_deref() {
            Some(c) => self.find_customer(c).await?,
            None => None,
        };
        let previous_customer = match previous.as_ref().and_then(|p| p.whatsapp_number.as_deref()) {
            Some(old) if Some(old) != contact.as_deref() => self.find_customer(old).await?,
            _ => None,
        };

        let redemption = match pending {
            Some(p) if contact.as_deref() == Some(p.contact.as_str()) => match &customer {
                Some(c) => {
                    redeem_for_discount(&self.policy, c, p.points)?;
                    Some(p)
                }
                None => {
                    warn!(contact = %p.contact, "Redeeming customer no longer exists, discarding redemption");
                    None
                }
            },
            Some(p) => {
                warn!(
                    contact = %p.contact,
                    points = p.points,
                    "Sale no longer carries the redeeming contact, discarding redemption"
                );
                None
            }
            None => None,
        };
        sale.is_redemption = redemption.is_some() || previous.as_ref().is_some_and(|p| p.is_redemption);

        let body = to_document(&sale)?;
        let sale_id = match editing_id {
            Some(id) => {
                self.store.set_document(Collection::Sales, id, body, false).await?;
                id.to_string()
            }
            None => self.store.add_document(Collection::Sales, body).await?,
        };
        sale.id = sale_id.clone();
        info!(
            sale_id = %sale_id,
            edit = editing_id.is_some(),
            price = %sale.price,
            redemption = sale.is_redemption,
            "Sale saved"
        );

        let entries = plan_sale_saved(
            &self.policy,
            previous.as_ref(),
            &sale,
            customer.as_ref(),
            previous_customer.as_ref(),
        );

        let mut outcome = SaveOutcome {
            sale_id,
            points_delta: 0,
            balance_changes: BTreeMap::new(),
            created_customer: false,
            redeemed_points: 0,
            loyalty_error: None,
        };

        let known: Vec<&Customer> = customer.iter().chain(previous_customer.iter()).collect();
        match self.apply_ledger(&entries, redemption.as_ref(), &known).await {
            Ok(applied) => {
                outcome.created_customer = applied.created;
                outcome.redeemed_points = redemption.as_ref().map_or(0, |p| p.points);
                outcome.points_delta = contact
                    .as_deref()
                    .and_then(|c| applied.changes.get(c))
                    .copied()
                    .unwrap_or(0);
                outcome.balance_changes = applied.changes;
            }
            Err(e) => {
                error!(
                    sale_id = %outcome.sale_id,
                    error = %e,
                    "Sale saved but loyalty update failed; reconciliation will repair the balance"
                );
                outcome.loyalty_error = Some(e.to_string());
            }
        }

        let action = if editing_id.is_some() { "Updated sale" } else { "Added sale" };
        self.audit
            .record(action, Some(sale.price), Some(&sale.client_name))
            .await;
        if let (Some(p), None) = (&redemption, &outcome.loyalty_error) {
            self.audit
                .record(
                    format!("Redeemed {} points for a discount", p.points),
                    Some(p.discount),
                    Some(&sale.client_name),
                )
                .await;
        }

        Ok(outcome)
    }

    /// Deletes a sale and gives back the points it earned.
    pub async fn on_sale_deleted(&self, sale_id: &str) -> EngineResult<DeleteOutcome> {
        let sale = self.load_sale(sale_id).await?;
        let customer = match sale.whatsapp_number.as_deref() {
            Some(c) => self.find_customer(c).await?,
            None => None,
        };

        self.store.delete_document(Collection::Sales, sale_id).await?;
        info!(sale_id, "Sale deleted");

        let mut outcome = DeleteOutcome {
            sale_id: sale_id.to_string(),
            points_reversed: 0,
            loyalty_error: None,
        };

        if let (Some(LedgerEntry::Adjust { contact, delta }), Some(customer)) =
            (plan_sale_deleted(&self.policy, &sale, customer.as_ref()), customer.as_ref())
        {
            let balance = apply_delta(customer.loyalty_points, delta);
            let update = fields([("loyaltyPoints", json!(balance))]);
            match self.store.update_document(Collection::Customers, &contact, update).await {
                Ok(()) => {
                    outcome.points_reversed = customer.loyalty_points - balance;
                    info!(contact = %contact, points = outcome.points_reversed, "Points reversed");
                }
                Err(e) => {
                    error!(contact = %contact, error = %e, "Sale deleted but points reversal failed");
                    outcome.loyalty_error = Some(e.to_string());
                }
            }
        }

        self.audit
            .record("Deleted sale", Some(sale.price), Some(&sale.client_name))
            .await;
        Ok(outcome)
    }

    /// Marks an unpaid sale as paid. Already-paid sales are left alone.
    pub async fn on_sale_marked_paid(&self, sale_id: &str) -> EngineResult<()> {
        let sale = self.load_sale(sale_id).await?;
        if !sale.is_unpaid() {
            debug!(sale_id, "Sale already paid");
            return Ok(());
        }

        let update = fields([("paymentStatus", encode(&PaymentStatus::Paid)?)]);
        self.store.update_document(Collection::Sales, sale_id, update).await?;
        info!(sale_id, amount = %sale.price, "Payment received");

        self.audit
            .record("Payment received", Some(sale.price), Some(&sale.client_name))
            .await;
        Ok(())
    }

    // =========================================================================
    // Redemption & Bonus
    // =========================================================================

    /// Prices a discount redemption without writing anything.
    ///
    /// The returned value is handed back to [`Self::on_sale_saved`].
    pub async fn on_redeem_for_discount(&self, contact: &str, points: i64) -> EngineResult<PendingRedemption> {
        validate_points(points)?;
        let contact = require_contact(contact)?;
        let customer = self.load_customer(&contact).await?;

        let pending = redeem_for_discount(&self.policy, &customer, points)?;
        debug!(contact = %contact, points, discount = %pending.discount, "Discount redemption pending");
        Ok(pending)
    }

    /// Pays out points as cash: debits the balance and records a negative
    /// refund sale, atomically.
    pub async fn on_cash_back_redeem(&self, contact: &str, points: i64) -> EngineResult<CashBackOutcome> {
        validate_points(points)?;
        let contact = require_contact(contact)?;
        let customer = self.load_customer(&contact).await?;

        let plan = plan_cash_back(&self.policy, &customer, points, today())?;
        let sale_id = Uuid::new_v4().to_string();

        let mut batch = self.store.batch();
        batch
            .update(
                Collection::Customers,
                contact.clone(),
                fields([("loyaltyPoints", json!(plan.new_balance))]),
            )
            .set(Collection::Sales, sale_id.clone(), to_document(&plan.sale)?, false);
        self.store.commit(batch).await?;

        info!(contact = %contact, points, value = %plan.value, "Cash back redeemed");
        self.audit
            .record(
                format!("Cash back of {} points", points),
                Some(plan.value),
                Some(&customer.name),
            )
            .await;

        Ok(CashBackOutcome {
            sale_id,
            cash_value: plan.value,
            remaining_points: plan.new_balance,
        })
    }

    /// Adds bonus points with a note explaining why. Returns the new balance.
    pub async fn on_bonus_grant(&self, contact: &str, points: i64, reason: &str) -> EngineResult<u64> {
        validate_points(points)?;
        let contact = require_contact(contact)?;
        let customer = self.load_customer(&contact).await?;

        let grant = grant_bonus(&customer, points, reason, Utc::now())?;
        let mut notes = customer.notes.clone();
        notes.push(grant.note);

        let update = fields([
            ("loyaltyPoints", json!(grant.new_balance)),
            ("notes", encode(&notes)?),
        ]);
        self.store.update_document(Collection::Customers, &contact, update).await?;

        info!(contact = %contact, points, balance = grant.new_balance, "Bonus points granted");
        self.audit
            .record(format!("Granted {} bonus points", points), None, Some(&customer.name))
            .await;

        Ok(u64::try_from(grant.new_balance).unwrap_or(0))
    }

    // =========================================================================
    // Customers
    // =========================================================================

    /// Creates a customer by hand with the starting balance.
    ///
    /// Rejected with `Duplicate` if the contact already exists.
    pub async fn on_customer_added(&self, name: &str, contact: &str) -> EngineResult<Customer> {
        let name = validate_required_text("name", name)?;
        let contact = require_contact(contact)?;

        if self.find_customer(&contact).await?.is_some() {
            return Err(ValidationError::Duplicate {
                field: "whatsappNumber".to_string(),
                value: contact,
            }
            .into());
        }

        let customer = Customer::new(contact.clone(), name, self.policy.starting_points);
        self.store
            .set_document(Collection::Customers, &contact, to_document(&customer)?, false)
            .await?;

        info!(contact = %contact, "Customer added");
        self.audit
            .record("Added customer", None, Some(&customer.name))
            .await;
        Ok(customer)
    }

    /// Deletes a customer and every sale carrying their contact, in one
    /// atomic batch. Returns the number of sales removed.
    pub async fn on_customer_deleted(&self, contact: &str) -> EngineResult<usize> {
        let contact = require_contact(contact)?;
        let customer = self.load_customer(&contact).await?;

        let sales = self
            .store
            .query_eq(Collection::Sales, "whatsappNumber", &json!(contact))
            .await?;

        let mut batch = self.store.batch();
        for sale in &sales {
            batch.delete(Collection::Sales, sale.key.clone());
        }
        batch.delete(Collection::Customers, contact.clone());
        self.store.commit(batch).await?;

        info!(contact = %contact, sales = sales.len(), "Customer deleted with their sales");
        self.audit
            .record("Deleted customer", None, Some(&customer.name))
            .await;
        Ok(sales.len())
    }

    /// Adds or removes one tag. A no-op change writes nothing.
    pub async fn on_customer_tag_change(&self, contact: &str, tag: &str, change: TagChange) -> EngineResult<()> {
        let tag = validate_tag(tag)?;
        let contact = require_contact(contact)?;
        let mut customer = self.load_customer(&contact).await?;

        let changed = match change {
            TagChange::Add => customer.tags.insert(tag.clone()),
            TagChange::Remove => customer.tags.remove(&tag),
        };
        if !changed {
            debug!(contact = %contact, tag = %tag, ?change, "Tag already in requested state");
            return Ok(());
        }

        let update = fields([("tags", encode(&customer.tags)?)]);
        self.store.update_document(Collection::Customers, &contact, update).await?;

        let action = match change {
            TagChange::Add => format!("Added tag '{}'", tag),
            TagChange::Remove => format!("Removed tag '{}'", tag),
        };
        info!(contact = %contact, tag = %tag, ?change, "Customer tags updated");
        self.audit.record(action, None, Some(&customer.name)).await;
        Ok(())
    }

    /// Appends a timestamped note to a customer.
    pub async fn on_customer_note_added(&self, contact: &str, text: &str) -> EngineResult<()> {
        let text = validate_required_text("note", text)?;
        let contact = require_contact(contact)?;
        let mut customer = self.load_customer(&contact).await?;

        customer.notes.push(CustomerNote {
            text,
            timestamp: Utc::now(),
        });
        let update = fields([("notes", encode(&customer.notes)?)]);
        self.store.update_document(Collection::Customers, &contact, update).await?;

        debug!(contact = %contact, notes = customer.notes.len(), "Customer note added");
        self.audit.record("Added note", None, Some(&customer.name)).await;
        Ok(())
    }

    // =========================================================================
    // Service Catalog
    // =========================================================================

    /// Creates a catalog service, or replaces one with `editing_id`.
    /// Returns the service's key.
    pub async fn on_service_saved(&self, service: &Service, editing_id: Option<&str>) -> EngineResult<String> {
        let service = normalize_service(service)?;
        let body = to_document(&service)?;

        let (id, action) = match editing_id {
            Some(id) => {
                self.load_service(id).await?;
                self.store.set_document(Collection::Services, id, body, false).await?;
                (id.to_string(), "Service updated")
            }
            None => (self.store.add_document(Collection::Services, body).await?, "Service added"),
        };

        info!(service_id = %id, name = %service.name, categories = service.categories.len(), "{}", action);
        self.audit
            .record(format!("{}: {}", action, service.name), None, None)
            .await;
        Ok(id)
    }

    /// Removes a service from the catalog. Recorded sales are untouched.
    pub async fn on_service_deleted(&self, id: &str) -> EngineResult<()> {
        let service = self.load_service(id).await?;
        self.store.delete_document(Collection::Services, id).await?;

        info!(service_id = id, name = %service.name, "Service deleted");
        self.audit
            .record(format!("Service deleted: {}", service.name), None, None)
            .await;
        Ok(())
    }

    /// Every catalog service, sorted by name. Bad documents are skipped.
    pub async fn services(&self) -> EngineResult<Vec<Service>> {
        let mut services: Vec<Service> = self
            .store
            .list_documents(Collection::Services)
            .await?
            .iter()
            .filter_map(|doc| match doc.decode::<Service>() {
                Ok(mut service) => {
                    service.id = doc.key.clone();
                    Some(service)
                }
                Err(e) => {
                    warn!(key = %doc.key, error = %e, "Skipping undecodable service");
                    None
                }
            })
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    pub async fn service(&self, id: &str) -> EngineResult<Service> {
        self.load_service(id).await
    }

    // =========================================================================
    // Bulk Jobs
    // =========================================================================

    /// Recomputes every balance from the full sale history and rewrites the
    /// ones that differ, in chunks. Running it twice changes nothing the
    /// second time.
    pub async fn on_reconcile_all(&self) -> EngineResult<ReconcileReport> {
        let sales = decode_sales(&self.store.list_documents(Collection::Sales).await?);
        let customers = decode_customers(&self.store.list_documents(Collection::Customers).await?);

        let corrections = reconcile(&self.policy, &sales, &customers);
        info!(
            customers = customers.len(),
            sales = sales.len(),
            corrections = corrections.len(),
            "Reconciliation computed"
        );

        let ops = corrections
            .iter()
            .map(|c| WriteOp::Update {
                collection: Collection::Customers,
                key: c.contact.clone(),
                fields: fields([("loyaltyPoints", json!(c.to))]),
            })
            .collect();
        let batch = self.batches.run("reconcile", ops).await;

        if batch.succeeded > 0 {
            self.audit
                .record(format!("Reconciled {} point balances", batch.succeeded), None, None)
                .await;
        }

        Ok(ReconcileReport {
            updated_count: batch.succeeded,
            corrections,
            batch,
        })
    }

    /// Upserts customers from an import, tagged with the import tag.
    ///
    /// Each row is merged over any existing document with the starting
    /// balance, Bronze tier and only the import tag. Rows are de-duplicated by
    /// contact, the last one winning.
    pub async fn import_customers(&self, rows: &[ImportRow]) -> BatchReport {
        let mut unique: BTreeMap<String, &ImportRow> = BTreeMap::new();
        for row in rows {
            match normalize_contact(&row.contact) {
                Some(contact) if !row.name.trim().is_empty() => {
                    unique.insert(contact, row);
                }
                _ => warn!(name = %row.name, contact = %row.contact, "Skipping import row"),
            }
        }

        let ops = unique
            .into_iter()
            .map(|(contact, row)| WriteOp::Set {
                collection: Collection::Customers,
                key: contact.clone(),
                fields: fields([
                    ("name", json!(row.name.trim())),
                    ("whatsappNumber", json!(contact)),
                    ("tags", json!([self.import_tag])),
                    ("loyaltyPoints", json!(self.policy.starting_points)),
                    ("notes", json!([])),
                    ("tier", json!(Tier::Bronze)),
                ]),
                merge: true,
            })
            .collect();

        let report = self.batches.run("import", ops).await;
        self.audit
            .record(format!("Imported {} customers", report.succeeded), None, None)
            .await;
        report
    }

    /// Deletes every customer carrying the import tag, in chunks.
    pub async fn purge_imported_customers(&self) -> EngineResult<BatchReport> {
        let imported = self
            .store
            .query_contains(Collection::Customers, "tags", &json!(self.import_tag))
            .await?;

        let ops = imported
            .into_iter()
            .map(|doc| WriteOp::Delete {
                collection: Collection::Customers,
                key: doc.key,
            })
            .collect();

        let report = self.batches.run("purge", ops).await;
        self.audit
            .record(format!("Purged {} imported customers", report.succeeded), None, None)
            .await;
        Ok(report)
    }

    // =========================================================================
    // Snapshots & Tiers
    // =========================================================================

    /// Applies one change-feed snapshot and persists any tier changes it
    /// reveals. Returns the number of tiers written.
    pub async fn apply_snapshot(&self, snapshot: &CollectionSnapshot) -> usize {
        let changes = self.state.write().apply_snapshot(snapshot);
        self.sync_tiers(&changes).await
    }

    /// Reloads both collections into the state, as if a snapshot of each had
    /// arrived, and persists the resulting tier changes.
    pub async fn refresh_from_store(&self) -> EngineResult<Vec<TierChange>> {
        let sales = CollectionSnapshot {
            collection: Collection::Sales,
            documents: self.store.list_documents(Collection::Sales).await?,
        };
        let customers = CollectionSnapshot {
            collection: Collection::Customers,
            documents: self.store.list_documents(Collection::Customers).await?,
        };

        let changes = {
            let mut state = self.state.write();
            state.apply_sales_snapshot(&sales);
            state.apply_customers_snapshot(&customers)
        };

        self.sync_tiers(&changes).await;
        Ok(changes)
    }

    /// Writes each tier change with an audit event. Failures are logged and
    /// skipped; the next snapshot will report them again.
    pub async fn sync_tiers(&self, changes: &[TierChange]) -> usize {
        let mut written = 0;
        for change in changes {
            let update = match encode(&change.to) {
                Ok(tier) => fields([("tier", tier)]),
                Err(e) => {
                    error!(contact = %change.contact, error = %e, "Failed to encode tier");
                    continue;
                }
            };

            match self
                .store
                .update_document(Collection::Customers, &change.contact, update)
                .await
            {
                Ok(()) => {
                    written += 1;
                    info!(contact = %change.contact, from = %change.from, to = %change.to, "Tier updated");
                    self.audit
                        .record(
                            format!("Tier changed from {} to {}", change.from, change.to),
                            None,
                            Some(&change.name),
                        )
                        .await;
                }
                Err(e) => {
                    error!(contact = %change.contact, error = %e, "Failed to update tier");
                }
            }
        }
        written
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reads one sale straight from the store, e.g. to pre-fill an edit.
    pub async fn sale(&self, id: &str) -> EngineResult<Sale> {
        self.load_sale(id).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_sale(&self, id: &str) -> EngineResult<Sale> {
        let doc = self
            .store
            .get_document(Collection::Sales, id)
            .await?
            .ok_or_else(|| EngineError::sale_not_found(id))?;
        let mut sale: Sale = from_document(&doc)?;
        sale.id = id.to_string();
        Ok(sale)
    }

    async fn load_service(&self, id: &str) -> EngineResult<Service> {
        let doc = self
            .store
            .get_document(Collection::Services, id)
            .await?
            .ok_or_else(|| EngineError::service_not_found(id))?;
        let mut service: Service = from_document(&doc)?;
        service.id = id.to_string();
        Ok(service)
    }

    async fn find_customer(&self, contact: &str) -> EngineResult<Option<Customer>> {
        match self.store.get_document(Collection::Customers, contact).await? {
            Some(doc) => {
                let mut customer: Customer = from_document(&doc)?;
                customer.whatsapp_number = contact.to_string();
                Ok(Some(customer))
            }
            None => Ok(None),
        }
    }

    async fn load_customer(&self, contact: &str) -> EngineResult<Customer> {
        self.find_customer(contact)
            .await?
            .ok_or_else(|| EngineError::customer_not_found(contact))
    }

    /// Writes the balance changes of a sale save as one batch.
    async fn apply_ledger(
        &self,
        entries: &[LedgerEntry],
        redemption: Option<&PendingRedemption>,
        known: &[&Customer],
    ) -> StoreResult<AppliedLedger> {
        let mut applied = AppliedLedger::default();
        let mut deltas: BTreeMap<&str, i64> = BTreeMap::new();
        let mut batch = self.store.batch();

        for entry in entries {
            match entry {
                LedgerEntry::CreateCustomer(customer) => {
                    batch.set(
                        Collection::Customers,
                        customer.whatsapp_number.clone(),
                        to_document(customer)?,
                        false,
                    );
                    applied.created = true;
                    applied
                        .changes
                        .insert(customer.whatsapp_number.clone(), customer.loyalty_points);
                    info!(contact = %customer.whatsapp_number, points = customer.loyalty_points, "Customer created from first sale");
                }
                LedgerEntry::Adjust { contact, delta } => {
                    *deltas.entry(contact.as_str()).or_default() += delta;
                }
            }
        }

        if let Some(p) = redemption {
            *deltas.entry(p.contact.as_str()).or_default() -= p.points;
        }

        for (contact, delta) in deltas {
            let Some(customer) = known.iter().find(|c| c.whatsapp_number == contact) else {
                warn!(contact, delta, "No stored customer for balance change");
                continue;
            };
            let balance = apply_delta(customer.loyalty_points, delta);
            batch.update(
                Collection::Customers,
                contact,
                fields([("loyaltyPoints", json!(balance))]),
            );
            applied
                .changes
                .insert(contact.to_string(), balance - customer.loyalty_points);
            debug!(contact, delta, balance, "Balance change planned");
        }

        if !batch.is_empty() {
            self.store.commit(batch).await?;
        }
        Ok(applied)
    }
}

/// Balance changes written by one sale save.
#[derive(Debug, Default)]
struct AppliedLedger {
    created: bool,
    /// Net change per contact.
    changes: BTreeMap<String, i64>,
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(StoreError::from)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
