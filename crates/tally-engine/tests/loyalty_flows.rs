//! End-to-end loyalty flows against the in-memory store.

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;

use tally_core::{Customer, Money, PaymentStatus, Sale, SaleForm, TagChange, Tier, CASH_BACK_SERVICE_TYPE};
use tally_engine::{EngineError, ImportRow, LoyaltyEngine, TallyConfig};
use tally_store::document::{fields, from_document, to_document};
use tally_store::{Collection, DocumentStore, MemoryStore};

const MONA: &str = "01001234567";
const OMAR: &str = "01112345678";

// =============================================================================
// Helpers
// =============================================================================

fn setup() -> (LoyaltyEngine, MemoryStore) {
    let store = MemoryStore::new();
    let mut config = TallyConfig::default();
    config.batch.pause_ms = 0;
    config.batch.chunk_size = 2;
    let engine = LoyaltyEngine::new(Arc::new(store.clone()), &config).with_user("owner@shop");
    (engine, store)
}

fn form(contact: &str, price_major: i64) -> SaleForm {
    SaleForm {
        date: NaiveDate::from_ymd_opt(2024, 5, 10),
        service_type: "Printing".to_string(),
        price: Money::from_major(price_major),
        service_cost: Money::from_major(price_major / 4),
        client_name: "Mona".to_string(),
        whatsapp_number: contact.to_string(),
        payment_status: PaymentStatus::Paid,
        notes: String::new(),
    }
}

async fn customer(store: &MemoryStore, contact: &str) -> Option<Customer> {
    store
        .get_document(Collection::Customers, contact)
        .await
        .unwrap()
        .map(|doc| from_document(&doc).unwrap())
}

async fn points(store: &MemoryStore, contact: &str) -> i64 {
    customer(store, contact).await.unwrap().loyalty_points
}

async fn sale(store: &MemoryStore, id: &str) -> Sale {
    let doc = store.get_document(Collection::Sales, id).await.unwrap().unwrap();
    from_document(&doc).unwrap()
}

async fn seed_customer(store: &MemoryStore, contact: &str, balance: i64, tier: Tier, tags: &[&str]) {
    let mut customer = Customer::new(contact, "Seeded", balance);
    customer.tier = tier;
    customer.tags = tags.iter().map(|t| t.to_string()).collect();
    store
        .set_document(Collection::Customers, contact, to_document(&customer).unwrap(), false)
        .await
        .unwrap();
}

// =============================================================================
// Accrual
// =============================================================================

#[tokio::test]
async fn test_first_sale_creates_customer_with_350_points() {
    let (engine, store) = setup();

    let outcome = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();

    assert!(outcome.created_customer);
    assert_eq!(outcome.points_delta, 350);
    assert!(outcome.loyalty_error.is_none());

    let created = customer(&store, MONA).await.unwrap();
    assert_eq!(created.loyalty_points, 350);
    assert_eq!(created.tier, Tier::Bronze);
    assert_eq!(created.name, "Mona");

    let saved = sale(&store, &outcome.sale_id).await;
    assert_eq!(saved.profit, Money::from_major(75));
    assert!(!saved.is_redemption);
}

#[tokio::test]
async fn test_sale_without_contact_never_touches_loyalty() {
    let (engine, store) = setup();

    let outcome = engine.on_sale_saved(&form("  ", 500), None, None).await.unwrap();

    assert!(!outcome.created_customer);
    assert_eq!(outcome.points_delta, 0);
    assert_eq!(store.count(Collection::Customers), 0);
    assert_eq!(store.count(Collection::Sales), 1);
}

#[tokio::test]
async fn test_editing_bronze_sale_100_to_150_adds_50() {
    let (engine, store) = setup();
    let created = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();

    let edited = engine
        .on_sale_saved(&form(MONA, 150), Some(&created.sale_id), None)
        .await
        .unwrap();

    assert_eq!(edited.sale_id, created.sale_id);
    assert_eq!(edited.points_delta, 50);
    assert_eq!(points(&store, MONA).await, 400);
    assert_eq!(store.count(Collection::Sales), 1);
}

#[tokio::test]
async fn test_silver_multiplier_applies_to_live_accrual() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 1000, Tier::Silver, &[]).await;

    let outcome = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();

    assert_eq!(outcome.points_delta, 115);
    assert_eq!(points(&store, MONA).await, 1115);
}

#[tokio::test]
async fn test_moving_sale_to_another_contact() {
    let (engine, store) = setup();
    let created = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();

    let moved = engine
        .on_sale_saved(&form(OMAR, 100), Some(&created.sale_id), None)
        .await
        .unwrap();

    assert!(moved.created_customer);
    assert_eq!(points(&store, MONA).await, 250);
    assert_eq!(points(&store, OMAR).await, 350);

    assert_eq!(moved.points_delta, 350);
    assert_eq!(moved.balance_changes.len(), 2);
    assert_eq!(moved.balance_changes[MONA], -100);
    assert_eq!(moved.balance_changes[OMAR], 350);
}

#[tokio::test]
async fn test_removing_contact_reports_reversal() {
    let (engine, store) = setup();
    let created = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();

    let detached = engine
        .on_sale_saved(&form("", 100), Some(&created.sale_id), None)
        .await
        .unwrap();

    assert_eq!(detached.points_delta, 0);
    assert_eq!(detached.balance_changes[MONA], -100);
    assert_eq!(points(&store, MONA).await, 250);
}

#[tokio::test]
async fn test_price_only_edit_of_stored_sale_keeps_the_rest() {
    let (engine, store) = setup();
    let mut original = form(MONA, 100);
    original.date = NaiveDate::from_ymd_opt(2024, 3, 1);
    original.notes = "walk-in".to_string();
    let created = engine.on_sale_saved(&original, None, None).await.unwrap();

    let mut edit = SaleForm::from_sale(&engine.sale(&created.sale_id).await.unwrap());
    edit.price = Money::from_major(150);
    let edited = engine
        .on_sale_saved(&edit, Some(&created.sale_id), None)
        .await
        .unwrap();

    assert_eq!(edited.points_delta, 50);
    assert_eq!(edited.balance_changes.len(), 1);
    assert_eq!(points(&store, MONA).await, 400);

    let stored = sale(&store, &created.sale_id).await;
    assert_eq!(stored.whatsapp_number.as_deref(), Some(MONA));
    assert_eq!(stored.client_name, "Mona");
    assert_eq!(stored.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(stored.notes, "walk-in");
    assert_eq!(stored.service_cost, Money::from_major(25));
    assert_eq!(stored.price, Money::from_major(150));
}

#[tokio::test]
async fn test_sale_crossing_silver_threshold_accrues_at_stored_tier() {
    let (engine, store) = setup();
    engine.on_sale_saved(&form(MONA, 1900), None, None).await.unwrap();
    assert_eq!(points(&store, MONA).await, 2150);

    // lifetime spend reaches 2,100 but the stored tier is still Bronze
    let crossing = engine.on_sale_saved(&form(MONA, 200), None, None).await.unwrap();
    assert_eq!(crossing.points_delta, 200);

    let changes = engine.refresh_from_store().await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(customer(&store, MONA).await.unwrap().tier, Tier::Silver);

    let next = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();
    assert_eq!(next.points_delta, 115);
    assert_eq!(points(&store, MONA).await, 2465);
}

#[tokio::test]
async fn test_excluded_customer_earns_nothing() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 0, Tier::Bronze, &["تاجر"]).await;

    let outcome = engine.on_sale_saved(&form(MONA, 5000), None, None).await.unwrap();

    assert_eq!(outcome.points_delta, 0);
    assert_eq!(points(&store, MONA).await, 0);
}

#[tokio::test]
async fn test_accrual_failure_keeps_sale_and_reports_error() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 250, Tier::Bronze, &[]).await;
    store.fail_writes_after(1);

    let outcome = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();

    assert!(outcome.loyalty_error.is_some());
    assert_eq!(outcome.points_delta, 0);
    assert_eq!(store.count(Collection::Sales), 1);

    store.clear_failures();
    assert_eq!(points(&store, MONA).await, 250);

    let report = engine.on_reconcile_all().await.unwrap();
    assert_eq!(report.updated_count, 1);
    assert_eq!(points(&store, MONA).await, 350);
}

#[tokio::test]
async fn test_sale_write_failure_is_an_error() {
    let (engine, store) = setup();
    store.fail_writes_after(0);

    let err = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap_err();

    assert!(matches!(err, EngineError::Store(_)));
    store.clear_failures();
    assert_eq!(store.count(Collection::Sales), 0);
    assert_eq!(store.count(Collection::Customers), 0);
}

// =============================================================================
// Deletion
// =============================================================================

#[tokio::test]
async fn test_deleting_sale_reverses_points() {
    let (engine, store) = setup();
    let created = engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();

    let outcome = engine.on_sale_deleted(&created.sale_id).await.unwrap();

    assert_eq!(outcome.points_reversed, 100);
    assert_eq!(points(&store, MONA).await, 250);
    assert_eq!(store.count(Collection::Sales), 0);
}

#[tokio::test]
async fn test_reversal_clamps_at_zero() {
    let (engine, store) = setup();
    let created = engine.on_sale_saved(&form(MONA, 1000), None, None).await.unwrap();
    engine.on_cash_back_redeem(MONA, 1200).await.unwrap();

    let outcome = engine.on_sale_deleted(&created.sale_id).await.unwrap();

    assert_eq!(points(&store, MONA).await, 0);
    assert_eq!(outcome.points_reversed, 50);
}

#[tokio::test]
async fn test_deleting_customer_removes_every_sale() {
    let (engine, store) = setup();
    engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();
    engine.on_sale_saved(&form(MONA, 200), None, None).await.unwrap();
    engine.on_sale_saved(&form(OMAR, 300), None, None).await.unwrap();

    let removed = engine.on_customer_deleted(MONA).await.unwrap();

    assert_eq!(removed, 2);
    assert!(customer(&store, MONA).await.is_none());
    let left = store
        .query_eq(Collection::Sales, "whatsappNumber", &json!(MONA))
        .await
        .unwrap();
    assert!(left.is_empty());
    assert_eq!(store.count(Collection::Sales), 1);
}

#[tokio::test]
async fn test_mark_paid() {
    let (engine, store) = setup();
    let mut unpaid = form(MONA, 100);
    unpaid.payment_status = PaymentStatus::Unpaid;
    let created = engine.on_sale_saved(&unpaid, None, None).await.unwrap();

    engine.on_sale_marked_paid(&created.sale_id).await.unwrap();
    engine.on_sale_marked_paid(&created.sale_id).await.unwrap();

    assert_eq!(sale(&store, &created.sale_id).await.payment_status, PaymentStatus::Paid);
    let payments = engine
        .audit()
        .recent(50)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action == "Payment received")
        .count();
    assert_eq!(payments, 1);
}

// =============================================================================
// Redemption
// =============================================================================

#[tokio::test]
async fn test_redeeming_400_points_at_40_is_worth_10() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 1000, Tier::Bronze, &[]).await;

    let pending = engine.on_redeem_for_discount(MONA, 400).await.unwrap();

    assert_eq!(pending.discount, Money::from_major(10));
    assert_eq!(points(&store, MONA).await, 1000);
}

#[tokio::test]
async fn test_over_redemption_rejected_before_any_write() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 300, Tier::Bronze, &[]).await;
    let audit_before = store.count(Collection::AuditLogs);

    let err = engine.on_redeem_for_discount(MONA, 301).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::OverRedemption {
            requested: 301,
            available: 300
        }
    ));

    let err = engine.on_cash_back_redeem(MONA, 500).await.unwrap_err();
    assert!(matches!(err, EngineError::OverRedemption { .. }));

    assert_eq!(points(&store, MONA).await, 300);
    assert_eq!(store.count(Collection::Sales), 0);
    assert_eq!(store.count(Collection::AuditLogs), audit_before);
}

#[tokio::test]
async fn test_pending_redemption_is_debited_on_save() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 1000, Tier::Bronze, &[]).await;
    let pending = engine.on_redeem_for_discount(MONA, 400).await.unwrap();

    let outcome = engine
        .on_sale_saved(&form(MONA, 90), None, Some(pending))
        .await
        .unwrap();

    assert_eq!(outcome.redeemed_points, 400);
    assert_eq!(outcome.points_delta, -400);
    assert_eq!(points(&store, MONA).await, 600);
    assert!(sale(&store, &outcome.sale_id).await.is_redemption);
}

#[tokio::test]
async fn test_pending_redemption_discarded_when_contact_changes() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 1000, Tier::Bronze, &[]).await;
    let pending = engine.on_redeem_for_discount(MONA, 400).await.unwrap();

    let outcome = engine
        .on_sale_saved(&form(OMAR, 100), None, Some(pending))
        .await
        .unwrap();

    assert_eq!(outcome.redeemed_points, 0);
    assert_eq!(points(&store, MONA).await, 1000);
    assert_eq!(points(&store, OMAR).await, 350);
    assert!(!sale(&store, &outcome.sale_id).await.is_redemption);
}

#[tokio::test]
async fn test_cash_back_500_points_at_50() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 800, Tier::Bronze, &[]).await;

    let outcome = engine.on_cash_back_redeem(MONA, 500).await.unwrap();

    assert_eq!(outcome.cash_value, Money::from_major(10));
    assert_eq!(outcome.remaining_points, 300);
    assert_eq!(points(&store, MONA).await, 300);

    let refund = sale(&store, &outcome.sale_id).await;
    assert_eq!(refund.price, Money::from_major(-10));
    assert_eq!(refund.profit, Money::from_major(-10));
    assert_eq!(refund.service_cost, Money::zero());
    assert_eq!(refund.service_type, CASH_BACK_SERVICE_TYPE);
    assert_eq!(refund.notes, "Loyalty points cash back: 500 points");
    assert!(refund.is_redemption);
}

#[tokio::test]
async fn test_bonus_grant_adds_points_and_note() {
    let (engine, store) = setup();
    seed_customer(&store, MONA, 250, Tier::Gold, &[]).await;

    let balance = engine.on_bonus_grant(MONA, 100, "Birthday").await.unwrap();

    assert_eq!(balance, 350);
    let stored = customer(&store, MONA).await.unwrap();
    assert_eq!(stored.loyalty_points, 350);
    assert_eq!(stored.tier, Tier::Gold);
    assert_eq!(stored.notes.len(), 1);
    assert_eq!(stored.notes[0].text, "Added 100 bonus points. Reason: Birthday");

    let err = engine.on_bonus_grant(MONA, -5, "").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// =============================================================================
// Customers
// =============================================================================

#[tokio::test]
async fn test_add_customer_rejects_duplicates() {
    let (engine, store) = setup();

    let added = engine.on_customer_added("Mona", "+20 100 123 4567").await.unwrap();
    assert_eq!(added.whatsapp_number, MONA);
    assert_eq!(points(&store, MONA).await, 250);

    let err = engine.on_customer_added("Mona Again", MONA).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(customer(&store, MONA).await.unwrap().name, "Mona");
}

#[tokio::test]
async fn test_tags_and_notes() {
    let (engine, store) = setup();
    engine.on_customer_added("Mona", MONA).await.unwrap();

    engine.on_customer_tag_change(MONA, " VIP ", TagChange::Add).await.unwrap();
    engine.on_customer_tag_change(MONA, "VIP", TagChange::Add).await.unwrap();
    assert!(customer(&store, MONA).await.unwrap().has_tag("VIP"));

    engine.on_customer_tag_change(MONA, "VIP", TagChange::Remove).await.unwrap();
    assert!(customer(&store, MONA).await.unwrap().tags.is_empty());

    engine.on_customer_note_added(MONA, "Prefers evening calls").await.unwrap();
    let notes = customer(&store, MONA).await.unwrap().notes;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].text, "Prefers evening calls");

    assert!(engine.on_customer_note_added(MONA, "   ").await.is_err());
    assert!(engine
        .on_customer_tag_change(OMAR, "VIP", TagChange::Add)
        .await
        .unwrap_err()
        .is_not_found());
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_reconcile_is_idempotent_and_zeroes_excluded() {
    let (engine, store) = setup();
    engine.on_sale_saved(&form(MONA, 100), None, None).await.unwrap();
    engine.on_sale_saved(&form(OMAR, 200), None, None).await.unwrap();
    store
        .update_document(Collection::Customers, MONA, fields([("loyaltyPoints", json!(9999))]))
        .await
        .unwrap();
    store
        .update_document(Collection::Customers, OMAR, fields([("tags", json!(["يوتيوبر"]))]))
        .await
        .unwrap();

    let first = engine.on_reconcile_all().await.unwrap();
    assert_eq!(first.updated_count, 2);
    assert!(first.batch.is_complete());
    assert_eq!(points(&store, MONA).await, 350);
    assert_eq!(points(&store, OMAR).await, 0);

    let second = engine.on_reconcile_all().await.unwrap();
    assert_eq!(second.updated_count, 0);
    assert!(second.corrections.is_empty());
}

#[tokio::test]
async fn test_reconcile_skips_redemption_sales() {
    let (engine, store) = setup();
    engine.on_sale_saved(&form(MONA, 1000), None, None).await.unwrap();
    engine.on_cash_back_redeem(MONA, 250).await.unwrap();

    let report = engine.on_reconcile_all().await.unwrap();

    // 250 + 1000 earned; the refund sale neither counts as spend nor refunds.
    assert_eq!(report.corrections.len(), 1);
    assert_eq!(points(&store, MONA).await, 1250);
}

// =============================================================================
// Import & Purge
// =============================================================================

fn rows(n: usize) -> Vec<ImportRow> {
    (0..n)
        .map(|i| ImportRow {
            name: format!("Contact {}", i),
            contact: format!("0100000000{}", i),
        })
        .collect()
}

#[tokio::test]
async fn test_import_then_purge() {
    let (engine, store) = setup();
    engine.on_customer_added("Walk-in", OMAR).await.unwrap();

    let report = engine.import_customers(&rows(5)).await;
    assert!(report.is_complete());
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.chunks_committed, 3);

    let imported = customer(&store, "01000000003").await.unwrap();
    assert!(imported.has_tag("مستورد"));
    assert_eq!(imported.loyalty_points, 250);

    let purged = engine.purge_imported_customers().await.unwrap();
    assert_eq!(purged.succeeded, 5);
    assert_eq!(store.count(Collection::Customers), 1);
    assert!(customer(&store, OMAR).await.is_some());
}

#[tokio::test]
async fn test_import_failure_reports_partial_progress() {
    let (engine, store) = setup();
    store.fail_writes_after(1);

    let report = engine.import_customers(&rows(5)).await;

    assert!(!report.is_complete());
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failure.as_ref().unwrap().chunk_index, 1);

    store.clear_failures();
    assert_eq!(store.count(Collection::Customers), 2);
    assert!(matches!(
        report.into_result(),
        Err(EngineError::PartialBatch { succeeded: 2, total: 5, .. })
    ));
}
