//! The same loyalty flows against the SQLite document store.

use chrono::NaiveDate;
use std::sync::Arc;

use tally_core::{Customer, Money, PaymentStatus, SaleForm};
use tally_engine::{LoyaltyEngine, TallyConfig};
use tally_store::document::from_document;
use tally_store::{Collection, DocumentStore, SqliteStore, StoreConfig};

const MONA: &str = "01001234567";

async fn setup() -> (LoyaltyEngine, SqliteStore) {
    let store = SqliteStore::connect(StoreConfig::in_memory())
        .await
        .expect("Failed to open in-memory store");
    let mut config = TallyConfig::default();
    config.batch.pause_ms = 0;
    let engine = LoyaltyEngine::new(Arc::new(store.clone()), &config);
    (engine, store)
}

async fn balance(store: &SqliteStore) -> i64 {
    let doc = store
        .get_document(Collection::Customers, MONA)
        .await
        .unwrap()
        .unwrap();
    from_document::<Customer>(&doc).unwrap().loyalty_points
}

#[tokio::test]
async fn test_sale_cash_back_and_reconcile_on_sqlite() {
    let (engine, store) = setup().await;
    let form = SaleForm {
        date: NaiveDate::from_ymd_opt(2024, 3, 14),
        service_type: "Printing".to_string(),
        price: Money::from_major(100),
        service_cost: Money::from_major(30),
        client_name: "Mona".to_string(),
        whatsapp_number: "+201001234567".to_string(),
        payment_status: PaymentStatus::Unpaid,
        notes: String::new(),
    };

    let saved = engine.on_sale_saved(&form, None, None).await.unwrap();
    assert!(saved.created_customer);
    assert_eq!(balance(&store).await, 350);

    let refund = engine.on_cash_back_redeem(MONA, 50).await.unwrap();
    assert_eq!(refund.cash_value, Money::from_major(1));
    assert_eq!(balance(&store).await, 300);

    engine.on_sale_marked_paid(&saved.sale_id).await.unwrap();

    let report = engine.on_reconcile_all().await.unwrap();
    assert_eq!(report.updated_count, 1);
    assert_eq!(balance(&store).await, 350);

    let removed = engine.on_customer_deleted(MONA).await.unwrap();
    assert_eq!(removed, 2);
    assert!(store.list_documents(Collection::Sales).await.unwrap().is_empty());

    let actions: Vec<String> = engine
        .audit()
        .recent(10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.contains(&"Payment received".to_string()));
    assert!(actions.contains(&"Deleted customer".to_string()));
}
