//! # Ledger View
//!
//! Derives per-customer aggregates from the full sale set.
//!
//! ```text
//! customers (by key) ──┐
//!                      ├──► aggregate() ──► CustomerView per customer
//! sales (any order) ───┘         │
//!                                └──► tier_changes() ──► persisted tier drift
//! ```
//!
//! The view is a pure function of its inputs and is recomputed in full on
//! every snapshot. Sales are matched through a key index, so the pass is
//! linear in the number of sales.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::money::Money;
use crate::tiering::tier_for;
use crate::types::{Customer, Sale, Tier};

/// A customer together with the aggregates derived from their sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    pub customer: Customer,
    pub total_orders: u32,
    pub total_spent: Money,
    /// Sale ids in input order.
    pub purchase_history: Vec<String>,
    #[ts(as = "Option<String>")]
    pub last_purchase: Option<NaiveDate>,
}

impl CustomerView {
    fn empty(customer: Customer) -> Self {
        CustomerView {
            customer,
            total_orders: 0,
            total_spent: Money::zero(),
            purchase_history: Vec::new(),
            last_purchase: None,
        }
    }

    /// Tier implied by the derived spend.
    pub fn computed_tier(&self) -> Tier {
        tier_for(self.total_spent)
    }
}

/// A customer whose persisted tier no longer matches their spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TierChange {
    pub contact: String,
    pub name: String,
    pub from: Tier,
    pub to: Tier,
}

/// Folds every sale into its customer's aggregates.
///
/// ## Rules
/// - Counters start from zero on every call
/// - `last_purchase` is the latest sale date; on equal dates the sale seen
///   last wins, and the customer's name follows that sale's `client_name`
/// - Sales without a contact, or with a contact no customer holds, are ignored
pub fn aggregate(sales: &[Sale], customers: &BTreeMap<String, Customer>) -> BTreeMap<String, CustomerView> {
    let mut views: BTreeMap<String, CustomerView> = customers
        .iter()
        .map(|(key, customer)| (key.clone(), CustomerView::empty(customer.clone())))
        .collect();

    for sale in sales {
        let Some(contact) = sale.whatsapp_number.as_deref() else {
            continue;
        };
        let Some(view) = views.get_mut(contact) else {
            continue;
        };

        view.total_orders += 1;
        view.total_spent += sale.price;
        view.purchase_history.push(sale.id.clone());

        let is_latest = view.last_purchase.map_or(true, |last| sale.date >= last);
        if is_latest {
            view.last_purchase = Some(sale.date);
            if !sale.client_name.is_empty() {
                view.customer.name = sale.client_name.clone();
            }
        }
    }

    views
}

/// Customers whose persisted tier differs from the tier their spend implies.
pub fn tier_changes(views: &BTreeMap<String, CustomerView>) -> Vec<TierChange> {
    views
        .values()
        .filter_map(|view| {
            let computed = view.computed_tier();
            (computed != view.customer.tier).then(|| TierChange {
                contact: view.customer.whatsapp_number.clone(),
                name: view.customer.name.clone(),
                from: view.customer.tier,
                to: computed,
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentStatus;

    fn sale(id: &str, contact: Option<&str>, day: u32, price_major: i64, name: &str) -> Sale {
        Sale {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            service_type: "Repair".to_string(),
            price: Money::from_major(price_major),
            service_cost: Money::zero(),
            profit: Money::from_major(price_major),
            client_name: name.to_string(),
            whatsapp_number: contact.map(str::to_string),
            payment_status: PaymentStatus::Paid,
            notes: String::new(),
            is_redemption: false,
        }
    }

    fn customers(keys: &[&str]) -> BTreeMap<String, Customer> {
        keys.iter()
            .map(|k| (k.to_string(), Customer::new(*k, "Original", 250)))
            .collect()
    }

    #[test]
    fn test_aggregate_counts_and_spend() {
        let sales = vec![
            sale("s1", Some("010"), 3, 100, "A"),
            sale("s2", Some("011"), 4, 50, "B"),
            sale("s3", Some("010"), 5, 30, "A2"),
            sale("s4", None, 6, 999, "walk-in"),
            sale("s5", Some("unknown"), 7, 999, "X"),
        ];
        let views = aggregate(&sales, &customers(&["010", "011", "012"]));

        let a = &views["010"];
        assert_eq!(a.total_orders, 2);
        assert_eq!(a.total_spent, Money::from_major(130));
        assert_eq!(a.purchase_history, vec!["s1", "s3"]);
        assert_eq!(a.last_purchase, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(a.customer.name, "A2");

        let idle = &views["012"];
        assert_eq!(idle.total_orders, 0);
        assert_eq!(idle.last_purchase, None);
        assert_eq!(idle.customer.name, "Original");
        assert_eq!(views.len(), 3);
    }

    #[test]
    fn test_name_follows_latest_sale_not_input_order() {
        let sales = vec![
            sale("s1", Some("010"), 9, 10, "Newest"),
            sale("s2", Some("010"), 2, 10, "Older"),
        ];
        let views = aggregate(&sales, &customers(&["010"]));
        assert_eq!(views["010"].customer.name, "Newest");
    }

    #[test]
    fn test_same_day_tie_last_seen_wins() {
        let sales = vec![
            sale("s1", Some("010"), 4, 10, "First"),
            sale("s2", Some("010"), 4, 10, "Second"),
        ];
        let views = aggregate(&sales, &customers(&["010"]));
        assert_eq!(views["010"].customer.name, "Second");
    }

    #[test]
    fn test_aggregate_resets_between_calls() {
        let sales = vec![sale("s1", Some("010"), 1, 10, "A")];
        let custs = customers(&["010"]);
        let first = aggregate(&sales, &custs);
        let second = aggregate(&sales, &custs);
        assert_eq!(first, second);
        assert_eq!(second["010"].total_orders, 1);
    }

    #[test]
    fn test_tier_changes() {
        let sales = vec![
            sale("s1", Some("010"), 1, 2_000, "Silver now"),
            sale("s2", Some("011"), 1, 10, "Still bronze"),
        ];
        let mut custs = customers(&["010", "011", "012"]);
        if let Some(c) = custs.get_mut("012") {
            c.tier = Tier::Gold;
        }
        let changes = tier_changes(&aggregate(&sales, &custs));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].contact, "010");
        assert_eq!(changes[0].to, Tier::Silver);
        assert_eq!(changes[1].contact, "012");
        assert_eq!(changes[1].from, Tier::Gold);
        assert_eq!(changes[1].to, Tier::Bronze);
    }
}
