//! # Domain Types
//!
//! Core domain types used throughout Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Sale       │   │    Customer     │   │   AuditEvent    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (store key) │   │  whatsapp (key) │   │  action         │       │
//! │  │  date           │   │  name, tags     │   │  user           │       │
//! │  │  price, cost    │   │  loyalty_points │   │  amount/client  │       │
//! │  │  whatsapp (FK)  │   │  tier           │   │  timestamp      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Tier       │   │ PaymentStatus   │   │    SaleForm     │       │
//! │  │  Bronze ×1.00   │   │  Paid           │   │  raw dashboard  │       │
//! │  │  Silver ×1.15   │   │  Unpaid (debt)  │   │  input          │       │
//! │  │  Gold   ×1.25   │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Document Shape
//! Types serialize with camelCase field names so stored documents keep the
//! collection layout the dashboard already reads (`whatsappNumber`,
//! `loyaltyPoints`, `serviceCost`, ...). Amounts are stored in currency
//! units (`"price": 150`), see [`Money`]'s serde impls.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::{self, ValidationResult};
use crate::CASH_BACK_SERVICE_TYPE;

// =============================================================================
// Tier
// =============================================================================

/// Loyalty tier, assigned from lifetime spend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
        };
        f.pad(name)
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Whether a sale has been settled. Unpaid sales form the debt list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Paid,
    Unpaid,
}

// =============================================================================
// Sale Form
// =============================================================================

/// Raw sale input as submitted by the dashboard form.
///
/// Nothing here is trusted: [`Sale::from_form`] validates it and normalizes
/// the contact before anything is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleForm {
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
    pub service_type: String,
    pub price: Money,
    pub service_cost: Money,
    pub client_name: String,
    pub whatsapp_number: String,
    pub payment_status: PaymentStatus,
    pub notes: String,
}

impl SaleForm {
    /// Pre-fills the form with a stored sale, the starting point of an edit.
    pub fn from_sale(sale: &Sale) -> Self {
        SaleForm {
            date: Some(sale.date),
            service_type: sale.service_type.clone(),
            price: sale.price,
            service_cost: sale.service_cost,
            client_name: sale.client_name.clone(),
            whatsapp_number: sale.whatsapp_number.clone().unwrap_or_default(),
            payment_status: sale.payment_status,
            notes: sale.notes.clone(),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A recorded sale (or cash-back refund record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    /// Store-assigned key. Not part of the document body.
    #[serde(skip)]
    pub id: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub service_type: String,
    pub price: Money,
    #[serde(default)]
    pub service_cost: Money,
    /// Always `price - service_cost`.
    #[serde(default)]
    pub profit: Money,
    #[serde(default)]
    pub client_name: String,
    /// Normalized contact; `None` means the sale never touches loyalty.
    #[serde(default)]
    pub whatsapp_number: Option<String>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub notes: String,
    /// Set on sales that consumed a redemption; they earn no points.
    #[serde(default)]
    pub is_redemption: bool,
}

impl Sale {
    /// Builds a sale from a dashboard form.
    ///
    /// ## Rules
    /// - `date` and `service_type` are required
    /// - `price` and `service_cost` must not be negative
    /// - The contact is normalized; blank means no contact
    /// - `profit` is derived, never taken from input
    pub fn from_form(form: &SaleForm, is_redemption: bool) -> ValidationResult<Sale> {
        validation::validate_sale_form(form)?;
        let date = form.date.ok_or_else(|| ValidationError::required("date"))?;

        Ok(Sale {
            id: String::new(),
            date,
            service_type: form.service_type.trim().to_string(),
            price: form.price,
            service_cost: form.service_cost,
            profit: form.price - form.service_cost,
            client_name: form.client_name.trim().to_string(),
            whatsapp_number: validation::normalize_contact(&form.whatsapp_number),
            payment_status: form.payment_status,
            notes: form.notes.trim().to_string(),
            is_redemption,
        })
    }

    /// Builds the negative sale that records a cash-back payout.
    pub fn cash_back(
        date: NaiveDate,
        client_name: &str,
        contact: &str,
        value: Money,
        points: i64,
    ) -> Sale {
        Sale {
            id: String::new(),
            date,
            service_type: CASH_BACK_SERVICE_TYPE.to_string(),
            price: -value,
            service_cost: Money::zero(),
            profit: -value,
            client_name: client_name.to_string(),
            whatsapp_number: Some(contact.to_string()),
            payment_status: PaymentStatus::Paid,
            notes: format!("Loyalty points cash back: {} points", points),
            is_redemption: true,
        }
    }

    /// Whether this sale earns (and on removal, gives back) points.
    ///
    /// Legacy cash-back records predate the `isRedemption` flag and are
    /// recognized by their service type.
    pub fn earns_points(&self) -> bool {
        !self.is_redemption && self.service_type != CASH_BACK_SERVICE_TYPE
    }

    pub fn is_unpaid(&self) -> bool {
        self.payment_status == PaymentStatus::Unpaid
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A free-text note appended to a customer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerNote {
    pub text: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

/// A persisted customer, keyed by normalized contact number.
///
/// Aggregates (order count, spend, history) are not stored here; see
/// [`crate::ledger_view::CustomerView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default)]
    pub whatsapp_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub notes: Vec<CustomerNote>,
    #[serde(default)]
    pub loyalty_points: i64,
    #[serde(default)]
    pub tier: Tier,
}

impl Customer {
    /// A fresh Bronze customer with the given opening balance.
    pub fn new(contact: impl Into<String>, name: impl Into<String>, points: i64) -> Self {
        Customer {
            whatsapp_number: contact.into(),
            name: name.into(),
            tags: BTreeSet::new(),
            notes: Vec::new(),
            loyalty_points: points.max(0),
            tier: Tier::Bronze,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Direction of a tag edit on a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TagChange {
    Add,
    Remove,
}

// =============================================================================
// Service Catalog
// =============================================================================

/// A priced item inside a catalog category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceItem {
    pub name: String,
    pub price: Money,
}

/// A named group of items, e.g. "Color prints" under "Printing".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceCategory {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ServiceItem>,
}

/// A catalog entry: a service with its price list.
///
/// ```text
/// Service "Printing"
/// ├── Category "A4"
/// │   ├── Item "Black & white"  1.50
/// │   └── Item "Color"          5.00
/// └── Category "Binding"
///     └── Item "Spiral"        25.00
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Service {
    /// Store-assigned key. Not part of the document body.
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<ServiceCategory>,
}

impl Service {
    /// Looks up an item by name across every category.
    pub fn item(&self, name: &str) -> Option<&ServiceItem> {
        let name = name.trim();
        self.categories
            .iter()
            .flat_map(|c| c.items.iter())
            .find(|item| item.name == name)
    }
}

// =============================================================================
// Audit Event
// =============================================================================

/// One entry of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditEvent {
    pub action: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, user: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        AuditEvent {
            action: action.into(),
            user: user.into(),
            amount: None,
            client: None,
            timestamp,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
