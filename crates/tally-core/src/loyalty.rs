//! # Loyalty Ledger Arithmetic
//!
//! Pure planning functions for every point balance mutation. The engine reads
//! the current documents, asks this module what should change, and writes the
//! result; nothing here touches the store.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sale saved ────► plan_sale_saved()   ──► [CreateCustomer | Adjust]*    │
//! │  sale deleted ──► plan_sale_deleted() ──► Adjust (reversal)             │
//! │  discount ──────► redeem_for_discount() ─► PendingRedemption            │
//! │  cash back ─────► plan_cash_back()    ──► new balance + refund Sale     │
//! │  bonus ─────────► grant_bonus()       ──► new balance + note            │
//! │  reconcile ─────► reconcile()         ──► PointsCorrection*             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Balances never drop below zero; every debit clamps at 0
//! - Customers carrying an exclusion tag never gain or lose points from sales
//! - Redemption sales neither accrue nor reverse points
//! - Live accrual uses the customer's persisted tier at event time;
//!   reconciliation applies the current tier to the whole history

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Customer, CustomerNote, Sale, Tier};
use crate::validation::validate_points;
use crate::{CASHBACK_RATE, DEFAULT_EXCLUSION_TAGS, DISCOUNT_RATE, STARTING_POINTS};

// =============================================================================
// Policy
// =============================================================================

/// Tunable loyalty constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoyaltyPolicy {
    pub starting_points: i64,
    /// Points per currency unit at sale-time discount.
    pub discount_rate: i64,
    /// Points per currency unit for cash-back.
    pub cashback_rate: i64,
    pub exclusion_tags: BTreeSet<String>,
}

impl Default for LoyaltyPolicy {
    fn default() -> Self {
        LoyaltyPolicy {
            starting_points: STARTING_POINTS,
            discount_rate: DISCOUNT_RATE,
            cashback_rate: CASHBACK_RATE,
            exclusion_tags: DEFAULT_EXCLUSION_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl LoyaltyPolicy {
    /// Whether the customer is barred from earning points.
    pub fn is_excluded(&self, customer: &Customer) -> bool {
        customer.tags.iter().any(|tag| self.exclusion_tags.contains(tag))
    }

    /// Points a sale earns for this customer at their current tier.
    fn earned(&self, customer: &Customer, sale: &Sale) -> i64 {
        if !sale.earns_points() || self.is_excluded(customer) {
            return 0;
        }
        customer.tier.multiplier().points_for(sale.price)
    }
}

// =============================================================================
// Ledger Entries
// =============================================================================

/// One balance mutation the engine must apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    /// First sale for an unknown contact.
    CreateCustomer(Customer),
    /// Add `delta` to the stored balance, clamping at zero.
    Adjust { contact: String, delta: i64 },
}

/// Applies a signed delta to a balance, never going below zero.
#[inline]
pub fn apply_delta(balance: i64, delta: i64) -> i64 {
    balance.saturating_add(delta).max(0)
}

/// Balance mutations caused by saving a sale.
///
/// ## Arguments
/// * `previous` - the stored sale when editing, `None` on create
/// * `sale` - the sale as it will be stored
/// * `customer` - stored customer for `sale`'s contact, if any
/// * `previous_customer` - stored customer for `previous`'s contact, used
///   only when the edit moved the sale to another contact
///
/// ## Cases
/// ```text
/// create, known contact      Adjust(+floor(price × m))
/// create, unknown contact    CreateCustomer(250 + floor(price × 1.00))
/// edit, same contact         Adjust(floor(new × m) − floor(old × m))
/// edit, contact moved        Adjust(old, −floor(old × m_old)) + accrual as create
/// ```
pub fn plan_sale_saved(
    policy: &LoyaltyPolicy,
    previous: Option<&Sale>,
    sale: &Sale,
    customer: Option<&Customer>,
    previous_customer: Option<&Customer>,
) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();

    let old_contact = previous.and_then(|p| p.whatsapp_number.as_deref());
    let new_contact = sale.whatsapp_number.as_deref();
    let same_contact = previous.is_some() && old_contact == new_contact;

    if previous.is_some() && !same_contact {
        if let (Some(prev), Some(contact), Some(old_customer)) =
            (previous, old_contact, previous_customer)
        {
            let reversed = policy.earned(old_customer, prev);
            if reversed != 0 {
                entries.push(LedgerEntry::Adjust {
                    contact: contact.to_string(),
                    delta: -reversed,
                });
            }
        }
    }

    let Some(contact) = new_contact else {
        return entries;
    };

    match customer {
        None => {
            let earned = if sale.earns_points() {
                Tier::Bronze.multiplier().points_for(sale.price)
            } else {
                0
            };
            entries.push(LedgerEntry::CreateCustomer(Customer::new(
                contact,
                sale.client_name.clone(),
                policy.starting_points + earned,
            )));
        }
        Some(customer) => {
            let earned = policy.earned(customer, sale);
            let delta = match previous {
                Some(prev) if same_contact => earned - policy.earned(customer, prev),
                _ => earned,
            };
            if delta != 0 {
                entries.push(LedgerEntry::Adjust {
                    contact: contact.to_string(),
                    delta,
                });
            }
        }
    }

    entries
}

/// Reversal caused by deleting a sale, if any.
pub fn plan_sale_deleted(
    policy: &LoyaltyPolicy,
    sale: &Sale,
    customer: Option<&Customer>,
) -> Option<LedgerEntry> {
    let customer = customer?;
    let reversed = policy.earned(customer, sale);
    (reversed != 0).then(|| LedgerEntry::Adjust {
        contact: customer.whatsapp_number.clone(),
        delta: -reversed,
    })
}

// =============================================================================
// Redemption
// =============================================================================

/// Currency value of `points` at `rate` points per unit, truncated to cents.
///
/// ## Example
/// ```rust
/// use tally_core::loyalty::points_value;
///
/// assert_eq!(points_value(400, 40).cents(), 1000);
/// assert_eq!(points_value(55, 50).cents(), 110);
/// ```
pub fn points_value(points: i64, rate: i64) -> Money {
    if rate <= 0 {
        return Money::zero();
    }
    Money::from_cents(points.saturating_mul(100) / rate)
}

/// A discount redemption held by the sale form until the sale is saved.
///
/// The points are debited only when the sale commits with the same contact;
/// dropping the value discards the redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PendingRedemption {
    pub contact: String,
    pub points: i64,
    pub discount: Money,
}

fn check_balance(customer: &Customer, points: i64) -> CoreResult<()> {
    validate_points(points)?;
    if points > customer.loyalty_points {
        return Err(CoreError::OverRedemption {
            requested: points,
            available: customer.loyalty_points,
        });
    }
    Ok(())
}

/// Validates a discount redemption and prices it.
pub fn redeem_for_discount(
    policy: &LoyaltyPolicy,
    customer: &Customer,
    points: i64,
) -> CoreResult<PendingRedemption> {
    check_balance(customer, points)?;
    Ok(PendingRedemption {
        contact: customer.whatsapp_number.clone(),
        points,
        discount: points_value(points, policy.discount_rate),
    })
}

/// Result of a cash-back request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashBackPlan {
    pub new_balance: i64,
    pub value: Money,
    pub sale: Sale,
}

/// Validates a cash-back request and builds the refund sale.
pub fn plan_cash_back(
    policy: &LoyaltyPolicy,
    customer: &Customer,
    points: i64,
    today: NaiveDate,
) -> CoreResult<CashBackPlan> {
    check_balance(customer, points)?;
    let value = points_value(points, policy.cashback_rate);
    Ok(CashBackPlan {
        new_balance: apply_delta(customer.loyalty_points, -points),
        value,
        sale: Sale::cash_back(
            today,
            &customer.name,
            &customer.whatsapp_number,
            value,
            points,
        ),
    })
}

// =============================================================================
// Bonus
// =============================================================================

/// Result of a bonus grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusGrant {
    pub new_balance: i64,
    pub note: CustomerNote,
}

/// Adds bonus points and documents why. The tier is not affected.
pub fn grant_bonus(
    customer: &Customer,
    points: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> CoreResult<BonusGrant> {
    validate_points(points)?;
    let reason = reason.trim();
    let text = if reason.is_empty() {
        format!("Added {} bonus points.", points)
    } else {
        format!("Added {} bonus points. Reason: {}", points, reason)
    };
    Ok(BonusGrant {
        new_balance: apply_delta(customer.loyalty_points, points),
        note: CustomerNote {
            text,
            timestamp: now,
        },
    })
}

// =============================================================================
// Reconciliation
// =============================================================================

/// A balance that disagrees with the recomputed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PointsCorrection {
    pub contact: String,
    pub from: i64,
    pub to: i64,
}

/// The balance a customer should hold given their full history.
///
/// `starting_points + floor(spend × m_current)` over point-earning sales, or
/// zero for excluded customers.
pub fn expected_balance(policy: &LoyaltyPolicy, customer: &Customer, spend: Money) -> i64 {
    if policy.is_excluded(customer) {
        return 0;
    }
    (policy.starting_points + customer.tier.multiplier().points_for(spend)).max(0)
}

/// Recomputes every balance from scratch and lists the ones that differ.
///
/// Running it again after the corrections are applied yields nothing.
pub fn reconcile(
    policy: &LoyaltyPolicy,
    sales: &[Sale],
    customers: &BTreeMap<String, Customer>,
) -> Vec<PointsCorrection> {
    let mut spend: BTreeMap<&str, Money> = BTreeMap::new();
    for sale in sales.iter().filter(|s| s.earns_points()) {
        if let Some(contact) = sale.whatsapp_number.as_deref() {
            *spend.entry(contact).or_default() += sale.price;
        }
    }

    customers
        .iter()
        .filter_map(|(key, customer)| {
            let total = spend.get(key.as_str()).copied().unwrap_or_default();
            let correct = expected_balance(policy, customer, total);
            (correct != customer.loyalty_points).then(|| PointsCorrection {
                contact: key.clone(),
                from: customer.loyalty_points,
                to: correct,
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
