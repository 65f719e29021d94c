//! # tally-core: Pure Business Logic for Tally
//!
//! This crate holds the loyalty and tiering rules of Tally as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Dashboard / admin CLI (callers)                    │   │
//! │  │    Sale form ──► Customer card ──► Reports ──► Bulk tools       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tally-engine (LoyaltyEngine)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  tiering  │  │  loyalty  │  │  reports  │  │   │
//! │  │   │ Sale      │  │ Tier      │  │ accrual   │  │ P&L, KPIs │  │   │
//! │  │   │ Customer  │  │ Multiplier│  │ redeem    │  │ debts     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO NETWORK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Sale, Customer, Tier, AuditEvent)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Form validation and contact normalization
//! - [`tiering`] - Spend thresholds and point multipliers
//! - [`ledger_view`] - Per-customer aggregates derived from the sale set
//! - [`loyalty`] - Point accrual, reversal, redemption and reconciliation plans
//! - [`reports`] - Debt list, P&L, KPIs and daily alerts
//! - [`catalog`] - Service price list search and discounted quotes
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::{Money, Tier};
//!
//! // 100.00 at Bronze earns 100 points, at Gold 125
//! let price = Money::from_cents(10_000);
//! assert_eq!(Tier::Bronze.multiplier().points_for(price), 100);
//! assert_eq!(Tier::Gold.multiplier().points_for(price), 125);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod ledger_view;
pub mod loyalty;
pub mod money;
pub mod reports;
pub mod tiering;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::{Discount, Quote};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger_view::{CustomerView, TierChange};
pub use loyalty::{LedgerEntry, LoyaltyPolicy, PendingRedemption};
pub use money::Money;
pub use tiering::{tier_for, Multiplier};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Points every new customer starts with.
pub const STARTING_POINTS: i64 = 250;

/// Points per currency unit when redeeming for a discount at sale time.
pub const DISCOUNT_RATE: i64 = 40;

/// Points per currency unit when redeeming for a cash-back sale.
pub const CASHBACK_RATE: i64 = 50;

/// Service type recorded on cash-back sales.
pub const CASH_BACK_SERVICE_TYPE: &str = "Cash Back Redemption";

/// Tags that exclude a customer from earning points (reseller, influencer).
pub const DEFAULT_EXCLUSION_TAGS: &[&str] = &["تاجر", "يوتيوبر"];

/// Tag applied to customers created by a bulk contact import.
pub const IMPORT_TAG: &str = "مستورد";
