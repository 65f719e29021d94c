//! # Tiering Rule
//!
//! Maps lifetime spend to a [`Tier`] and each tier to a point multiplier.
//!
//! ```text
//! lifetime spend          tier      multiplier
//! ─────────────────────   ───────   ──────────
//! s <  2,000.00           Bronze    × 1.00
//! 2,000.00 ≤ s < 10,000   Silver    × 1.15
//! s ≥ 10,000.00           Gold      × 1.25
//! ```
//!
//! Multipliers are basis points (10000 = ×1.00) so accrual stays integral:
//! `points = floor(cents × bps / 1_000_000)`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::Tier;

/// Lifetime spend at which a customer becomes Silver.
pub const SILVER_THRESHOLD: Money = Money::from_major(2_000);

/// Lifetime spend at which a customer becomes Gold.
pub const GOLD_THRESHOLD: Money = Money::from_major(10_000);

// cents per currency unit × basis points per 1.00
const POINTS_DIVISOR: i128 = 100 * 10_000;

/// Tier for a lifetime spend amount.
///
/// ## Example
/// ```rust
/// use tally_core::{tier_for, Money, Tier};
///
/// assert_eq!(tier_for(Money::from_cents(199_999)), Tier::Bronze);
/// assert_eq!(tier_for(Money::from_major(2_000)), Tier::Silver);
/// assert_eq!(tier_for(Money::from_major(10_000)), Tier::Gold);
/// ```
pub fn tier_for(total_spent: Money) -> Tier {
    if total_spent >= GOLD_THRESHOLD {
        Tier::Gold
    } else if total_spent >= SILVER_THRESHOLD {
        Tier::Silver
    } else {
        Tier::Bronze
    }
}

/// Point multiplier in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Multiplier(u32);

impl Multiplier {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Multiplier(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Points earned by a price at this multiplier, floored.
    ///
    /// Negative prices floor toward negative infinity, matching a reversal of
    /// the same amount.
    pub fn points_for(&self, price: Money) -> i64 {
        let scaled = price.cents() as i128 * self.0 as i128;
        scaled.div_euclid(POINTS_DIVISOR) as i64
    }
}

impl Tier {
    /// Multiplier applied to accruals while the customer holds this tier.
    pub const fn multiplier(&self) -> Multiplier {
        match self {
            Tier::Bronze => Multiplier::from_bps(10_000),
            Tier::Silver => Multiplier::from_bps(11_500),
            Tier::Gold => Multiplier::from_bps(12_500),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
