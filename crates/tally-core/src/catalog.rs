//! # Service Catalog
//!
//! Validation, search and discounted quotes over the service price list.
//!
//! ## Quote Flow
//! ```text
//! ┌──────────────┐  pick items  ┌──────────────┐  Discount  ┌──────────────┐
//! │   Service    │ ───────────► │ ServiceItem  │ ─────────► │    Quote     │
//! │  categories  │              │  name, price │   −10%     │ lines, total │
//! └──────────────┘              └──────────────┘            └──────────────┘
//! ```
//!
//! Quotes are what the shop sends to a customer before a sale is recorded;
//! they never touch loyalty.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Service, ServiceCategory, ServiceItem};
use crate::validation::{validate_required_text, ValidationResult};

/// Basis points in 100%.
const FULL_BPS: u32 = 10_000;

// =============================================================================
// Normalization
// =============================================================================

/// Cleans up a submitted service before it is stored.
///
/// ## Rules
/// - The service name is required and trimmed
/// - Categories without a name are dropped
/// - Items without a name are dropped
/// - Item prices must not be negative
///
/// ## Example
/// ```rust
/// use tally_core::catalog::normalize_service;
/// use tally_core::{Money, Service, ServiceCategory, ServiceItem};
///
/// let service = Service {
///     id: String::new(),
///     name: " Printing ".to_string(),
///     categories: vec![ServiceCategory {
///         name: " ".to_string(),
///         items: vec![ServiceItem { name: "A4".to_string(), price: Money::from_major(2) }],
///     }],
/// };
/// let clean = normalize_service(&service).unwrap();
/// assert_eq!(clean.name, "Printing");
/// assert!(clean.categories.is_empty());
/// ```
pub fn normalize_service(input: &Service) -> ValidationResult<Service> {
    let name = validate_required_text("name", &input.name)?;

    let mut categories = Vec::with_capacity(input.categories.len());
    for category in &input.categories {
        let category_name = category.name.trim();
        if category_name.is_empty() {
            continue;
        }

        let mut items = Vec::with_capacity(category.items.len());
        for item in &category.items {
            let item_name = item.name.trim();
            if item_name.is_empty() {
                continue;
            }
            if item.price.is_negative() {
                return Err(ValidationError::MustNotBeNegative {
                    field: format!("price of '{}'", item_name),
                });
            }
            items.push(ServiceItem {
                name: item_name.to_string(),
                price: item.price,
            });
        }

        categories.push(ServiceCategory {
            name: category_name.to_string(),
            items,
        });
    }

    Ok(Service {
        id: input.id.clone(),
        name,
        categories,
    })
}

// =============================================================================
// Search
// =============================================================================

/// Services whose name, a category name or an item name contains `term`,
/// ignoring case. A blank term matches everything.
pub fn search<'a>(services: &'a [Service], term: &str) -> Vec<&'a Service> {
    let term = term.trim().to_lowercase();
    let contains_term = |text: &str| text.to_lowercase().contains(&term);

    services
        .iter()
        .filter(|service| {
            term.is_empty()
                || contains_term(&service.name)
                || service.categories.iter().any(|c| {
                    contains_term(&c.name) || c.items.iter().any(|item| contains_term(&item.name))
                })
        })
        .collect()
}

// =============================================================================
// Discount
// =============================================================================

/// A percentage discount in basis points (1250 = 12.5%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Discount(u32);

impl Discount {
    pub const fn none() -> Self {
        Discount(0)
    }

    /// Parses a percentage as typed ("10", "12.5"). Must lie in 0..=100.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::catalog::Discount;
    ///
    /// assert_eq!(Discount::parse("12.5").unwrap().bps(), 1250);
    /// assert!(Discount::parse("101").is_err());
    /// assert!(Discount::parse("-5").is_err());
    /// ```
    pub fn parse(input: &str) -> ValidationResult<Self> {
        let out_of_range = || ValidationError::InvalidFormat {
            field: "discount".to_string(),
            reason: "must be between 0 and 100".to_string(),
        };

        // hundredths of a percent are basis points
        let hundredths = Money::parse_decimal(input)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "discount".to_string(),
                reason: "not a percentage".to_string(),
            })?
            .cents();
        let bps = u32::try_from(hundredths).map_err(|_| out_of_range())?;
        if bps > FULL_BPS {
            return Err(out_of_range());
        }
        Ok(Discount(bps))
    }

    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Price after the discount, rounded to the nearest cent.
    pub fn apply(&self, price: Money) -> Money {
        if self.0 == 0 {
            return price;
        }
        let scaled = i128::from(price.cents()) * i128::from(FULL_BPS - self.0);
        let half = i128::from(FULL_BPS / 2);
        let rounded = if scaled >= 0 {
            (scaled + half) / i128::from(FULL_BPS)
        } else {
            (scaled - half) / i128::from(FULL_BPS)
        };
        // |rounded| <= |price|, so it always fits back into i64
        Money::from_cents(rounded as i64)
    }
}

// =============================================================================
// Quote
// =============================================================================

/// One line of a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuoteLine {
    pub name: String,
    pub list_price: Money,
    pub price: Money,
}

/// Selected catalog items priced with a discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quote {
    pub discount: Discount,
    pub lines: Vec<QuoteLine>,
    pub total: Money,
}

impl Quote {
    /// The text the shop pastes into a message, one `name: price` per line.
    pub fn summary(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("{}: {}", line.name, line.price))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Prices `items` with `discount` and sums them.
pub fn quote(items: &[&ServiceItem], discount: Discount) -> Quote {
    let lines: Vec<QuoteLine> = items
        .iter()
        .map(|item| QuoteLine {
            name: item.name.clone(),
            list_price: item.price,
            price: discount.apply(item.price),
        })
        .collect();
    let total = lines.iter().map(|line| line.price).sum();

    Quote {
        discount,
        lines,
        total,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, price_cents: i64) -> ServiceItem {
        ServiceItem {
            name: name.to_string(),
            price: Money::from_cents(price_cents),
        }
    }

    fn printing() -> Service {
        Service {
            id: "svc-1".to_string(),
            name: "Printing".to_string(),
            categories: vec![
                ServiceCategory {
                    name: "A4".to_string(),
                    items: vec![item("Black & white", 150), item("Color", 500)],
                },
                ServiceCategory {
                    name: "Binding".to_string(),
                    items: vec![item("Spiral", 2_500)],
                },
            ],
        }
    }

    #[test]
    fn test_normalize_drops_unnamed_entries() {
        let mut service = printing();
        service.name = "  Printing ".to_string();
        service.categories[0].items.push(item("  ", 100));
        service.categories.push(ServiceCategory {
            name: String::new(),
            items: vec![item("Orphan", 100)],
        });

        let clean = normalize_service(&service).unwrap();
        assert_eq!(clean.id, "svc-1");
        assert_eq!(clean.name, "Printing");
        assert_eq!(clean.categories.len(), 2);
        assert_eq!(clean.categories[0].items.len(), 2);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        let mut service = printing();
        service.name = " ".to_string();
        assert!(matches!(
            normalize_service(&service),
            Err(ValidationError::Required { .. })
        ));

        let mut service = printing();
        service.categories[1].items[0].price = Money::from_cents(-1);
        assert!(matches!(
            normalize_service(&service),
            Err(ValidationError::MustNotBeNegative { .. })
        ));
    }

    #[test]
    fn test_search_covers_names_categories_and_items() {
        let services = vec![
            printing(),
            Service {
                id: "svc-2".to_string(),
                name: "Repairs".to_string(),
                categories: Vec::new(),
            },
        ];

        assert_eq!(search(&services, "").len(), 2);
        assert_eq!(search(&services, "repair")[0].id, "svc-2");
        assert_eq!(search(&services, "BINDING")[0].id, "svc-1");
        assert_eq!(search(&services, "spiral").len(), 1);
        assert!(search(&services, "lamination").is_empty());
    }

    #[test]
    fn test_discount_rounds_to_nearest_cent() {
        let ten = Discount::parse("10").unwrap();
        assert_eq!(ten.apply(Money::from_major(100)), Money::from_major(90));
        assert_eq!(ten.apply(Money::from_cents(155)), Money::from_cents(140));
        assert_eq!(Discount::parse("100").unwrap().apply(Money::from_major(7)), Money::zero());
        assert_eq!(Discount::none().apply(Money::from_cents(199)), Money::from_cents(199));
        assert!(Discount::parse("ten").is_err());
    }

    #[test]
    fn test_quote_totals_discounted_lines() {
        let service = printing();
        let selected = [
            service.item("Color").unwrap(),
            service.item(" Spiral ").unwrap(),
        ];

        let q = quote(&selected, Discount::parse("20").unwrap());
        assert_eq!(q.lines[0].price, Money::from_major(4));
        assert_eq!(q.lines[1].list_price, Money::from_major(25));
        assert_eq!(q.total, Money::from_major(24));
        assert_eq!(q.summary(), "Color: 4.00\nSpiral: 20.00");
        assert!(service.item("Lamination").is_none());
    }
}
