//! # Validation Module
//!
//! Input validation and contact normalization for Tally.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Dashboard form                                               │
//! │  └── Immediate feedback (empty fields)                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Required fields, sign checks                                      │
//! │  └── Contact normalization (the customer key)                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Engine                                                       │
//! │  └── Balance checks against the stored customer                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::SaleForm;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest tag accepted on a customer.
pub const MAX_TAG_LENGTH: usize = 50;

// =============================================================================
// Sale Form
// =============================================================================

/// Validates a sale form before any mutation.
///
/// ## Rules
/// - `date` must be present
/// - `service_type` must not be blank
/// - `price` and `service_cost` must not be negative
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_sale_form;
/// use tally_core::SaleForm;
///
/// let form = SaleForm::default();
/// assert!(validate_sale_form(&form).is_err());
/// ```
pub fn validate_sale_form(form: &SaleForm) -> ValidationResult<()> {
    if form.date.is_none() {
        return Err(ValidationError::required("date"));
    }

    if form.service_type.trim().is_empty() {
        return Err(ValidationError::required("serviceType"));
    }

    if form.price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    if form.service_cost.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "serviceCost".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Contact Normalization
// =============================================================================

/// Normalizes an Egyptian mobile number to the local `01XXXXXXXXX` form.
///
/// ## Rules
/// ```text
/// digits only                 result
/// ─────────────────────────   ───────────────
/// 201XXXXXXXXX  (12 digits)   01XXXXXXXXX
/// 01XXXXXXXXX   (11 digits)   01XXXXXXXXX
/// 1XXXXXXXXX    (10 digits)   01XXXXXXXXX
/// anything else               trimmed input
/// blank                       None
/// ```
///
/// ## Example
/// ```rust
/// use tally_core::validation::normalize_contact;
///
/// assert_eq!(normalize_contact("+20 100 123 4567").as_deref(), Some("01001234567"));
/// assert_eq!(normalize_contact("1001234567").as_deref(), Some("01001234567"));
/// assert_eq!(normalize_contact("  "), None);
/// ```
pub fn normalize_contact(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    let normalized = if digits.len() == 12 && digits.starts_with("201") {
        digits[2..].to_string()
    } else if digits.len() == 11 && digits.starts_with("01") {
        digits
    } else if digits.len() == 10 && digits.starts_with('1') {
        format!("0{}", digits)
    } else {
        trimmed.to_string()
    };

    Some(normalized)
}

/// Normalizes a contact that must be present (customer add, redemption).
pub fn require_contact(raw: &str) -> ValidationResult<String> {
    normalize_contact(raw).ok_or_else(|| ValidationError::required("whatsappNumber"))
}

// =============================================================================
// Points & Text Validators
// =============================================================================

/// Validates a points amount for redemption or bonus grants.
pub fn validate_points(points: i64) -> ValidationResult<()> {
    if points <= 0 {
        return Err(ValidationError::must_be_positive("points"));
    }
    Ok(())
}

/// Validates and trims a customer tag.
pub fn validate_tag(tag: &str) -> ValidationResult<String> {
    let tag = tag.trim();

    if tag.is_empty() {
        return Err(ValidationError::required("tag"));
    }

    if tag.chars().count() > MAX_TAG_LENGTH {
        return Err(ValidationError::TooLong {
            field: "tag".to_string(),
            max: MAX_TAG_LENGTH,
        });
    }

    Ok(tag.to_string())
}

/// Validates and trims a free-text field that must not be blank.
pub fn validate_required_text(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(value.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use chrono::NaiveDate;

    fn valid_form() -> SaleForm {
        SaleForm {
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            service_type: "Repair".to_string(),
            price: Money::from_major(100),
            ..SaleForm::default()
        }
    }

    #[test]
    fn test_validate_sale_form() {
        assert!(validate_sale_form(&valid_form()).is_ok());

        let mut form = valid_form();
        form.price = Money::from_cents(-1);
        assert!(matches!(
            validate_sale_form(&form),
            Err(ValidationError::MustNotBeNegative { .. })
        ));

        let mut form = valid_form();
        form.service_cost = Money::from_cents(-1);
        assert!(validate_sale_form(&form).is_err());
    }

    #[test]
    fn test_zero_price_is_allowed() {
        let mut form = valid_form();
        form.price = Money::zero();
        assert!(validate_sale_form(&form).is_ok());
    }

    #[test]
    fn test_normalize_contact() {
        assert_eq!(normalize_contact("201001234567").as_deref(), Some("01001234567"));
        assert_eq!(normalize_contact("01001234567").as_deref(), Some("01001234567"));
        assert_eq!(normalize_contact("010-0123-4567").as_deref(), Some("01001234567"));
        assert_eq!(normalize_contact("1001234567").as_deref(), Some("01001234567"));
        assert_eq!(normalize_contact(" +44 7700 900123 ").as_deref(), Some("+44 7700 900123"));
        assert_eq!(normalize_contact(""), None);
    }

    #[test]
    fn test_require_contact() {
        assert!(require_contact("").is_err());
        assert_eq!(require_contact("1001234567").unwrap(), "01001234567");
    }

    #[test]
    fn test_validate_points() {
        assert!(validate_points(1).is_ok());
        assert!(validate_points(0).is_err());
        assert!(validate_points(-5).is_err());
    }

    #[test]
    fn test_validate_tag() {
        assert_eq!(validate_tag("  vip ").unwrap(), "vip");
        assert!(validate_tag("").is_err());
        assert!(validate_tag(&"x".repeat(51)).is_err());
        assert_eq!(validate_tag("تاجر").unwrap(), "تاجر");
    }
}
