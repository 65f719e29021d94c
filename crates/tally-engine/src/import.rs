//! # Contact Import
//!
//! Reads a phone-book CSV export into customer rows for
//! [`LoyaltyEngine::import_customers`](crate::LoyaltyEngine::import_customers).
//!
//! ## Expected Layout
//! ```text
//! Name,Given Name,...,Phone 1 - Type,Phone 1 - Value,...
//! Mona Ali,Mona,...,Mobile,+20 100 123 4567,...
//! ```
//! The first header containing `Name` and the first containing
//! `Phone 1 - Value` are used. Fields are split on `,` with no quoting
//! support; rows missing either value are skipped.

use serde::{Deserialize, Serialize};
use tally_core::validation::normalize_contact;
use tally_core::ValidationError;

use crate::error::EngineResult;

const NAME_HEADER: &str = "Name";
const PHONE_HEADER: &str = "Phone 1 - Value";

/// One customer to import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub name: String,
    /// Normalized contact number.
    pub contact: String,
}

/// Parses CSV text into import rows.
///
/// Fails with `InvalidFormat` when the header lacks a name or phone column.
pub fn parse_contacts_csv(text: &str) -> EngineResult<Vec<ImportRow>> {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default();
    let headers: Vec<&str> = header.split(',').map(str::trim).collect();

    let name_index = headers.iter().position(|h| h.contains(NAME_HEADER));
    let phone_index = headers.iter().position(|h| h.contains(PHONE_HEADER));

    let (Some(name_index), Some(phone_index)) = (name_index, phone_index) else {
        return Err(ValidationError::InvalidFormat {
            field: "csv".to_string(),
            reason: format!("missing '{}' or '{}' column", NAME_HEADER, PHONE_HEADER),
        }
        .into());
    };

    let rows = lines
        .filter_map(|line| {
            let cells: Vec<&str> = line.split(',').collect();
            let name = cells.get(name_index)?.trim();
            let phone: String = cells
                .get(phone_index)?
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if name.is_empty() {
                return None;
            }
            let contact = normalize_contact(&phone)?;
            Some(ImportRow {
                name: name.to_string(),
                contact,
            })
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_parses_google_contacts_export() {
        let csv = "Name,Given Name,Phone 1 - Type,Phone 1 - Value\r\n\
                   Mona Ali,Mona,Mobile,+20 100 123 4567\r\n\
                   Omar,Omar,Mobile,1112345678\n\
                   No Phone,No,Mobile,\n\
                   ,Blank,Mobile,01000000000\n";

        let rows = parse_contacts_csv(csv).unwrap();
        assert_eq!(
            rows,
            vec![
                ImportRow {
                    name: "Mona Ali".to_string(),
                    contact: "01001234567".to_string(),
                },
                ImportRow {
                    name: "Omar".to_string(),
                    contact: "01112345678".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_missing_columns() {
        let err = parse_contacts_csv("Full Label,Mobile\nA,010").unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::InvalidFormat { .. })));
        assert!(parse_contacts_csv("").is_err());
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let rows = parse_contacts_csv("Name,Phone 1 - Value\nOnly Name\n").unwrap();
        assert!(rows.is_empty());
    }
}
