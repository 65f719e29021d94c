//! # Engine Error Types
//!
//! Errors surfaced by the loyalty engine entry points.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Input          │  │   Lookup        │  │     Store               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  NotFound       │  │  Store (StoreError)     │ │
//! │  │  OverRedemption │  │                 │  │  PartialBatch           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Configuration  │  │   Internal      │                              │
//! │  │  Config         │  │  ChannelError   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Input and lookup errors are always raised before anything is written.

use tally_core::{CoreError, ValidationError};
use tally_store::StoreError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Input Errors
    // =========================================================================
    /// A form or request field failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// More points requested than the customer holds.
    ///
    /// ## When This Occurs
    /// - Discount redemption above the balance
    /// - Cash-back above the balance
    /// - A pending redemption whose balance shrank before the sale was saved
    #[error("Cannot redeem {requested} points: only {available} available")]
    OverRedemption { requested: i64, available: i64 },

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    /// A sale or customer referenced by the caller does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// The document store rejected a read or write.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A chunked job stopped part way. Earlier chunks stay committed.
    #[error("{job} stopped after {succeeded} of {total} documents: {source}")]
    PartialBatch {
        job: String,
        succeeded: usize,
        total: usize,
        source: StoreError,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration could not be loaded, saved or validated.
    #[error("Invalid configuration: {0}")]
    Config(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl EngineError {
    pub fn sale_not_found(id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: "sale",
            key: id.into(),
        }
    }

    pub fn service_not_found(id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: "service",
            key: id.into(),
        }
    }

    pub fn customer_not_found(contact: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: "customer",
            key: contact.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// True for errors caused by the request itself rather than the store.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_) | EngineError::OverRedemption { .. } | EngineError::NotFound { .. }
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::OverRedemption {
                requested,
                available,
            } => EngineError::OverRedemption {
                requested,
                available,
            },
            CoreError::Validation(inner) => EngineError::Validation(inner),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_engine_variants() {
        let err: EngineError = CoreError::OverRedemption {
            requested: 500,
            available: 300,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::OverRedemption {
                requested: 500,
                available: 300
            }
        ));

        let err: EngineError = CoreError::Validation(ValidationError::Required {
            field: "date".to_string(),
        })
        .into();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(err.is_rejected_input());
    }

    #[test]
    fn test_store_errors_are_not_rejected_input() {
        let err: EngineError = StoreError::Unavailable("offline".to_string()).into();
        assert!(!err.is_rejected_input());
        assert!(EngineError::customer_not_found("010").is_not_found());
    }

    #[test]
    fn test_partial_batch_message() {
        let err = EngineError::PartialBatch {
            job: "import".to_string(),
            succeeded: 400,
            total: 900,
            source: StoreError::Unavailable("offline".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "import stopped after 400 of 900 documents: Store unavailable: offline"
        );
    }
}
