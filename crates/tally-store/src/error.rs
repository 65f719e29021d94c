//! # Store Error Types
//!
//! Error types for document store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Store Error Flow                                  │
//! │                                                                         │
//! │  sqlx::Error ──────┐                                                   │
//! │  MigrateError ─────┼──► StoreError ──► EngineError::Store ──► caller   │
//! │  serde_json::Error ┘        │                                          │
//! │                             └──► change feed error channel             │
//! │                                  (Subscription::next → Err)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `StoreError` is `Clone` because the same error is fanned out to every
//! subscriber of a collection.

use thiserror::Error;

use crate::document::Collection;

/// Document store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Document does not exist.
    ///
    /// ## When This Occurs
    /// - `update_document` on a missing key
    /// - A batch `update` targeting a missing key (the whole batch fails)
    #[error("{collection} document not found: {key}")]
    NotFound { collection: String, key: String },

    /// A document body could not be encoded or decoded.
    ///
    /// ## When This Occurs
    /// - Stored JSON does not match the expected shape
    /// - A value that is not a JSON object was written as a document
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Store connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created or opened
    /// - Pool is closed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Store is temporarily unable to serve requests.
    ///
    /// ## When This Occurs
    /// - Pool exhausted or timed out
    /// - Injected failure in the in-memory store
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(collection: Collection, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection: collection.as_str().to_string(),
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Convert sqlx errors to StoreError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database       → QueryFailed (with SQLite message)
/// sqlx::Error::PoolTimedOut   → Unavailable
/// sqlx::Error::PoolClosed     → ConnectionFailed
/// Other                       → QueryFailed
/// ```
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => StoreError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => StoreError::Unavailable("connection pool timed out".to_string()),
            sqlx::Error::PoolClosed => StoreError::ConnectionFailed("Pool is closed".to_string()),
            other => StoreError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
