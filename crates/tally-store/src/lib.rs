//! # tally-store: Document Store Layer for Tally
//!
//! Keyed JSON documents grouped in collections, with a live change feed and
//! atomic write batches.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     tally-engine (LoyaltyEngine)                        │
//! │                                │                                        │
//! │                   Arc<dyn DocumentStore>                                │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ tally-store (THIS CRATE) ★                        │   │
//! │  │                                                                  │   │
//! │  │   document ── batch ── feed ── store (trait)                    │   │
//! │  │                                   │                              │   │
//! │  │                   ┌───────────────┴──────────────┐              │   │
//! │  │                   ▼                              ▼              │   │
//! │  │             MemoryStore                    SqliteStore          │   │
//! │  │                                       (sqlx, WAL, migrations)   │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`document`] - Collections, document bodies, snapshots
//! - [`batch`] - Atomic write batches
//! - [`feed`] - Change feed hub and subscriptions
//! - [`store`] - The `DocumentStore` trait
//! - [`memory`] - In-memory implementation
//! - [`sqlite`] - SQLite implementation
//! - [`migrations`] - Embedded SQL migrations
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_store::{SqliteStore, StoreConfig, DocumentStore, Collection};
//!
//! let store = SqliteStore::connect(StoreConfig::new("tally.db")).await?;
//! let mut sales = store.subscribe(Collection::Sales).await?;
//! while let Some(event) = sales.next().await {
//!     let snapshot = event?;
//!     println!("{} sales", snapshot.len());
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod batch;
pub mod document;
pub mod error;
pub mod feed;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use batch::{WriteBatch, WriteOp};
pub use document::{Collection, CollectionSnapshot, Document, StoredDocument};
pub use error::{StoreError, StoreResult};
pub use feed::{FeedEvent, Subscription};
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreConfig};
pub use store::DocumentStore;
