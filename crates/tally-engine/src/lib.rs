//! # tally-engine: Loyalty Engine for Tally
//!
//! Turns dashboard actions into document writes, keeps the aggregate view in
//! step with the store, and runs the bulk jobs.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Callers (tally-admin CLI, dashboard)                    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ tally-engine (THIS CRATE) ★                       │   │
//! │  │                                                                  │   │
//! │  │   LoyaltyEngine ── BatchRunner ── AuditLog                       │   │
//! │  │        ▲                                                         │   │
//! │  │        │ apply_snapshot()                                        │   │
//! │  │   FeedWatcher ──► StateHandle (AppState: sales, customers, views)│   │
//! │  └─────────────────────────────┬────────────────────────────────────┘   │
//! │                                │                                        │
//! │               tally-core (rules)   tally-store (documents)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `LoyaltyEngine` entry points and their outcomes
//! - [`state`] - Snapshot-driven application state
//! - [`feed`] - Change-feed watcher task
//! - [`batch`] - Chunked bulk writes
//! - [`audit`] - Activity log
//! - [`import`] - Contact CSV parsing
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_engine::{FeedWatcher, LoyaltyEngine, TallyConfig};
//! use tally_store::SqliteStore;
//!
//! let config = TallyConfig::load(None)?;
//! let store = Arc::new(SqliteStore::connect(config.store_config()).await?);
//! let engine = Arc::new(LoyaltyEngine::new(store, &config).with_user("owner"));
//!
//! let (watcher, handle) = FeedWatcher::new(engine.clone());
//! tokio::spawn(watcher.run());
//!
//! let pending = engine.on_redeem_for_discount("01001234567", 400).await?;
//! let outcome = engine.on_sale_saved(&form, None, Some(pending)).await?;
//! handle.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod import;
pub mod state;

// =============================================================================
// Re-exports
// =============================================================================

pub use audit::AuditLog;
pub use batch::{BatchFailure, BatchReport, BatchRunner};
pub use config::TallyConfig;
pub use engine::{CashBackOutcome, DeleteOutcome, LoyaltyEngine, ReconcileReport, SaveOutcome};
pub use error::{EngineError, EngineResult};
pub use feed::{FeedWatcher, FeedWatcherHandle, WatchSummary};
pub use import::{parse_contacts_csv, ImportRow};
pub use state::{AppState, StateHandle};
