//! # Feed Watcher
//!
//! Long-running task that keeps [`AppState`](crate::state::AppState) in step
//! with the store and persists the tier changes each snapshot reveals.
//!
//! ## Watch Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FeedWatcher::run()                               │
//! │                                                                         │
//! │   subscribe(sales)      subscribe(customers)      shutdown_rx           │
//! │         │                      │                       │                │
//! │         └──────────┬───────────┘                       │                │
//! │                    ▼                                   │                │
//! │             tokio::select! ◄───────────────────────────┘                │
//! │                    │                                                    │
//! │   Ok(snapshot) ──► engine.apply_snapshot() ──► sync_tiers()             │
//! │   Err(error)   ──► error!(...), keep listening                          │
//! │   None         ──► feed closed, branch disabled                         │
//! │   shutdown     ──► stop (also when every handle is dropped)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use tally_store::{Collection, FeedEvent};

use crate::engine::LoyaltyEngine;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Feed Watcher
// =============================================================================

/// Applies change-feed snapshots to the engine's state.
pub struct FeedWatcher {
    engine: Arc<LoyaltyEngine>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running watcher.
#[derive(Clone)]
pub struct FeedWatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl FeedWatcherHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelError("Shutdown channel closed".into()))
    }
}

/// Counters reported when the watcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub snapshots_applied: u64,
    pub feed_errors: u64,
    pub tiers_written: u64,
}

impl FeedWatcher {
    /// Creates a watcher and the handle that stops it.
    pub fn new(engine: Arc<LoyaltyEngine>) -> (Self, FeedWatcherHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            FeedWatcher {
                engine,
                shutdown_rx,
            },
            FeedWatcherHandle { shutdown_tx },
        )
    }

    /// Runs the watch loop until shutdown or until the store goes away.
    ///
    /// This should be spawned as a background task. Fails only if the
    /// initial subscriptions cannot be opened.
    pub async fn run(self) -> EngineResult<WatchSummary> {
        let FeedWatcher {
            engine,
            mut shutdown_rx,
        } = self;
        let store = engine.store();
        let mut sales = store.subscribe(Collection::Sales).await?;
        let mut customers = store.subscribe(Collection::Customers).await?;
        let mut summary = WatchSummary::default();

        info!("Feed watcher starting");

        loop {
            tokio::select! {
                Some(event) = sales.next() => {
                    handle(&engine, Collection::Sales, event, &mut summary).await;
                }

                Some(event) = customers.next() => {
                    handle(&engine, Collection::Customers, event, &mut summary).await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Feed watcher shutting down");
                    break;
                }
            }
        }

        info!(
            snapshots = summary.snapshots_applied,
            errors = summary.feed_errors,
            tiers = summary.tiers_written,
            "Feed watcher stopped"
        );
        Ok(summary)
    }
}

async fn handle(engine: &LoyaltyEngine, collection: Collection, event: FeedEvent, summary: &mut WatchSummary) {
    match event {
        Ok(snapshot) => {
            debug!(collection = %collection, documents = snapshot.len(), "Snapshot received");
            let written = engine.apply_snapshot(&snapshot).await;
            summary.snapshots_applied += 1;
            summary.tiers_written += written as u64;
        }
        Err(e) => {
            summary.feed_errors += 1;
            error!(collection = %collection, error = %e, "Change feed error");
        }
    }
}
