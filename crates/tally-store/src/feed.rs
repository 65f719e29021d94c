//! # Change Feed
//!
//! Live subscriptions to a collection. Every notification carries the full
//! collection, never a diff, so a subscriber that falls behind loses nothing
//! by skipping straight to the newest snapshot.
//!
//! ```text
//! ┌──────────────┐  write   ┌──────────────┐ snapshot ┌────────────────────┐
//! │ set / update │ ───────► │ store commit │ ───────► │ FeedHub (per coll) │
//! │ delete / add │          └──────────────┘          │ broadcast::Sender  │
//! └──────────────┘                                    └─────────┬──────────┘
//!                                                               │
//!                                    ┌──────────────────────────┼─────────┐
//!                                    ▼                          ▼         ▼
//!                              Subscription               Subscription   ...
//!                          (initial snapshot first)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, warn};

use crate::document::{Collection, CollectionSnapshot};
use crate::error::StoreError;

/// What a subscriber receives: a full snapshot, or an error from the store.
pub type FeedEvent = Result<Arc<CollectionSnapshot>, StoreError>;

/// Default per-collection channel capacity.
pub const DEFAULT_FEED_CAPACITY: usize = 64;

// =============================================================================
// Feed Hub
// =============================================================================

/// Per-collection broadcast senders shared by a store's handles.
#[derive(Debug)]
pub struct FeedHub {
    capacity: usize,
    senders: Mutex<HashMap<Collection, broadcast::Sender<FeedEvent>>>,
}

impl Default for FeedHub {
    fn default() -> Self {
        FeedHub::new(DEFAULT_FEED_CAPACITY)
    }
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        FeedHub {
            capacity: capacity.max(1),
            senders: Mutex::new(HashMap::new()),
        }
    }

    fn senders(&self) -> MutexGuard<'_, HashMap<Collection, broadcast::Sender<FeedEvent>>> {
        self.senders.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a receiver for `collection`. Events published after this call
    /// are delivered to it.
    pub fn receiver(&self, collection: Collection) -> broadcast::Receiver<FeedEvent> {
        let capacity = self.capacity;
        self.senders()
            .entry(collection)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Whether anyone is listening; stores skip building snapshots otherwise.
    pub fn has_subscribers(&self, collection: Collection) -> bool {
        self.senders()
            .get(&collection)
            .map_or(false, |sender| sender.receiver_count() > 0)
    }

    pub fn publish(&self, collection: Collection, event: FeedEvent) {
        let senders = self.senders();
        if let Some(sender) = senders.get(&collection) {
            // send only fails when there are no receivers left
            if sender.send(event).is_err() {
                debug!(collection = %collection, "No subscribers for change feed event");
            }
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A live view of one collection.
///
/// The first event is the snapshot taken when subscribing; later events
/// follow every committed write. Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    collection: Collection,
    initial: Option<FeedEvent>,
    receiver: broadcast::Receiver<FeedEvent>,
}

impl Subscription {
    pub fn new(collection: Collection, initial: FeedEvent, receiver: broadcast::Receiver<FeedEvent>) -> Self {
        Subscription {
            collection,
            initial: Some(initial),
            receiver,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Waits for the next event. `None` once the store has gone away.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    // recv() would resume at the oldest retained event
                    let (latest, drained) = self.drain_to_latest();
                    warn!(
                        collection = %self.collection,
                        skipped = skipped + drained,
                        "Change feed subscriber lagged, skipping to newest snapshot"
                    );
                    if let Some(event) = latest {
                        return Some(event);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Empties the channel, keeping only the newest event. Returns it with
    /// the number of older events discarded.
    fn drain_to_latest(&mut self) -> (Option<FeedEvent>, u64) {
        let mut latest = None;
        let mut discarded = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if latest.replace(event).is_some() {
                        discarded += 1;
                    }
                }
                Err(TryRecvError::Lagged(n)) => discarded += n,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return (latest, discarded),
            }
        }
    }
}
