//! Change feed: the store's row-level notification mechanism.
//!
//! The content publisher signals the feed only after a row has committed,
//! so an event is always observable by a subsequent range query. Receivers
//! that fall behind see a lag error, which `core_sync` degrades to a
//! catch-up query rather than a missed row.

use super::model::types::ContentKey;
use tokio::sync::broadcast;

/// Notification that a content row committed in some container.
#[derive(Debug, Clone)]
pub struct ContentEvent {
    /// Raw container id the row belongs to
    pub container_id: String,
    /// The committed row's ordering key
    pub key: ContentKey,
}

/// Broadcast fanout of committed content rows.
///
/// Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ContentEvent>,
}

impl ChangeFeed {
    /// Create a feed with the given per-receiver buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new receiver. Events published before this call are not
    /// replayed; subscribers backfill from the store instead.
    pub fn subscribe(&self) -> broadcast::Receiver<ContentEvent> {
        self.tx.subscribe()
    }

    /// Announce a committed row. A feed with no live receivers is fine;
    /// the event is simply dropped.
    pub fn publish(&self, event: ContentEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        // Enough headroom that a briefly-stalled viewer task does not lag
        // under ordinary chat volume.
        Self::new(256)
    }
}
