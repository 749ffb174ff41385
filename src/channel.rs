//! Collaborator seams between the store and the producing side.
//!
//! `RequestChannel` is the pull side: named operations returning promised
//! results. `EventBus` is the push side: an in-process broadcast-based
//! publish/subscribe pair, one topic per payload type, delivery ordered per
//! topic. Subscriptions are receiver handles, so dropping one unsubscribes.

use async_trait::async_trait;

use tokio::sync::broadcast;

use crate::error::ChannelError;
use crate::model::{MarketMode, MarketSnapshot, PricePoint, TypeInfo};

/// Per-topic buffer depth. A lagged subscriber skips to the most recent
/// events rather than blocking the publisher.
const EVENT_BUFFER: usize = 64;

/// Request/response bridge to the authoritative market state.
///
/// Implemented by [`LocalBackend`](crate::backend::LocalBackend) in
/// production and by stubs in tests.
#[async_trait]
pub trait RequestChannel: Send + Sync {
    /// Current authoritative snapshot, without touching the source.
    async fn get_current(&self) -> Result<MarketSnapshot, ChannelError>;

    /// Re-read the source and return the fresh authoritative snapshot.
    async fn force_refresh(&self) -> Result<MarketSnapshot, ChannelError>;

    /// Item metadata lookup. `Ok(None)` means the item is unknown.
    async fn fetch_type_info(&self, type_id: i32) -> Result<Option<TypeInfo>, ChannelError>;

    /// Daily price history for an item, oldest first.
    async fn fetch_price_history(&self, type_id: i32) -> Result<Vec<PricePoint>, ChannelError>;

    /// Flip the authoritative mode and return the new value. The mode bit
    /// lives with the producer; callers never flip it locally.
    async fn toggle_mode(&self) -> Result<MarketMode, ChannelError>;

    /// The authoritative mode as it currently stands.
    async fn current_mode(&self) -> Result<MarketMode, ChannelError>;
}

/// Publish/subscribe bridge for unsolicited updates.
///
/// Two topics: snapshot updates (from the file watcher or a forced refresh)
/// and mode changes. Cloning shares the underlying channels.
#[derive(Clone)]
pub struct EventBus {
    snapshots: broadcast::Sender<MarketSnapshot>,
    modes: broadcast::Sender<MarketMode>,
}

impl EventBus {
    pub fn new() -> Self {
        let (snapshots, _) = broadcast::channel(EVENT_BUFFER);
        let (modes, _) = broadcast::channel(EVENT_BUFFER);
        Self { snapshots, modes }
    }

    /// Publish a snapshot update. Lack of subscribers is not an error.
    pub fn publish_snapshot(&self, snapshot: MarketSnapshot) {
        let _ = self.snapshots.send(snapshot);
    }

    /// Publish a mode change.
    pub fn publish_mode(&self, mode: MarketMode) {
        let _ = self.modes.send(mode);
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<MarketSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_modes(&self) -> broadcast::Receiver<MarketMode> {
        self.modes.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
