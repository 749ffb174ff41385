//! The market store: one consistent client-side view of the moving market.
//!
//! The store owns all client-local state. It pulls authoritative snapshots
//! over the [`RequestChannel`], absorbs unsolicited pushes from the
//! [`EventBus`], derives the active price from mode + snapshot, and retains
//! the last non-null derived price across every trigger.
//!
//! Mutations happen under a short-lived mutex that is never held across an
//! await, so interleaved pulls and pushes each run their full sequence
//! without tearing state. An in-flight pull's snapshot write can still land
//! after a newer push's write; no sequence guard is applied, matching the
//! producer's behavior.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::{EventBus, RequestChannel};
use crate::error::ChannelError;
use crate::model::{MarketMode, MarketSnapshot, PricePoint, TypeInfo};

/// Which pull operation to run against the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullKind {
    /// Read the current authoritative snapshot as-is.
    Initial,
    /// Force the producer to re-read its source first.
    Refresh,
}

/// Everything the store owns. Cloned out as a read-only projection;
/// external code never mutates it in place.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreState {
    pub snapshot: MarketSnapshot,
    pub mode: MarketMode,
    pub type_info: Option<TypeInfo>,
    pub history: Vec<PricePoint>,
    /// True for the whole duration of an in-flight pull.
    pub busy: bool,
    /// Last non-null active price observed after any state change. Never
    /// overwritten by absence.
    pub last_active_price: Option<f64>,
}

impl StoreState {
    fn new() -> Self {
        Self {
            snapshot: MarketSnapshot::empty(),
            mode: MarketMode::Sell,
            type_info: None,
            history: Vec::new(),
            busy: false,
            last_active_price: None,
        }
    }
}

struct Inner {
    channel: Arc<dyn RequestChannel>,
    bus: EventBus,
    state: Mutex<StoreState>,
}

/// Clears the busy flag on every exit path, including error returns.
struct BusyGuard {
    inner: Arc<Inner>,
}

impl BusyGuard {
    fn engage(inner: &Arc<Inner>) -> Self {
        inner.state.lock().busy = true;
        Self {
            inner: inner.clone(),
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.inner.state.lock().busy = false;
    }
}

/// Handles for the two push subscriptions started by
/// [`MarketStore::initialize`]. Aborting them is the unsubscribe path.
pub struct Subscriptions {
    pub snapshots: JoinHandle<()>,
    pub modes: JoinHandle<()>,
}

impl Subscriptions {
    /// Stop listening on both topics.
    pub fn abort(&self) {
        self.snapshots.abort();
        self.modes.abort();
    }
}

/// Single owner of client-local market state. Cheap to clone; clones
/// share one state.
#[derive(Clone)]
pub struct MarketStore {
    inner: Arc<Inner>,
}

impl MarketStore {
    pub fn new(channel: Arc<dyn RequestChannel>, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel,
                bus,
                state: Mutex::new(StoreState::new()),
            }),
        }
    }

    /// The price selected by the current mode from the current snapshot.
    /// Pure projection of `(snapshot, mode)`.
    pub fn active_price(&self) -> Option<f64> {
        let state = self.inner.state.lock();
        state.snapshot.active_price(state.mode)
    }

    /// Read-only copy of the full store state.
    pub fn state(&self) -> StoreState {
        self.inner.state.lock().clone()
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        self.inner.state.lock().snapshot.clone()
    }

    pub fn mode(&self) -> MarketMode {
        self.inner.state.lock().mode
    }

    pub fn busy(&self) -> bool {
        self.inner.state.lock().busy
    }

    pub fn last_active_price(&self) -> Option<f64> {
        self.inner.state.lock().last_active_price
    }

    pub fn type_info(&self) -> Option<TypeInfo> {
        self.inner.state.lock().type_info.clone()
    }

    pub fn history(&self) -> Vec<PricePoint> {
        self.inner.state.lock().history.clone()
    }

    /// Pull an authoritative snapshot and absorb it.
    ///
    /// Busy is held for the whole call and released on every exit path. A
    /// channel failure propagates to the caller with prior state untouched.
    pub async fn pull_snapshot(&self, kind: PullKind) -> Result<(), ChannelError> {
        let _busy = BusyGuard::engage(&self.inner);

        let snapshot = match kind {
            PullKind::Initial => self.inner.channel.get_current().await?,
            PullKind::Refresh => self.inner.channel.force_refresh().await?,
        };

        self.absorb_snapshot(snapshot).await;
        Ok(())
    }

    /// Fetch item metadata and store the result, including `None` for an
    /// unknown item. No retry.
    pub async fn fetch_type_info(&self, type_id: i32) -> Result<(), ChannelError> {
        let info = self.inner.channel.fetch_type_info(type_id).await?;
        self.inner.state.lock().type_info = info;
        Ok(())
    }

    /// Fetch the price history and replace the held sequence wholesale.
    /// No retry, no incremental merge.
    pub async fn fetch_price_history(&self, type_id: i32) -> Result<(), ChannelError> {
        let history = self.inner.channel.fetch_price_history(type_id).await?;
        self.inner.state.lock().history = history;
        Ok(())
    }

    /// Round-trip a mode flip through the authoritative channel operation
    /// and store the returned mode. Not a pull; busy is untouched.
    pub async fn toggle_mode(&self) -> Result<MarketMode, ChannelError> {
        let mode = self.inner.channel.toggle_mode().await?;
        self.inner.state.lock().mode = mode;
        self.record_active_price();
        Ok(mode)
    }

    /// Startup orchestration: initial pull, authoritative mode query, then
    /// subscribe to both push topics for the life of the process.
    pub async fn initialize(&self) -> Result<Subscriptions, ChannelError> {
        self.pull_snapshot(PullKind::Initial).await?;

        let mode = self.inner.channel.current_mode().await?;
        self.inner.state.lock().mode = mode;

        let store = self.clone();
        let mut snapshot_rx = self.inner.bus.subscribe_snapshots();
        let snapshots = tokio::spawn(async move {
            loop {
                match snapshot_rx.recv().await {
                    Ok(snapshot) => store.absorb_snapshot(snapshot).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "snapshot subscription lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let store = self.clone();
        let mut mode_rx = self.inner.bus.subscribe_modes();
        let modes = tokio::spawn(async move {
            loop {
                match mode_rx.recv().await {
                    Ok(mode) => store.absorb_mode(mode),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "mode subscription lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscriptions { snapshots, modes })
    }

    /// Replace the snapshot in full, refresh item details when an item is
    /// tracked, then update the retained active price. Shared by pulls and
    /// pushes; pushes reach this without touching busy.
    async fn absorb_snapshot(&self, snapshot: MarketSnapshot) {
        let type_id = snapshot.type_id;
        self.inner.state.lock().snapshot = snapshot;

        if let Some(type_id) = type_id {
            self.refresh_details(type_id).await;
        }

        self.record_active_price();
    }

    fn absorb_mode(&self, mode: MarketMode) {
        self.inner.state.lock().mode = mode;
        self.record_active_price();
    }

    /// Run the metadata and history fetches concurrently and wait for both.
    /// A failure in either is contained here: the snapshot replacement
    /// already committed stands, and the failed field keeps its old value.
    async fn refresh_details(&self, type_id: i32) {
        let (info, history) = tokio::join!(
            self.fetch_type_info(type_id),
            self.fetch_price_history(type_id),
        );

        if let Err(err) = info {
            warn!(type_id, %err, "type info fetch failed");
        }
        if let Err(err) = history {
            warn!(type_id, %err, "price history fetch failed");
        }
    }

    /// Store the derived active price if it is non-null; keep the previous
    /// value otherwise.
    fn record_active_price(&self) {
        let mut state = self.inner.state.lock();
        if let Some(price) = state.snapshot.active_price(state.mode) {
            state.last_active_price = Some(price);
            debug!(price, "active price recorded");
        }
    }
}
