//! The producing side: authoritative snapshot and mode.
//!
//! `LocalBackend` fronts the log directory and ESI. It owns the single
//! source of truth for both the snapshot and the mode; consumers reach it
//! through the [`RequestChannel`] trait and hear about out-of-band changes
//! on the [`EventBus`]. Mode flips always happen here, never client-side.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::channel::{EventBus, RequestChannel};
use crate::error::ChannelError;
use crate::esi::EsiClient;
use crate::logs;
use crate::model::{MarketMode, MarketSnapshot, PricePoint, TypeInfo};

struct Authoritative {
    snapshot: MarketSnapshot,
    mode: MarketMode,
}

struct BackendInner {
    logs_dir: PathBuf,
    esi: EsiClient,
    bus: EventBus,
    state: Mutex<Authoritative>,
}

/// Request channel implementation backed by the local log directory and
/// the public ESI API. Cheap to clone; clones share one state.
#[derive(Clone)]
pub struct LocalBackend {
    inner: Arc<BackendInner>,
}

impl LocalBackend {
    pub fn new(logs_dir: PathBuf, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(BackendInner {
                logs_dir,
                esi: EsiClient::new(),
                bus,
                state: Mutex::new(Authoritative {
                    snapshot: MarketSnapshot::empty(),
                    mode: MarketMode::Sell,
                }),
            }),
        }
    }

    /// Parse the newest export and store it without publishing. Used once
    /// at startup, before any subscriber exists.
    pub fn prime(&self) -> Result<MarketSnapshot, ChannelError> {
        let snapshot = self.parse_latest()?;
        self.inner.state.lock().snapshot = snapshot.clone();
        Ok(snapshot)
    }

    /// Re-parse the newest export, store it, and publish it as a push.
    /// Called by the file watcher on every settled change.
    pub fn reload_from_disk(&self) -> Result<MarketSnapshot, ChannelError> {
        let snapshot = self.parse_latest()?;
        self.inner.state.lock().snapshot = snapshot.clone();
        info!(item = ?snapshot.item_name, "market snapshot updated");
        self.inner.bus.publish_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    fn parse_latest(&self) -> Result<MarketSnapshot, ChannelError> {
        logs::parse_latest(&self.inner.logs_dir).map_err(|err| ChannelError::Logs(err.to_string()))
    }
}

#[async_trait]
impl RequestChannel for LocalBackend {
    async fn get_current(&self) -> Result<MarketSnapshot, ChannelError> {
        Ok(self.inner.state.lock().snapshot.clone())
    }

    async fn force_refresh(&self) -> Result<MarketSnapshot, ChannelError> {
        self.reload_from_disk()
    }

    async fn fetch_type_info(&self, type_id: i32) -> Result<Option<TypeInfo>, ChannelError> {
        self.inner.esi.type_info(type_id).await
    }

    async fn fetch_price_history(&self, type_id: i32) -> Result<Vec<PricePoint>, ChannelError> {
        self.inner.esi.price_history(type_id).await
    }

    async fn toggle_mode(&self) -> Result<MarketMode, ChannelError> {
        let mode = {
            let mut state = self.inner.state.lock();
            state.mode = state.mode.flipped();
            state.mode
        };
        info!(%mode, "mode toggled");
        self.inner.bus.publish_mode(mode);
        Ok(mode)
    }

    async fn current_mode(&self) -> Result<MarketMode, ChannelError> {
        Ok(self.inner.state.lock().mode)
    }
}
