use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::time::sleep;

use pricefeed::{
    ChannelError, EventBus, LocalBackend, MarketMode, MarketSnapshot, MarketStore, PricePoint,
    PullKind, RequestChannel, TypeInfo,
};

/// Scripted channel: serves queued snapshots (repeating the last one),
/// answers detail lookups locally, and records every call.
struct ScriptedChannel {
    snapshots: Mutex<VecDeque<MarketSnapshot>>,
    mode: Mutex<MarketMode>,
    info_calls: Mutex<Vec<i32>>,
    history_calls: Mutex<Vec<i32>>,
}

impl ScriptedChannel {
    fn new(snapshots: Vec<MarketSnapshot>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
            mode: Mutex::new(MarketMode::Sell),
            info_calls: Mutex::new(Vec::new()),
            history_calls: Mutex::new(Vec::new()),
        }
    }

    fn next_snapshot(&self) -> MarketSnapshot {
        let mut queue = self.snapshots.lock();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(MarketSnapshot::empty)
        } else {
            queue.front().cloned().unwrap_or_else(MarketSnapshot::empty)
        }
    }
}

#[async_trait]
impl RequestChannel for ScriptedChannel {
    async fn get_current(&self) -> Result<MarketSnapshot, ChannelError> {
        Ok(self.next_snapshot())
    }

    async fn force_refresh(&self) -> Result<MarketSnapshot, ChannelError> {
        Ok(self.next_snapshot())
    }

    async fn fetch_type_info(&self, type_id: i32) -> Result<Option<TypeInfo>, ChannelError> {
        self.info_calls.lock().push(type_id);
        Ok(Some(TypeInfo {
            type_id,
            name: format!("Item {type_id}"),
            description: String::new(),
            icon_url: format!("https://images.evetech.net/types/{type_id}/icon?size=64"),
        }))
    }

    async fn fetch_price_history(&self, type_id: i32) -> Result<Vec<PricePoint>, ChannelError> {
        self.history_calls.lock().push(type_id);
        Ok(vec![PricePoint {
            date: NaiveDate::from_ymd_opt(2025, 11, 28).unwrap(),
            average: 950.0,
            highest: 1100.0,
            lowest: 880.0,
            order_count: 42,
            volume: 1000,
        }])
    }

    async fn toggle_mode(&self) -> Result<MarketMode, ChannelError> {
        let mut mode = self.mode.lock();
        *mode = mode.flipped();
        Ok(*mode)
    }

    async fn current_mode(&self) -> Result<MarketMode, ChannelError> {
        Ok(*self.mode.lock())
    }
}

fn tracked(type_id: i32, sell: Option<f64>, buy: Option<f64>) -> MarketSnapshot {
    MarketSnapshot {
        filename: Some(format!("The Forge-Item {type_id}-2025.11.29 125208.txt")),
        type_id: Some(type_id),
        item_name: Some(format!("Item {type_id}")),
        adjusted_sell: sell,
        adjusted_buy: buy,
        ..MarketSnapshot::empty()
    }
}

#[tokio::test]
async fn initialize_then_toggle_tracks_the_active_side() {
    let channel = Arc::new(ScriptedChannel::new(vec![tracked(
        34,
        Some(1000.0),
        Some(900.0),
    )]));
    let store = MarketStore::new(channel.clone(), EventBus::new());

    // Untracked at creation.
    assert!(!store.snapshot().is_tracked());
    assert_eq!(store.mode(), MarketMode::Sell);
    assert_eq!(store.last_active_price(), None);

    let subscriptions = store.initialize().await.unwrap();

    assert_eq!(store.snapshot().type_id, Some(34));
    assert_eq!(store.mode(), MarketMode::Sell);
    assert_eq!(store.last_active_price(), Some(1000.0));
    assert_eq!(store.type_info().map(|i| i.type_id), Some(34));
    assert_eq!(store.history().len(), 1);
    assert!(!store.busy());

    let mode = store.toggle_mode().await.unwrap();
    assert_eq!(mode, MarketMode::Buy);
    assert_eq!(store.mode(), MarketMode::Buy);
    assert_eq!(store.last_active_price(), Some(900.0));

    subscriptions.abort();
}

#[tokio::test]
async fn refresh_pull_absorbs_the_newer_snapshot() {
    let channel = Arc::new(ScriptedChannel::new(vec![
        tracked(34, Some(1000.0), Some(900.0)),
        tracked(35, Some(2000.0), Some(1800.0)),
    ]));
    let store = MarketStore::new(channel.clone(), EventBus::new());

    store.pull_snapshot(PullKind::Initial).await.unwrap();
    assert_eq!(store.snapshot().type_id, Some(34));

    store.pull_snapshot(PullKind::Refresh).await.unwrap();
    assert_eq!(store.snapshot().type_id, Some(35));
    assert_eq!(store.last_active_price(), Some(2000.0));

    // One detail refresh per distinct pull.
    assert_eq!(channel.info_calls.lock().as_slice(), &[34, 35]);
    assert_eq!(channel.history_calls.lock().as_slice(), &[34, 35]);
}

#[tokio::test]
async fn log_export_push_flows_through_the_bus_into_the_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let bus = EventBus::new();

    // Producer side: real backend over a real log directory.
    let backend = LocalBackend::new(dir.path().to_path_buf(), bus.clone());
    backend.prime().unwrap();

    // Consumer side: the store's own channel stays scripted so detail
    // lookups resolve locally; pushes arrive from the shared bus.
    let channel = Arc::new(ScriptedChannel::new(vec![MarketSnapshot::empty()]));
    let store = MarketStore::new(channel.clone(), bus.clone());
    let subscriptions = store.initialize().await.unwrap();
    assert!(!store.snapshot().is_tracked());

    std::fs::write(
        dir.path()
            .join("The Forge-Strong Mindflood Booster-2025.11.29 125208.txt"),
        "\
price,volRemaining,typeID,range,orderID,volEntered,minVolume,bid,issueDate,duration,stationID,regionID,solarSystemID,jumps,
532000.50,3.0,28668,32767,6325235001,10,1,False,2025-11-29 12:30:00.000000,90,60003760,10000002,30000142,0,
",
    )
    .unwrap();
    backend.reload_from_disk().unwrap();

    sleep(Duration::from_millis(50)).await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.type_id, Some(28668));
    assert_eq!(snapshot.adjusted_sell, Some(531900.50));
    assert_eq!(store.last_active_price(), Some(531900.50));
    assert_eq!(channel.info_calls.lock().as_slice(), &[28668]);
    assert_eq!(channel.history_calls.lock().as_slice(), &[28668]);

    // Mode pushes ride the second topic.
    bus.publish_mode(MarketMode::Buy);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(store.mode(), MarketMode::Buy);
    // No buy price in the export, so the retained value stands.
    assert_eq!(store.last_active_price(), Some(531900.50));

    subscriptions.abort();
}

#[tokio::test]
async fn untracked_push_clears_tracking_but_not_retention() {
    let channel = Arc::new(ScriptedChannel::new(vec![tracked(
        34,
        Some(1000.0),
        Some(900.0),
    )]));
    let bus = EventBus::new();
    let store = MarketStore::new(channel.clone(), bus.clone());
    let subscriptions = store.initialize().await.unwrap();
    assert_eq!(store.last_active_price(), Some(1000.0));

    bus.publish_snapshot(MarketSnapshot::empty());
    sleep(Duration::from_millis(50)).await;

    assert!(!store.snapshot().is_tracked());
    assert_eq!(store.last_active_price(), Some(1000.0));
    // An untracked push carries no item, so no detail refresh fires.
    assert_eq!(channel.info_calls.lock().as_slice(), &[34]);

    subscriptions.abort();
}
