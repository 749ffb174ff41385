//! Market data model shared by the store, the backend, and the wire.
//!
//! Field names serialize in camelCase so snapshots round-trip unchanged
//! between the log parser, the event bus, and any JSON consumer.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which side of the book the active price is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketMode {
    Sell,
    Buy,
}

impl MarketMode {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketMode::Sell => "sell",
            MarketMode::Buy => "buy",
        }
    }

    /// The other side of the book.
    pub fn flipped(&self) -> Self {
        match self {
            MarketMode::Sell => MarketMode::Buy,
            MarketMode::Buy => MarketMode::Sell,
        }
    }
}

impl fmt::Display for MarketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MarketMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sell" => Ok(MarketMode::Sell),
            "buy" => Ok(MarketMode::Buy),
            other => Err(format!("invalid market mode: '{}'", other)),
        }
    }
}

/// One priced order inside a snapshot. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOrder {
    pub price: f64,
    pub vol_remaining: i64,
    pub type_id: i32,
    /// Unique within the order's side of the book.
    pub order_id: String,
    pub is_buy_order: bool,
    /// Distance from the reference system, in jumps.
    pub jumps: i32,
}

/// The authoritative pricing record for the currently tracked item.
///
/// `filename == None` means "nothing tracked"; every price and description
/// field is `None` in that case and both order books are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    /// Log file this snapshot was parsed from.
    pub filename: Option<String>,
    pub type_id: Option<i32>,
    pub item_name: Option<String>,
    /// Export timestamp extracted from the filename.
    pub timestamp: Option<String>,
    pub cheapest_sell: Option<f64>,
    pub highest_buy: Option<f64>,
    pub adjusted_sell: Option<f64>,
    pub adjusted_buy: Option<f64>,
    pub sell_order_count: usize,
    pub buy_order_count: usize,
    pub sell_orders: Vec<MarketOrder>,
    pub buy_orders: Vec<MarketOrder>,
}

impl MarketSnapshot {
    /// The untracked snapshot: no file, no item, no prices.
    pub fn empty() -> Self {
        Self {
            filename: None,
            type_id: None,
            item_name: None,
            timestamp: None,
            cheapest_sell: None,
            highest_buy: None,
            adjusted_sell: None,
            adjusted_buy: None,
            sell_order_count: 0,
            buy_order_count: 0,
            sell_orders: vec![],
            buy_orders: vec![],
        }
    }

    /// Whether this snapshot tracks a log file at all.
    pub fn is_tracked(&self) -> bool {
        self.filename.is_some()
    }

    /// The price selected by `mode`: adjusted sell for Sell, adjusted buy
    /// for Buy. Pure projection, may be `None`.
    pub fn active_price(&self, mode: MarketMode) -> Option<f64> {
        match mode {
            MarketMode::Sell => self.adjusted_sell,
            MarketMode::Buy => self.adjusted_buy,
        }
    }
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptive metadata for a tracked item, fetched from ESI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInfo {
    pub type_id: i32,
    pub name: String,
    /// Description with EVE's HTML-like markup stripped.
    pub description: String,
    pub icon_url: String,
}

/// One daily aggregate of an item's market history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: NaiveDate,
    pub average: f64,
    pub highest: f64,
    pub lowest: f64,
    pub order_count: i64,
    pub volume: i64,
}
