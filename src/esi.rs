//! ESI lookups: item metadata and daily market history.
//!
//! Responses are cached in-process for an hour per item. A 404 is a
//! legitimate "unknown item" answer, not a failure.

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::ChannelError;
use crate::model::{PricePoint, TypeInfo};

const BASE_URL: &str = "https://esi.evetech.net/latest";
const CACHE_TTL: Duration = Duration::from_secs(3600);
/// The Forge (Jita's region).
const DEFAULT_REGION_ID: i32 = 10000002;
/// History window returned to consumers, in days.
const HISTORY_DAYS: usize = 30;

/// EVE descriptions carry HTML-like markup such as `<a href=...>`.
static MARKUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("markup pattern is valid"));

struct CacheEntry<T> {
    data: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn fresh(data: T) -> Self {
        Self {
            data,
            expires_at: Instant::now() + CACHE_TTL,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

#[derive(Debug, Deserialize)]
struct EsiType {
    type_id: i32,
    name: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct EsiHistoryRow {
    date: NaiveDate,
    average: f64,
    highest: f64,
    lowest: f64,
    order_count: i64,
    volume: i64,
}

/// HTTP client for the public ESI API with per-item TTL caches.
pub struct EsiClient {
    http: reqwest::Client,
    region_id: i32,
    type_cache: DashMap<i32, CacheEntry<TypeInfo>>,
    history_cache: DashMap<i32, CacheEntry<Vec<PricePoint>>>,
}

impl EsiClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            region_id: DEFAULT_REGION_ID,
            type_cache: DashMap::new(),
            history_cache: DashMap::new(),
        }
    }

    /// Metadata for an item. `Ok(None)` when ESI does not know the item.
    pub async fn type_info(&self, type_id: i32) -> Result<Option<TypeInfo>, ChannelError> {
        if let Some(entry) = self.type_cache.get(&type_id) {
            if entry.is_live() {
                return Ok(Some(entry.data.clone()));
            }
        }

        let url = format!("{}/universe/types/{}/", BASE_URL, type_id);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ChannelError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let body: EsiType = response.json().await?;
        let info = TypeInfo {
            type_id: body.type_id,
            name: body.name,
            description: strip_markup(&body.description),
            icon_url: icon_url(type_id),
        };

        debug!(type_id, name = %info.name, "cached type info");
        self.type_cache.insert(type_id, CacheEntry::fresh(info.clone()));
        Ok(Some(info))
    }

    /// Daily aggregates for an item in the configured region, oldest first,
    /// trimmed to the last [`HISTORY_DAYS`] days.
    pub async fn price_history(&self, type_id: i32) -> Result<Vec<PricePoint>, ChannelError> {
        if let Some(entry) = self.history_cache.get(&type_id) {
            if entry.is_live() {
                return Ok(entry.data.clone());
            }
        }

        let url = format!(
            "{}/markets/{}/history/?type_id={}",
            BASE_URL, self.region_id, type_id
        );
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(15))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ChannelError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let rows: Vec<EsiHistoryRow> = response.json().await?;
        let history: Vec<PricePoint> = rows
            .into_iter()
            .map(|row| PricePoint {
                date: row.date,
                average: row.average,
                highest: row.highest,
                lowest: row.lowest,
                order_count: row.order_count,
                volume: row.volume,
            })
            .collect();

        let history: Vec<PricePoint> = history
            .into_iter()
            .rev()
            .take(HISTORY_DAYS)
            .rev()
            .collect();

        debug!(type_id, days = history.len(), "cached price history");
        self.history_cache
            .insert(type_id, CacheEntry::fresh(history.clone()));
        Ok(history)
    }
}

impl Default for EsiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn icon_url(type_id: i32) -> String {
    format!("https://images.evetech.net/types/{}/icon?size=64", type_id)
}

fn strip_markup(description: &str) -> String {
    MARKUP_RE.replace_all(description, "").to_string()
}
