//! Market log discovery and parsing.
//!
//! The game client exports one CSV file per market view into a well-known
//! directory. The newest `.txt` export wins. Each file is parsed into a
//! [`MarketSnapshot`]: orders split by side, best prices picked, and the
//! one-step undercut/overbid adjustment applied.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::model::{MarketMode, MarketOrder, MarketSnapshot};

/// Orders kept per side in a published snapshot.
const BOOK_DEPTH: usize = 10;

/// Export filenames look like `Region-Item Name-2025.11.29 125208.txt`.
static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+)-(.+)-(\d{4}\.\d{2}\.\d{2}\s+\d+)$").expect("filename pattern is valid")
});

/// Default export directory: `Documents/EVE/logs/Marketlogs`.
pub fn default_logs_dir() -> Option<PathBuf> {
    dirs::document_dir().map(|d| d.join("EVE").join("logs").join("Marketlogs"))
}

/// Newest `.txt` export in `dir` by modification time, if any.
pub fn find_latest_log(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "market log directory does not exist");
        return Ok(None);
    }

    let latest = fs::read_dir(dir)
        .with_context(|| format!("Failed to read log directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map_or(false, |ext| ext == "txt")
        })
        .max_by_key(|entry| entry.metadata().ok().and_then(|m| m.modified().ok()))
        .map(|entry| entry.path());

    match &latest {
        Some(path) => debug!(path = %path.display(), "latest market log"),
        None => debug!(dir = %dir.display(), "no market logs found"),
    }

    Ok(latest)
}

/// Parse the newest export in `dir`, or the untracked snapshot when the
/// directory holds none.
pub fn parse_latest(dir: &Path) -> Result<MarketSnapshot> {
    match find_latest_log(dir)? {
        Some(path) => parse_log_file(&path),
        None => Ok(MarketSnapshot::empty()),
    }
}

/// Parse one export file into a snapshot.
pub fn parse_log_file(path: &Path) -> Result<MarketSnapshot> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read market log: {}", path.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    // Export rows carry a trailing comma, which shows up as one empty
    // header column at the end. Drop it so positions line up.
    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|s| s.trim_end_matches(',').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut all_orders: Vec<MarketOrder> = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(err) => {
                warn!(row, %err, "skipping unparsable row");
                continue;
            }
        };

        if record.is_empty() || (record.len() == 1 && record.get(0) == Some("0")) {
            continue;
        }

        if let Some(order) = parse_order(&headers, &record) {
            all_orders.push(order);
        }
    }

    debug!(orders = all_orders.len(), "parsed market log");

    let mut sell_orders: Vec<MarketOrder> = all_orders
        .iter()
        .filter(|o| !o.is_buy_order)
        .cloned()
        .collect();
    sell_orders.sort_by(|a, b| a.price.total_cmp(&b.price));

    let mut buy_orders: Vec<MarketOrder> = all_orders
        .iter()
        .filter(|o| o.is_buy_order)
        .cloned()
        .collect();
    buy_orders.sort_by(|a, b| b.price.total_cmp(&a.price));

    let cheapest_sell = sell_orders.first().map(|o| o.price);
    let highest_buy = buy_orders.first().map(|o| o.price);

    let type_id = all_orders.first().map(|o| o.type_id);
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from);
    let (item_name, timestamp) = parse_filename(filename.as_deref());

    Ok(MarketSnapshot {
        filename,
        type_id,
        item_name,
        timestamp,
        cheapest_sell,
        highest_buy,
        adjusted_sell: cheapest_sell.map(|p| adjust_price(p, MarketMode::Sell)),
        adjusted_buy: highest_buy.map(|p| adjust_price(p, MarketMode::Buy)),
        sell_order_count: sell_orders.len(),
        buy_order_count: buy_orders.len(),
        sell_orders: sell_orders.into_iter().take(BOOK_DEPTH).collect(),
        buy_orders: buy_orders.into_iter().take(BOOK_DEPTH).collect(),
    })
}

fn parse_order(headers: &[String], record: &csv::StringRecord) -> Option<MarketOrder> {
    let get = |key: &str| -> Option<&str> {
        headers.iter().position(|h| h == key).and_then(|i| record.get(i))
    };

    let price: f64 = get("price")?.parse().ok()?;
    // volRemaining comes as a float string like "3.0".
    let vol_remaining = get("volRemaining")?.parse::<f64>().ok()? as i64;
    let type_id: i32 = get("typeID")?.parse().ok()?;
    let order_id = get("orderID")?.to_string();
    let is_buy_order = get("bid")?.to_lowercase() == "true";
    let jumps = get("jumps").and_then(|s| s.parse().ok()).unwrap_or(0);

    Some(MarketOrder {
        price,
        vol_remaining,
        type_id,
        order_id,
        is_buy_order,
        jumps,
    })
}

/// Extract `(item_name, timestamp)` from an export filename of the form
/// `Region-Item Name-YYYY.MM.DD HHMMSS.txt`. Falls back to the bare stem
/// when the pattern does not match.
fn parse_filename(filename: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(filename) = filename else {
        return (None, None);
    };

    let stem = filename.trim_end_matches(".txt");
    if let Some(caps) = FILENAME_RE.captures(stem) {
        let item_name = caps.get(2).map(|m| m.as_str().to_string());
        let timestamp = caps.get(3).map(|m| m.as_str().to_string());
        (item_name, timestamp)
    } else {
        (Some(stem.to_string()), None)
    }
}

/// One-step price adjustment: undercut the cheapest sell, overbid the
/// highest buy. The step is one unit of the price's fourth significant
/// digit, never less than 1 ISK.
pub fn adjust_price(price: f64, mode: MarketMode) -> f64 {
    if price <= 0.0 {
        return price;
    }

    let step = price_step(price);
    match mode {
        MarketMode::Sell => price - step,
        MarketMode::Buy => price + step,
    }
}

fn price_step(price: f64) -> f64 {
    if price <= 0.0 {
        return 1.0;
    }

    let num_digits = (price.floor() as i64).to_string().len();
    let exponent = (num_digits as i32) - 4;

    f64::max(1.0, 10_f64.powi(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const HEADERS: &str = "price,volRemaining,typeID,range,orderID,volEntered,minVolume,bid,issueDate,duration,stationID,regionID,solarSystemID,jumps,";

    fn sample_log() -> String {
        let mut content = String::from(HEADERS);
        content.push('\n');
        // Two sells, one buy; sells deliberately out of order.
        content.push_str(
            "540000.00,5.0,28668,32767,6325235000,10,1,False,2025-11-29 12:30:00.000000,90,60003760,10000002,30000142,0,\n",
        );
        content.push_str(
            "532000.50,3.0,28668,32767,6325235001,10,1,False,2025-11-29 12:30:00.000000,90,60003760,10000002,30000142,0,\n",
        );
        content.push_str(
            "500000.00,7.0,28668,-1,6325235002,10,1,True,2025-11-29 12:30:00.000000,90,60003760,10000002,30000142,3,\n",
        );
        content
    }

    #[test]
    fn parses_sides_prices_and_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir
            .path()
            .join("The Forge-Strong Mindflood Booster-2025.11.29 125208.txt");
        fs::write(&path, sample_log()).unwrap();

        let snapshot = parse_log_file(&path).unwrap();

        assert_eq!(snapshot.type_id, Some(28668));
        assert_eq!(
            snapshot.item_name.as_deref(),
            Some("Strong Mindflood Booster")
        );
        assert_eq!(snapshot.timestamp.as_deref(), Some("2025.11.29 125208"));

        assert_eq!(snapshot.sell_order_count, 2);
        assert_eq!(snapshot.buy_order_count, 1);
        assert_eq!(snapshot.sell_orders.len(), snapshot.sell_order_count);
        assert_eq!(snapshot.buy_orders.len(), snapshot.buy_order_count);

        // Sells ascending, buys descending.
        assert_eq!(snapshot.cheapest_sell, Some(532000.50));
        assert_eq!(snapshot.sell_orders[0].order_id, "6325235001");
        assert_eq!(snapshot.highest_buy, Some(500000.00));

        // Six-digit prices adjust in steps of 100.
        assert_eq!(snapshot.adjusted_sell, Some(531900.50));
        assert_eq!(snapshot.adjusted_buy, Some(500100.00));

        assert_eq!(snapshot.buy_orders[0].jumps, 3);
        assert_eq!(snapshot.sell_orders[0].vol_remaining, 3);
    }

    #[test]
    fn truncates_books_to_depth_but_counts_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Heimatar-Tritanium-2025.01.01 090000.txt");

        let mut content = String::from(HEADERS);
        content.push('\n');
        for i in 0..15 {
            content.push_str(&format!(
                "{}.0,1.0,34,32767,9{:04},1,1,False,2025-01-01 09:00:00.000000,90,60003760,10000002,30000142,0,\n",
                100 + i,
                i
            ));
        }
        fs::write(&path, content).unwrap();

        let snapshot = parse_log_file(&path).unwrap();
        assert_eq!(snapshot.sell_order_count, 15);
        assert_eq!(snapshot.sell_orders.len(), 10);
        assert_eq!(snapshot.cheapest_sell, Some(100.0));
    }

    #[test]
    fn empty_directory_yields_untracked_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot = parse_latest(dir.path()).unwrap();
        assert!(!snapshot.is_tracked());
        assert_eq!(snapshot, MarketSnapshot::empty());
    }

    #[test]
    fn picks_newest_txt_export() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old-Item A-2025.01.01 010101.txt"), sample_log()).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        fs::write(dir.path().join("new-Item B-2025.01.02 010101.txt"), sample_log()).unwrap();
        fs::write(dir.path().join("ignored.log"), "not a market log").unwrap();

        let latest = find_latest_log(dir.path()).unwrap().unwrap();
        assert!(latest
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("new-"));
    }

    #[test]
    fn filename_fallback_keeps_bare_stem() {
        let (name, ts) = parse_filename(Some("notes.txt"));
        assert_eq!(name.as_deref(), Some("notes"));
        assert!(ts.is_none());

        assert_eq!(parse_filename(None), (None, None));
    }

    #[test]
    fn price_steps_follow_digit_count() {
        assert_eq!(price_step(5.0), 1.0);
        assert_eq!(price_step(9999.0), 1.0);
        assert_eq!(price_step(12345.0), 10.0);
        assert_eq!(price_step(532000.0), 100.0);

        assert_eq!(adjust_price(532000.0, MarketMode::Sell), 531900.0);
        assert_eq!(adjust_price(532000.0, MarketMode::Buy), 532100.0);
        assert_eq!(adjust_price(0.0, MarketMode::Sell), 0.0);
        assert_eq!(adjust_price(-5.0, MarketMode::Buy), -5.0);
    }
}
