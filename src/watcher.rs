//! Debounced filesystem watcher over the market log directory.
//!
//! The game client rewrites exports in bursts, so raw notify events are
//! debounced and each settled change triggers one re-parse + publish via
//! [`LocalBackend::reload_from_disk`]. Dropping the watcher stops it.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::backend::LocalBackend;

/// Burst window for raw notify events.
const DEBOUNCE: Duration = Duration::from_millis(500);
/// Grace period so the export is fully written before parsing.
const SETTLE: Duration = Duration::from_millis(100);

/// Watches one log directory and drives backend reloads.
pub struct LogWatcher {
    // Held for its lifetime; dropping it unregisters the watch.
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    rx: mpsc::UnboundedReceiver<()>,
}

impl LogWatcher {
    /// Start watching `dir` (non-recursive; exports land flat).
    pub fn new(dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            if let Ok(events) = result {
                if events.iter().any(is_export_change) {
                    let _ = tx.send(());
                }
            }
        })
        .context("Failed to create file watcher")?;

        debouncer
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch: {}", dir.display()))?;

        info!(dir = %dir.display(), "watching for market logs");

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }

    /// Reload and publish on every settled change. Returns when the watch
    /// callback is gone, i.e. the debouncer failed or was shut down.
    pub async fn run(mut self, backend: LocalBackend) {
        while self.rx.recv().await.is_some() {
            sleep(SETTLE).await;

            if let Err(err) = backend.reload_from_disk() {
                warn!(%err, "reload after log change failed");
            }
        }
    }
}

fn is_export_change(debounced: &DebouncedEvent) -> bool {
    let event = &debounced.event;
    if !(event.kind.is_create() || event.kind.is_modify()) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.extension().map_or(false, |ext| ext == "txt"))
}
