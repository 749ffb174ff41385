//! # Pricefeed - Market Log Synchronization
//!
//! Keeps one consistent view of a continuously changing market: snapshots
//! parsed from game log exports, item metadata and history from ESI, and
//! an authoritative sell/buy mode — synchronized across explicit pulls and
//! file-watcher pushes.
//!
//! ## Features
//!
//! - **MarketStore**: single owner of client-local state; pull, push, and
//!   mode triggers all funnel through one consistency discipline
//! - **Last-known-good price**: the derived active price is retained across
//!   updates and never overwritten by absence
//! - **Debounced file watching**: new exports are parsed once per settled
//!   burst and broadcast to every subscriber
//! - **TTL-cached ESI lookups**: item metadata and 30-day history
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pricefeed::{EventBus, LocalBackend, MarketStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = EventBus::new();
//!     let backend = LocalBackend::new("path/to/Marketlogs".into(), bus.clone());
//!     backend.prime()?;
//!
//!     let store = MarketStore::new(Arc::new(backend), bus);
//!     let subscriptions = store.initialize().await?;
//!
//!     println!("active price: {:?}", store.active_price());
//!     subscriptions.abort();
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod channel;
pub mod error;
pub mod esi;
pub mod logs;
pub mod model;
pub mod store;
pub mod watcher;

// Re-export main types for library consumers
pub use backend::LocalBackend;
pub use channel::{EventBus, RequestChannel};
pub use error::ChannelError;
pub use model::{MarketMode, MarketOrder, MarketSnapshot, PricePoint, TypeInfo};
pub use store::{MarketStore, PullKind, StoreState, Subscriptions};
pub use watcher::LogWatcher;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
