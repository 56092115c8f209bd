//! Essence Pricer
//!
//! Keeps a refreshed essence price table and uses it to annotate monolith
//! labels on screen, optionally corrupting cheap monoliths automatically.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Tick (host thread)                   │
//! │  EntityDetector → price_groups → overlay → automation│
//! └───────────────┬─────────────────────────▲───────────┘
//!                 │ RefreshHandle::request  │ ArcSwap<PriceIndex>
//!                 ▼                         │
//! ┌─────────────────────────────────────────┴───────────┐
//! │               RefreshWorker (tokio task)             │
//! │  PriceSnapshotCache (TTL) → NameMatchCache::rebuild  │
//! └────────────────────────┬────────────────────────────┘
//!                          │
//!          ┌───────────────┴───────────────┐
//!          │                               │
//!          ▼                               ▼
//! ┌─────────────────┐           ┌─────────────────┐
//! │ ScoutPriceFeed  │           │ LocalPriceFeed  │
//! │ (PagedFetcher)  │           │ (snapshot file) │
//! └─────────────────┘           └─────────────────┘
//! ```

pub mod automation;
pub mod config;
pub mod detector;
pub mod error;
pub mod fetcher;
pub mod in_flight;
pub mod models;
pub mod name_cache;
pub mod overlay;
pub mod plugin;
pub mod price_feed;
pub mod pricing;
pub mod refresh;
pub mod snapshot_cache;
pub mod ui;

// Re-export commonly used types
pub use automation::{AutomationLoop, AutomationOutcome, AutomationState, GuardRejection};
pub use config::Settings;
pub use detector::{DetectedEntity, EntityDetector, EntityGroup, LabelRef};
pub use error::{PricerError, PricerResult};
pub use fetcher::{FetchOutcome, HttpTransport, PageTransport, PagedFetcher};
pub use models::{PriceSnapshot, PricedItem, SnapshotSource};
pub use name_cache::{NameMatchCache, PriceIndex};
pub use plugin::{EssencePricer, Scene, TickReport};
pub use price_feed::{LocalPriceFeed, MockPriceFeed, PriceFeed, ScoutPriceFeed};
pub use pricing::PricedGroup;
pub use refresh::{RefreshHandle, RefreshReport, RefreshWorker};
pub use snapshot_cache::{PriceSnapshotCache, SnapshotRequest};
pub use ui::{Canvas, GroundLabel, Point, Pointer, Rect, UiNode};

/// Version of the pricer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the package
pub const NAME: &str = env!("CARGO_PKG_NAME");
