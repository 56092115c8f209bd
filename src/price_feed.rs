//! price_feed.rs - Price feed implementations
//!
//! A PriceFeed turns one data source into a PriceSnapshot: the paged price API
//! (ScoutPriceFeed) or the snapshot file another plugin keeps on disk
//! (LocalPriceFeed). MockPriceFeed serves tests and offline runs.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{PricerError, PricerResult};
use crate::fetcher::{PageTransport, PagedFetcher};
use crate::models::{LocalSnapshotEntry, PriceSnapshot, PricedItem, SnapshotSource};

/// Category requested from the price API
pub const REMOTE_CATEGORY: &str = "essences";

/// File stem of the local snapshot
pub const LOCAL_CATEGORY: &str = "Essences";

/// Trait defining the interface for price feeds
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Which source this feed reads
    fn source(&self) -> SnapshotSource;

    /// Produce a snapshot for `league`. An `Ok` snapshot may be partial.
    async fn fetch_snapshot(&self, league: &str) -> PricerResult<PriceSnapshot>;
}

// ============================================================================
// ScoutPriceFeed - paged price API
// ============================================================================

pub struct ScoutPriceFeed {
    fetcher: PagedFetcher,
    category: String,
}

impl ScoutPriceFeed {
    pub fn new(transport: Arc<dyn PageTransport>) -> Self {
        ScoutPriceFeed::from_fetcher(PagedFetcher::new(transport))
    }

    pub fn from_fetcher(fetcher: PagedFetcher) -> Self {
        ScoutPriceFeed {
            fetcher,
            category: REMOTE_CATEGORY.to_string(),
        }
    }
}

#[async_trait]
impl PriceFeed for ScoutPriceFeed {
    fn source(&self) -> SnapshotSource {
        SnapshotSource::Remote
    }

    async fn fetch_snapshot(&self, league: &str) -> PricerResult<PriceSnapshot> {
        info!("Fetching {} data from API for league {}", self.category, league);
        let outcome = self.fetcher.fetch(league, &self.category).await;

        match outcome.halted {
            // Nothing collected before the failure
            Some(e) if outcome.items.is_empty() => Err(e),
            Some(e) => {
                if e.is_transient() {
                    info!("Keeping {} items fetched before failure: {}", outcome.items.len(), e);
                } else {
                    warn!("Keeping {} items fetched before a bad page: {}", outcome.items.len(), e);
                }
                Ok(PriceSnapshot::new(outcome.items, outcome.pages_fetched, SnapshotSource::Remote))
            }
            None => Ok(PriceSnapshot::new(outcome.items, outcome.pages_fetched, SnapshotSource::Remote)),
        }
    }
}

// ============================================================================
// LocalPriceFeed - snapshot file on disk
// ============================================================================

pub struct LocalPriceFeed {
    install_root: PathBuf,
    category: String,
}

impl LocalPriceFeed {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        LocalPriceFeed {
            install_root: install_root.into(),
            category: LOCAL_CATEGORY.to_string(),
        }
    }

    /// `{root}/Temp/NinjaPricer/poescoutdata/{league}/{category}.json`
    pub fn snapshot_path(&self, league: &str) -> PathBuf {
        snapshot_path(&self.install_root, league, &self.category)
    }
}

pub fn snapshot_path(install_root: &Path, league: &str, category: &str) -> PathBuf {
    install_root
        .join("Temp")
        .join("NinjaPricer")
        .join("poescoutdata")
        .join(league)
        .join(format!("{}.json", category))
}

#[async_trait]
impl PriceFeed for LocalPriceFeed {
    fn source(&self) -> SnapshotSource {
        SnapshotSource::Local
    }

    async fn fetch_snapshot(&self, league: &str) -> PricerResult<PriceSnapshot> {
        let path = self.snapshot_path(league);
        debug!("Reading local snapshot {}", path.display());

        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| PricerError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let entries: Vec<LocalSnapshotEntry> = serde_json::from_str(&raw).map_err(|e| {
            error!("Failed to deserialize local snapshot {}: {}", path.display(), e);
            PricerError::malformed(path.display().to_string(), e)
        })?;

        let items: Vec<PricedItem> = entries.into_iter().map(PricedItem::from).collect();
        info!("Loaded {} entries from {}", items.len(), path.display());
        Ok(PriceSnapshot::new(items, 1, SnapshotSource::Local))
    }
}

// ============================================================================
// MockPriceFeed - For testing purposes
// ============================================================================

/// Feed that replays queued results and counts calls
pub struct MockPriceFeed {
    source: SnapshotSource,
    items: Vec<PricedItem>,
    failures: Mutex<usize>,
    calls: AtomicUsize,
}

impl MockPriceFeed {
    pub fn new(source: SnapshotSource, items: Vec<PricedItem>) -> Self {
        MockPriceFeed {
            source,
            items,
            failures: Mutex::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` calls fail
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut failures) = self.failures.lock() {
            *failures = count;
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for MockPriceFeed {
    fn source(&self) -> SnapshotSource {
        self.source
    }

    async fn fetch_snapshot(&self, _league: &str) -> PricerResult<PriceSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let fail = match self.failures.lock() {
            Ok(mut failures) if *failures > 0 => {
                *failures -= 1;
                true
            }
            _ => false,
        };
        if fail {
            return Err(PricerError::TransientFetch {
                page: 1,
                message: "mock failure".to_string(),
            });
        }

        Ok(PriceSnapshot::new(self.items.clone(), 1, self.source))
    }
}
