//! snapshot_cache.rs - TTL cache in front of the price feeds
//!
//! A snapshot is reused without I/O while it is younger than the TTL and was
//! produced for the same source and league. Failed or empty fetches hand back
//! the previous snapshot; a source or league switch starts from nothing.

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{PriceSnapshot, SnapshotSource};
use crate::price_feed::PriceFeed;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// What a caller asks the cache for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub source: SnapshotSource,
    pub league: String,
}

impl SnapshotRequest {
    pub fn new(source: SnapshotSource, league: &str) -> Self {
        SnapshotRequest {
            source,
            league: league.to_string(),
        }
    }
}

struct HeldSnapshot {
    request: SnapshotRequest,
    snapshot: Arc<PriceSnapshot>,
    /// Time of the last successful fetch; `None` when nothing succeeded yet
    fetched: Option<Instant>,
}

pub struct PriceSnapshotCache {
    feeds: Vec<Arc<dyn PriceFeed>>,
    ttl: Duration,
    held: Option<HeldSnapshot>,
}

impl PriceSnapshotCache {
    pub fn new(remote: Arc<dyn PriceFeed>, local: Arc<dyn PriceFeed>) -> Self {
        PriceSnapshotCache {
            feeds: vec![remote, local],
            ttl: DEFAULT_TTL,
            held: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The feed that reports itself as `source`
    fn feed(&self, source: SnapshotSource) -> Option<Arc<dyn PriceFeed>> {
        self.feeds.iter().find(|feed| feed.source() == source).cloned()
    }

    /// Current snapshot for `request`, fetching only when needed
    pub async fn get_snapshot(&mut self, request: &SnapshotRequest) -> Arc<PriceSnapshot> {
        let switched = self
            .held
            .as_ref()
            .map(|held| held.request != *request)
            .unwrap_or(false);
        if switched {
            info!("Data source changed to {} ({}), dropping held snapshot", request.source, request.league);
            self.held = None;
        }

        if let Some(held) = &self.held {
            let fresh = held
                .fetched
                .map(|at| at.elapsed() < self.ttl)
                .unwrap_or(false);
            if fresh && !held.snapshot.is_empty() {
                return held.snapshot.clone();
            }
        }

        let Some(feed) = self.feed(request.source) else {
            error!("No price feed configured for {}", request.source);
            return self.previous(request);
        };
        match feed.fetch_snapshot(&request.league).await {
            Ok(snapshot) if !snapshot.is_empty() => {
                info!("Successfully fetched {} items from {}", snapshot.len(), request.source);
                let snapshot = Arc::new(snapshot);
                self.held = Some(HeldSnapshot {
                    request: request.clone(),
                    snapshot: snapshot.clone(),
                    fetched: Some(Instant::now()),
                });
                snapshot
            }
            Ok(_) => {
                warn!("No items returned from {}, keeping previous snapshot", request.source);
                self.previous(request)
            }
            Err(e) => {
                warn!("Error fetching {} data: {}, keeping previous snapshot", request.source, e);
                self.previous(request)
            }
        }
    }

    fn previous(&mut self, request: &SnapshotRequest) -> Arc<PriceSnapshot> {
        let held = self.held.get_or_insert_with(|| HeldSnapshot {
            request: request.clone(),
            snapshot: Arc::new(PriceSnapshot::empty(request.source)),
            fetched: None,
        });
        held.snapshot.clone()
    }
}
