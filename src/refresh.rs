//! refresh.rs - Background refresh worker
//!
//! The tick asks for a refresh through a `RefreshHandle`; a single worker task
//! drains the request, pulls a snapshot through the TTL cache, rebuilds the
//! name index and publishes a `RefreshReport`. While one request is queued or
//! running, further requests are dropped.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::Settings;
use crate::error::PricerError;
use crate::in_flight::InFlight;
use crate::models::SnapshotSource;
use crate::name_cache::NameMatchCache;
use crate::snapshot_cache::{PriceSnapshotCache, SnapshotRequest};

/// Snapshot items at or above this many exalts are summarised after a refresh
pub const VALUABLE_THRESHOLD: Decimal = Decimal::TEN;

/// Outcome of one completed refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub source: SnapshotSource,
    pub entries: usize,
    pub completed_at: DateTime<Utc>,
    pub completed_instant: Instant,
    /// Bumped on every publish so readers can spot a new report
    pub sequence: u64,
}

#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<SnapshotRequest>,
    in_flight: InFlight,
    report: Arc<ArcSwapOption<RefreshReport>>,
}

impl RefreshHandle {
    /// Queue a refresh; returns `false` when one is already pending or running
    pub fn request(&self, request: SnapshotRequest) -> bool {
        if !self.in_flight.try_claim() {
            return false;
        }
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(e) => {
                warn!("Refresh request dropped: {}", e);
                self.in_flight.release();
                false
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_busy()
    }

    pub fn last_report(&self) -> Option<Arc<RefreshReport>> {
        self.report.load_full()
    }

    /// A refresh is due when none is running and `interval` has passed since
    /// the last completed one (or none has completed yet)
    pub fn is_due(&self, interval: Duration, now: Instant) -> bool {
        if self.is_busy() {
            return false;
        }
        let current = self.report.load();
        match &*current {
            Some(report) => now.saturating_duration_since(report.completed_instant) >= interval,
            None => true,
        }
    }
}

pub struct RefreshWorker {
    cache: PriceSnapshotCache,
    names: Arc<NameMatchCache>,
    rx: mpsc::Receiver<SnapshotRequest>,
    in_flight: InFlight,
    report: Arc<ArcSwapOption<RefreshReport>>,
    sequence: u64,
}

/// Build a connected handle and worker
pub fn refresh_channel(cache: PriceSnapshotCache, names: Arc<NameMatchCache>) -> (RefreshHandle, RefreshWorker) {
    // Capacity 1: at most one request waits while the worker is idle
    let (tx, rx) = mpsc::channel(1);
    let in_flight = InFlight::new();
    let report = Arc::new(ArcSwapOption::empty());

    let handle = RefreshHandle {
        tx,
        in_flight: in_flight.clone(),
        report: report.clone(),
    };
    let worker = RefreshWorker {
        cache,
        names,
        rx,
        in_flight,
        report,
        sequence: 0,
    };
    (handle, worker)
}

impl RefreshWorker {
    /// Drain requests until every handle is dropped
    pub async fn run(mut self) {
        info!("Refresh worker started");
        while let Some(request) = self.rx.recv().await {
            self.process(&request).await;
            self.in_flight.release();
        }
        info!("Refresh worker stopped");
    }

    async fn process(&mut self, request: &SnapshotRequest) {
        if request.league.trim().is_empty() {
            error!("{}", PricerError::Configuration("league name is not configured".into()));
            return;
        }

        let snapshot = self.cache.get_snapshot(request).await;
        let entries = self.names.rebuild(&snapshot);
        let valuable = snapshot.valuable(VALUABLE_THRESHOLD);
        if let Some(top) = valuable.first() {
            info!(
                "{} essences worth at least {}ex, most valuable: {} at {:.2}ex",
                valuable.len(),
                VALUABLE_THRESHOLD,
                top.name,
                top.price
            );
        }

        self.sequence += 1;
        let report = RefreshReport {
            source: request.source,
            entries,
            completed_at: Utc::now(),
            completed_instant: Instant::now(),
            sequence: self.sequence,
        };
        info!("Updated essence prices from {}: {} essences cached", report.source, report.entries);
        self.report.store(Some(Arc::new(report)));
    }
}

/// The request the current settings describe
pub fn request_for(settings: &Settings) -> SnapshotRequest {
    SnapshotRequest::new(settings.source(), &settings.league_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::{page_json, Scripted, ScriptedTransport};
    use crate::fetcher::PagedFetcher;
    use crate::models::PricedItem;
    use crate::price_feed::{MockPriceFeed, ScoutPriceFeed};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn mock_cache() -> (PriceSnapshotCache, Arc<MockPriceFeed>) {
        let remote = Arc::new(MockPriceFeed::new(
            SnapshotSource::Remote,
            vec![PricedItem::new("Essence of Ice", dec!(3))],
        ));
        let local = Arc::new(MockPriceFeed::new(SnapshotSource::Local, Vec::new()));
        (PriceSnapshotCache::new(remote.clone(), local), remote)
    }

    async fn wait_for_report(handle: &RefreshHandle, sequence: u64) -> Arc<RefreshReport> {
        for _ in 0..1000 {
            if let Some(report) = handle.last_report() {
                if report.sequence >= sequence && !handle.is_busy() {
                    return report;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("refresh did not complete");
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_excludes_non_positive_prices() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Scripted::Body(page_json(1, 2, &[("X", 10.0)])),
            Scripted::Body(page_json(2, 2, &[("Y", 0.0)])),
        ]));
        let remote = Arc::new(ScoutPriceFeed::from_fetcher(PagedFetcher::new(transport)));
        let local = Arc::new(MockPriceFeed::new(SnapshotSource::Local, Vec::new()));
        let names = Arc::new(NameMatchCache::new());
        let (handle, worker) = refresh_channel(PriceSnapshotCache::new(remote, local), names.clone());
        tokio::spawn(worker.run());

        assert!(handle.request(SnapshotRequest::new(SnapshotSource::Remote, "Standard")));
        let report = wait_for_report(&handle, 1).await;

        assert_eq!(report.entries, 1);
        let expected: HashMap<String, Decimal> = [("X".to_string(), dec!(10))].into_iter().collect();
        assert_eq!(names.load().to_map(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_while_busy_are_dropped() {
        let (cache, remote) = mock_cache();
        let names = Arc::new(NameMatchCache::new());
        let (handle, worker) = refresh_channel(cache, names.clone());

        let request = SnapshotRequest::new(SnapshotSource::Remote, "Standard");
        assert!(handle.request(request.clone()));
        assert!(!handle.request(request.clone()));
        assert!(!handle.is_due(Duration::ZERO, Instant::now()));

        tokio::spawn(worker.run());
        wait_for_report(&handle, 1).await;
        assert_eq!(remote.calls(), 1);
        assert_eq!(names.lookup("Essence of Ice"), Some(dec!(3)));

        // Free again once the first request finished
        assert!(handle.request(request));
        wait_for_report(&handle, 2).await;
        // Second request was served from the TTL cache
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_league_aborts_refresh() {
        let (cache, remote) = mock_cache();
        let names = Arc::new(NameMatchCache::new());
        let (handle, worker) = refresh_channel(cache, names);
        tokio::spawn(worker.run());

        assert!(handle.request(SnapshotRequest::new(SnapshotSource::Remote, " ")));
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!handle.is_busy());
        assert!(handle.last_report().is_none());
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_after_interval() {
        let (cache, _) = mock_cache();
        let (handle, worker) = refresh_channel(cache, Arc::new(NameMatchCache::new()));
        assert!(handle.is_due(Duration::from_secs(60), Instant::now()));

        tokio::spawn(worker.run());
        handle.request(SnapshotRequest::new(SnapshotSource::Remote, "Standard"));
        let report = wait_for_report(&handle, 1).await;

        let interval = Duration::from_secs(60);
        assert!(!handle.is_due(interval, report.completed_instant + Duration::from_secs(59)));
        assert!(handle.is_due(interval, report.completed_instant + interval));
    }

    #[test]
    fn test_request_follows_settings() {
        let settings = Settings { use_local_snapshot: true, league_name: "Standard".into(), ..Settings::default() };
        assert_eq!(request_for(&settings), SnapshotRequest::new(SnapshotSource::Local, "Standard"));
    }
}
