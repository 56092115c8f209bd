//! plugin.rs - Per-tick orchestration
//!
//! `EssencePricer::tick` runs on the host's render thread: schedule a refresh
//! if due, detect essences, price them against one pinned index, draw the
//! overlay and hand the groups to the auto-corrupt loop.

use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::Instant;

use crate::automation::{AutomationLoop, AutomationOutcome};
use crate::config::Settings;
use crate::detector::EntityDetector;
use crate::fetcher::HttpTransport;
use crate::models::SnapshotSource;
use crate::name_cache::NameMatchCache;
use crate::overlay;
use crate::price_feed::{LocalPriceFeed, PriceFeed, ScoutPriceFeed};
use crate::pricing::{price_groups, PricedGroup};
use crate::refresh::{refresh_channel, request_for, RefreshHandle, RefreshWorker};
use crate::snapshot_cache::PriceSnapshotCache;
use crate::ui::{Canvas, GroundLabel, Point, Pointer};

/// Everything the host hands over for one tick
pub struct Scene<'a, L: GroundLabel> {
    pub labels: &'a [L],
    /// Window position used to turn window coordinates into screen coordinates
    pub window_origin: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub entities: usize,
    pub groups: Vec<PricedGroup>,
    pub refresh_requested: bool,
    pub automation: AutomationOutcome,
}

pub struct EssencePricer {
    settings: Settings,
    names: Arc<NameMatchCache>,
    refresh: RefreshHandle,
    detector: EntityDetector,
    automation: AutomationLoop,
    last_seen_report: u64,
}

impl EssencePricer {
    /// Wire up the pricer with explicit feeds; spawn the returned worker
    pub fn new(
        settings: Settings,
        remote: Arc<dyn PriceFeed>,
        local: Arc<dyn PriceFeed>,
    ) -> (Self, RefreshWorker) {
        let names = Arc::new(NameMatchCache::new());
        let (refresh, worker) = refresh_channel(PriceSnapshotCache::new(remote, local), names.clone());
        let automation = AutomationLoop::new(&settings);

        let pricer = EssencePricer {
            settings,
            names,
            refresh,
            detector: EntityDetector::new(),
            automation,
            last_seen_report: 0,
        };
        (pricer, worker)
    }

    /// Production wiring: HTTP price API plus the local snapshot directory
    pub fn with_default_feeds(settings: Settings) -> anyhow::Result<(Self, RefreshWorker)> {
        let transport = HttpTransport::new(&settings.api_base_url)?;
        let remote: Arc<dyn PriceFeed> = Arc::new(ScoutPriceFeed::new(Arc::new(transport)));
        let local: Arc<dyn PriceFeed> = Arc::new(LocalPriceFeed::new(settings.install_root.clone()));
        Ok(EssencePricer::new(settings, remote, local))
    }

    /// Start-up: always fetch once, regardless of the last refresh time
    pub fn initialise(&mut self) -> bool {
        if let Err(e) = self.settings.validate() {
            warn!("{}", e);
            return false;
        }
        info!("Essence pricer initialised for league {}", self.settings.league_name);
        self.refresh_now()
    }

    /// Manual "update prices now"
    pub fn refresh_now(&self) -> bool {
        let queued = self.refresh.request(request_for(&self.settings));
        if !queued {
            debug!("Refresh already in progress");
        }
        queued
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply edited settings; a source or league change is picked up by the
    /// next refresh
    pub fn update_settings(&mut self, settings: Settings) {
        self.automation.configure(&settings);
        self.settings = settings;
    }

    pub fn names(&self) -> &Arc<NameMatchCache> {
        &self.names
    }

    pub fn refresh_handle(&self) -> &RefreshHandle {
        &self.refresh
    }

    /// Copy a newly published remote refresh time into the settings.
    /// Returns `true` when the settings changed and should be saved.
    pub fn sync_refresh_status(&mut self) -> bool {
        let Some(report) = self.refresh.last_report() else {
            return false;
        };
        if report.sequence == self.last_seen_report {
            return false;
        }
        self.last_seen_report = report.sequence;
        if report.source == SnapshotSource::Remote && report.entries > 0 {
            self.settings.record_api_update(report.completed_at);
            return true;
        }
        false
    }

    /// Settings-panel status lines and price rows
    pub fn price_list(&self) -> (String, String, Vec<overlay::PriceRow>) {
        let index = self.names.load();
        let updated = overlay::last_update_text(self.refresh.last_report().map(|r| r.completed_at));
        let source = overlay::data_source_text(self.settings.source());
        (updated, source, overlay::price_rows(&index))
    }

    pub async fn tick<L: GroundLabel>(
        &mut self,
        scene: &Scene<'_, L>,
        canvas: &mut dyn Canvas,
        pointer: &mut dyn Pointer,
    ) -> TickReport {
        let mut report = TickReport {
            entities: 0,
            groups: Vec::new(),
            refresh_requested: false,
            automation: AutomationOutcome::Disabled,
        };
        if !self.settings.enable {
            return report;
        }

        self.sync_refresh_status();
        // An unusable league is reported once by `initialise`; never queue it
        let configured = self.settings.validate().is_ok();
        if configured && self.refresh.is_due(self.settings.update_interval(), Instant::now()) {
            report.refresh_requested = self.refresh_now();
        }

        report.entities = self.detector.detect(scene.labels).len();
        if report.entities == 0 {
            return report;
        }

        let index = self.names.load();
        let groups = price_groups(self.detector.groups(), &index);

        for group in groups.iter().filter(|g| g.total > Decimal::ZERO) {
            if let Some(label) = scene.labels.get(group.group.label.0).and_then(|l| l.label()) {
                overlay::draw_group(canvas, label, group);
            }
        }

        report.automation = self
            .automation
            .tick(self.settings.auto_corrupt, &groups, scene.labels, scene.window_origin, pointer)
            .await;
        report.groups = groups;
        report
    }
}
