//! main.rs - Stand-alone price table for the essence pricer
//!
//! Runs the refresh worker without a game attached: loads settings, refreshes
//! on the configured interval, prints the price table and persists the last
//! remote refresh time.
//!
//! Usage: `essence-pricer [settings.toml]`

use anyhow::Context;
use chrono::Utc;
use essence_pricer::{EssencePricer, Settings, NAME, VERSION};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::Duration;

/// How often the loop checks whether a refresh is due
const POLL_INTERVAL_SECONDS: u64 = 5;

/// Rows shown in the price table
const MAX_ROWS: usize = 25;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    info!("Starting {} v{}", NAME, VERSION);

    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("essence-pricer.toml"));
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("load settings from {}", settings_path.display()))?;
    settings.validate()?;

    info!("League: {}", settings.league_name);
    info!("Data source: {}", settings.source());
    info!("Update interval: {:?}", settings.update_interval());
    if !settings.remote_refresh_due(Utc::now()) {
        info!("Last remote refresh at {}, still within interval", settings.last_api_update_time);
    }

    let (mut pricer, worker) = EssencePricer::with_default_feeds(settings)?;
    tokio::spawn(worker.run());

    if !pricer.initialise() {
        warn!("Initial refresh was not queued");
    }

    let mut interval = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECONDS));
    let mut last_printed = 0;

    loop {
        interval.tick().await;

        if pricer.sync_refresh_status() {
            if let Err(e) = pricer.settings().save(&settings_path) {
                error!("Failed to persist settings: {}", e);
            }
        }

        if let Some(report) = pricer.refresh_handle().last_report() {
            if report.sequence != last_printed {
                last_printed = report.sequence;
                display_price_table(&pricer);
            }
        }

        let due = pricer
            .refresh_handle()
            .is_due(pricer.settings().update_interval(), tokio::time::Instant::now());
        if due {
            debug!("Refresh due, requesting");
            pricer.refresh_now();
        }
    }
}

/// Print cached prices, most valuable first
fn display_price_table(pricer: &EssencePricer) {
    let (updated, source, rows) = pricer.price_list();

    if rows.is_empty() {
        warn!("No essence prices loaded");
        return;
    }

    println!();
    println!("{} | {} | Cached essences: {}", updated, source, rows.len());
    println!("┌────────────────────────────────────────┬────────────────┬──────┐");
    println!("│ Essence Name                           │ Price (exalts) │ Tier │");
    println!("├────────────────────────────────────────┼────────────────┼──────┤");
    for row in rows.iter().take(MAX_ROWS) {
        println!("│ {:38} │ {:>14} │ {:>4} │", row.name, row.price, row.tier);
    }
    if rows.len() > MAX_ROWS {
        println!("│ ... and {} more{:55}│", rows.len() - MAX_ROWS, "");
    }
    println!("└────────────────────────────────────────┴────────────────┴──────┘");
    println!();
}
