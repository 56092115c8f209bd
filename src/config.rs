//! config.rs - Persisted plugin settings
//!
//! Plain scalar fields stored as TOML. A missing file yields the defaults.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, time::Duration};

use crate::error::PricerError;
use crate::models::SnapshotSource;

pub const DEFAULT_LEAGUE: &str = "Rise of the Abyssal";
pub const DEFAULT_API_BASE_URL: &str = "https://poe2scout.com/api";
pub const MIN_UPDATE_INTERVAL_MINUTES: u64 = 5;
pub const MAX_UPDATE_INTERVAL_MINUTES: u64 = 180;

/// Texture of the clickable corruption marker inside a monolith label
pub const DEFAULT_MARKER_TEXTURE: &str = "Art/2DArt/UIImages/InGame/Essence/CorruptButton";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub enable: bool,
    pub league_name: String,
    pub api_update_interval_minutes: u64,
    pub use_local_snapshot: bool,
    /// RFC 3339 time of the last successful remote refresh
    pub last_api_update_time: String,
    pub auto_corrupt: bool,
    pub max_price_to_auto_corrupt: Decimal,
    pub max_distance_to_auto_corrupt: f32,
    pub restore_pointer_position: bool,
    /// Directory holding `Temp/NinjaPricer/...`
    pub install_root: PathBuf,
    pub api_base_url: String,
    pub marker_texture: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enable: true,
            league_name: DEFAULT_LEAGUE.to_string(),
            api_update_interval_minutes: 30,
            use_local_snapshot: false,
            last_api_update_time: String::new(),
            auto_corrupt: false,
            max_price_to_auto_corrupt: Decimal::from(5),
            max_distance_to_auto_corrupt: 50.0,
            restore_pointer_position: true,
            install_root: PathBuf::from("Plugins"),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            marker_texture: DEFAULT_MARKER_TEXTURE.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when absent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read settings from {}", path.display()))?;
        let settings: Self = toml::from_str(&raw).context("parse settings TOML")?;
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let raw = toml::to_string_pretty(self).context("serialize settings")?;
        fs::write(path, raw).with_context(|| format!("write settings to {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PricerError> {
        if self.league_name.trim().is_empty() {
            return Err(PricerError::Configuration("league name is not configured".into()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(PricerError::Configuration("API base URL is not configured".into()));
        }
        Ok(())
    }

    pub fn source(&self) -> SnapshotSource {
        SnapshotSource::from_toggle(self.use_local_snapshot)
    }

    pub fn update_interval(&self) -> Duration {
        let minutes = self
            .api_update_interval_minutes
            .clamp(MIN_UPDATE_INTERVAL_MINUTES, MAX_UPDATE_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }

    pub fn last_api_update(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.last_api_update_time.trim())
            .ok()
            .map(|stamp| stamp.with_timezone(&Utc))
    }

    pub fn record_api_update(&mut self, at: DateTime<Utc>) {
        self.last_api_update_time = at.to_rfc3339();
    }

    /// Whether the persisted remote refresh time is older than the interval
    pub fn remote_refresh_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_api_update() {
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.update_interval(),
                // Stamp in the future
                Err(_) => false,
            },
            None => true,
        }
    }
}
