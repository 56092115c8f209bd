//! models.rs - Core data structures for the price pipeline
//!
//! Wire types for the paged price API and the local snapshot file, plus the
//! PricedItem / PriceSnapshot pair every refresh cycle produces.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Where a snapshot comes from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SnapshotSource {
    Remote,
    Local,
}

impl SnapshotSource {
    pub fn from_toggle(use_local: bool) -> Self {
        if use_local {
            SnapshotSource::Local
        } else {
            SnapshotSource::Remote
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSource::Remote => write!(f, "PoE2Scout API"),
            SnapshotSource::Local => write!(f, "NinjaPricer (Local)"),
        }
    }
}

/// A named item with its most recent price
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricedItem {
    pub name: String,
    pub price: Decimal,
    pub sample_time: Option<DateTime<Utc>>,
}

impl PricedItem {
    pub fn new(name: &str, price: Decimal) -> Self {
        PricedItem {
            name: name.to_string(),
            price,
            sample_time: None,
        }
    }

    /// Non-empty name and strictly positive price
    pub fn is_priceable(&self) -> bool {
        !self.name.is_empty() && self.price > Decimal::ZERO
    }
}

impl fmt::Display for PricedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:.3}ex", self.name, self.price)
    }
}

/// The full item set produced by one refresh cycle
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    pub items: Vec<PricedItem>,
    pub fetched_at: DateTime<Utc>,
    pub source_pages: u32,
    pub source: SnapshotSource,
}

impl PriceSnapshot {
    pub fn new(items: Vec<PricedItem>, source_pages: u32, source: SnapshotSource) -> Self {
        PriceSnapshot {
            items,
            fetched_at: Utc::now(),
            source_pages,
            source,
        }
    }

    pub fn empty(source: SnapshotSource) -> Self {
        PriceSnapshot::new(Vec::new(), 0, source)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Items worth at least `min_value`, most valuable first
    pub fn valuable(&self, min_value: Decimal) -> Vec<&PricedItem> {
        let mut items: Vec<&PricedItem> = self
            .items
            .iter()
            .filter(|item| item.price >= min_value)
            .collect();
        items.sort_by(|a, b| b.price.cmp(&a.price));
        items
    }
}

/// Priority tier 1..=10 derived from an item's value in exalts
pub fn value_tier(price: Decimal) -> u8 {
    const THRESHOLDS: [(i64, u8); 9] = [
        (500, 10),
        (400, 9),
        (300, 8),
        (200, 7),
        (100, 6),
        (50, 5),
        (25, 4),
        (10, 3),
        (5, 2),
    ];

    THRESHOLDS
        .iter()
        .find(|(min, _)| price >= Decimal::from(*min))
        .map(|(_, tier)| *tier)
        .unwrap_or(1)
}

// ============================================================================
// Price API wire format
// ============================================================================

/// One page of the paged currency endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoutPage {
    #[serde(deserialize_with = "null_as_default")]
    pub current_page: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub pages: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub total: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<ScoutItem>,
}

impl ScoutPage {
    /// Returned page index has reached the reported page count
    pub fn is_last(&self) -> bool {
        self.current_page >= self.pages
    }
}

/// Only the fields the pricer reads; anything else on the item is ignored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoutItem {
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    pub current_price: Option<Decimal>,
}

impl From<ScoutItem> for PricedItem {
    fn from(item: ScoutItem) -> Self {
        PricedItem {
            name: item.text,
            price: item.current_price.unwrap_or(Decimal::ZERO),
            sample_time: None,
        }
    }
}

// ============================================================================
// Local snapshot file format
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalSnapshotEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price_logs: Vec<PriceLog>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PriceLog {
    #[serde(deserialize_with = "null_as_default")]
    pub price: Decimal,
    #[serde(deserialize_with = "null_as_default")]
    pub time: String,
}

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PriceLog {
    /// Parsed sample time; `None` ranks below every valid stamp
    pub fn parsed_time(&self) -> Option<DateTime<Utc>> {
        parse_sample_time(&self.time)
    }
}

impl LocalSnapshotEntry {
    /// The log entry with the latest parseable time.
    ///
    /// Unparseable stamps count as earliest-possible; among equal stamps the
    /// first entry in file order wins.
    pub fn latest_log(&self) -> Option<&PriceLog> {
        let mut best: Option<(&PriceLog, Option<DateTime<Utc>>)> = None;
        for log in &self.price_logs {
            let time = log.parsed_time();
            match best {
                Some((_, best_time)) if time <= best_time => {}
                _ => best = Some((log, time)),
            }
        }
        best.map(|(log, _)| log)
    }
}

impl From<LocalSnapshotEntry> for PricedItem {
    fn from(entry: LocalSnapshotEntry) -> Self {
        let (price, sample_time) = entry
            .latest_log()
            .map(|log| (log.price, log.parsed_time()))
            .unwrap_or((Decimal::ZERO, None));

        PricedItem {
            name: entry.text,
            price,
            sample_time,
        }
    }
}

fn parse_sample_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    // Zone-less stamps are taken as UTC
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
