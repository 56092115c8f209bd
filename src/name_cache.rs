//! name_cache.rs - Name → price lookup with substring fallback
//!
//! The cache holds an immutable `PriceIndex` behind an `ArcSwap`. A rebuild
//! assembles a whole new index and swaps it in with one store, so a reader
//! sees either the old or the new mapping, never a half-filled one.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{PriceSnapshot, SnapshotSource};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceEntry {
    pub name: String,
    /// Lower-cased name used for matching
    key: String,
    pub price: Decimal,
}

/// Immutable name → price mapping built from one snapshot
#[derive(Debug, Default)]
pub struct PriceIndex {
    entries: Vec<PriceEntry>,
    by_key: HashMap<String, usize>,
    built_at: Option<DateTime<Utc>>,
    source: Option<SnapshotSource>,
}

impl PriceIndex {
    pub fn from_snapshot(snapshot: &PriceSnapshot) -> Self {
        let mut index = PriceIndex {
            built_at: Some(Utc::now()),
            source: Some(snapshot.source),
            ..Default::default()
        };

        for item in snapshot.items.iter().filter(|item| item.is_priceable()) {
            let key = normalize(&item.name);
            // First value wins for duplicate names
            if index.by_key.contains_key(&key) {
                continue;
            }
            index.by_key.insert(key.clone(), index.entries.len());
            index.entries.push(PriceEntry {
                name: item.name.clone(),
                key,
                price: item.price,
            });
        }
        index
    }

    /// Exact case-insensitive match, then the first cached name that contains
    /// or is contained in `name`.
    ///
    /// Several names can satisfy the substring test; the winner is whichever
    /// comes first in the snapshot order of the last rebuild, so callers must
    /// not depend on which one is picked.
    pub fn lookup(&self, name: &str) -> Option<Decimal> {
        if name.is_empty() {
            return None;
        }
        let query = normalize(name);

        if let Some(&slot) = self.by_key.get(&query) {
            return Some(self.entries[slot].price);
        }

        self.entries
            .iter()
            .find(|entry| entry.key.contains(&query) || query.contains(&entry.key))
            .map(|entry| entry.price)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn source(&self) -> Option<SnapshotSource> {
        self.source
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[PriceEntry] {
        &self.entries
    }

    /// Entries sorted by price, highest first
    pub fn sorted_by_price(&self) -> Vec<&PriceEntry> {
        let mut entries: Vec<&PriceEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.price.cmp(&a.price));
        entries
    }

    /// Name → price pairs, for comparing two indexes
    pub fn to_map(&self) -> HashMap<String, Decimal> {
        self.entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.price))
            .collect()
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// Shared, atomically replaced price index
#[derive(Debug, Default)]
pub struct NameMatchCache {
    index: ArcSwap<PriceIndex>,
}

impl NameMatchCache {
    pub fn new() -> Self {
        NameMatchCache::default()
    }

    /// Pin the current index; use one pin for every lookup in a tick
    pub fn load(&self) -> Arc<PriceIndex> {
        self.index.load_full()
    }

    pub fn lookup(&self, name: &str) -> Option<Decimal> {
        self.index.load().lookup(name)
    }

    /// Replace the whole mapping with one built from `snapshot`
    pub fn rebuild(&self, snapshot: &PriceSnapshot) -> usize {
        let index = PriceIndex::from_snapshot(snapshot);
        let count = index.len();
        self.index.store(Arc::new(index));
        debug!("Price index rebuilt with {} entries", count);
        count
    }

    pub fn len(&self) -> usize {
        self.index.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricedItem;
    use rust_decimal_macros::dec;

    fn snapshot(items: &[(&str, Decimal)]) -> PriceSnapshot {
        PriceSnapshot::new(
            items.iter().map(|(name, price)| PricedItem::new(name, *price)).collect(),
            1,
            SnapshotSource::Remote,
        )
    }

    #[test]
    fn test_exact_lookup_ignores_case() {
        let cache = NameMatchCache::new();
        cache.rebuild(&snapshot(&[("Greater Essence of Haste", dec!(14))]));
        assert_eq!(cache.lookup("greater essence of HASTE"), Some(dec!(14)));
        assert_eq!(cache.lookup(""), None);
        assert_eq!(cache.lookup("Essence of Ice"), None);
    }

    #[test]
    fn test_substring_fallback_both_directions() {
        let cache = NameMatchCache::new();
        cache.rebuild(&snapshot(&[("Essence of Ice", dec!(2)), ("Perfect Essence of Haste", dec!(40))]));

        // Query contains cached name
        assert_eq!(cache.lookup("Corrupted Essence of Ice (x2)"), Some(dec!(2)));
        // Cached name contains query
        assert_eq!(cache.lookup("essence of haste"), Some(dec!(40)));
    }

    #[test]
    fn test_exact_match_beats_substring() {
        let cache = NameMatchCache::new();
        cache.rebuild(&snapshot(&[
            ("Greater Essence of Ice", dec!(9)),
            ("Essence of Ice", dec!(2)),
        ]));
        assert_eq!(cache.lookup("Essence of Ice"), Some(dec!(2)));
    }

    #[test]
    fn test_rebuild_filters_and_keeps_first_duplicate() {
        let cache = NameMatchCache::new();
        let count = cache.rebuild(&snapshot(&[
            ("Essence of Ice", dec!(2)),
            ("", dec!(5)),
            ("Essence of Haste", dec!(0)),
            ("Essence of Flames", dec!(-1)),
            ("ESSENCE OF ICE", dec!(7)),
        ]));

        assert_eq!(count, 1);
        assert_eq!(cache.lookup("Essence of Ice"), Some(dec!(2)));
        assert_eq!(cache.lookup("Essence of Haste"), None);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let snap = snapshot(&[("Essence of Ice", dec!(2)), ("Essence of Haste", dec!(3)), ("Essence of Ice", dec!(8))]);
        let cache = NameMatchCache::new();

        cache.rebuild(&snap);
        let first = cache.load().to_map();
        cache.rebuild(&snap);
        let second = cache.load().to_map();

        assert_eq!(first, second);
        assert_eq!(cache.load().entries().len(), 2);
    }

    #[test]
    fn test_rebuild_replaces_old_mapping() {
        let cache = NameMatchCache::new();
        cache.rebuild(&snapshot(&[("Essence of Ice", dec!(2))]));
        let pinned = cache.load();

        cache.rebuild(&snapshot(&[("Essence of Haste", dec!(3))]));

        // A pinned index keeps seeing the old state in full
        assert_eq!(pinned.lookup("Essence of Ice"), Some(dec!(2)));
        assert_eq!(cache.lookup("Essence of Ice"), None);
        assert_eq!(cache.lookup("Essence of Haste"), Some(dec!(3)));
    }

    #[test]
    fn test_sorted_by_price() {
        let cache = NameMatchCache::new();
        cache.rebuild(&snapshot(&[("A", dec!(1)), ("B", dec!(10)), ("C", dec!(5))]));
        let index = cache.load();
        let names: Vec<&str> = index.sorted_by_price().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_index() {
        let cache = Arc::new(NameMatchCache::new());
        let big: Vec<(String, Decimal)> = (0..200).map(|i| (format!("Essence {}", i), dec!(1))).collect();
        let items: Vec<(&str, Decimal)> = big.iter().map(|(n, p)| (n.as_str(), *p)).collect();
        let full = snapshot(&items);
        cache.rebuild(&full);

        let reader = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    let len = cache.load().len();
                    assert!(len == 200 || len == 1, "saw partial index of {}", len);
                }
            })
        };
        for round in 0..200 {
            if round % 2 == 0 {
                cache.rebuild(&snapshot(&[("Essence of Ice", dec!(2))]));
            } else {
                cache.rebuild(&full);
            }
        }
        reader.join().unwrap();
    }
}
