//! pricing.rs - Attach prices to detected entity groups

use rust_decimal::Decimal;

use crate::detector::EntityGroup;
use crate::name_cache::PriceIndex;

/// An entity group with the prices that matched
#[derive(Debug, Clone, PartialEq)]
pub struct PricedGroup {
    pub group: EntityGroup,
    /// Matched (name, price) pairs; unmatched names are left out
    pub prices: Vec<(String, Decimal)>,
    pub total: Decimal,
}

impl PricedGroup {
    pub fn price_of(&self, text: &str) -> Option<Decimal> {
        let text = text.to_lowercase();
        self.prices
            .iter()
            .find(|(name, _)| name.to_lowercase() == text)
            .map(|(_, price)| *price)
    }
}

/// Price every group against one pinned index
pub fn price_groups(groups: Vec<EntityGroup>, index: &PriceIndex) -> Vec<PricedGroup> {
    groups
        .into_iter()
        .map(|group| {
            let prices: Vec<(String, Decimal)> = group
                .names
                .iter()
                .filter_map(|name| {
                    index
                        .lookup(name)
                        .filter(|price| *price > Decimal::ZERO)
                        .map(|price| (name.clone(), price))
                })
                .collect();
            let total = prices.iter().map(|(_, price)| *price).sum();
            PricedGroup { group, prices, total }
        })
        .collect()
}
