use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{instrument, warn};

use crate::price::types::{Asset, AssetSet, Direction, PriceSample};

/// Last-known price data for one asset.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceEntry {
    pub asset: Asset,
    pub current: Option<PriceSample>,
    /// Present only once two successful samples have been observed.
    pub previous: Option<PriceSample>,
    pub direction: Direction,
    /// Set when the latest cycle failed; cleared by the next successful sample.
    pub stale: bool,
}

impl PriceEntry {
    fn empty(asset: Asset) -> Self {
        Self {
            asset,
            current: None,
            previous: None,
            direction: Direction::Unknown,
            stale: false,
        }
    }
}

/// What one `update` did to one asset.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceChange {
    pub asset_id: String,
    pub previous: Option<PriceSample>,
    pub current: PriceSample,
    pub direction: Direction,
    pub direction_changed: bool,
}

#[derive(Default)]
struct Inner {
    /// Configured asset order.
    order: Vec<String>,
    entries: HashMap<String, PriceEntry>,
}

/// Per-asset current/previous prices.
///
/// Single writer (the session context applying cycle reports), any number of
/// readers. Each write is an atomic overwrite of the affected entries.
pub struct PriceState {
    inner: RwLock<Inner>,
}

impl PriceState {
    pub fn new(assets: &AssetSet) -> Self {
        let state = Self {
            inner: RwLock::new(Inner::default()),
        };
        state.retain(assets);
        state
    }

    /// Install a successful cycle's samples.
    ///
    /// Cycles are applied in the order they complete; sample timestamps are
    /// wall-clock readings and play no part in ordering, so a clock stepping
    /// back never freezes prices. Invalid samples and untracked assets are
    /// ignored.
    #[instrument(skip(self, samples), fields(samples = samples.len()), target = "price_state")]
    pub fn update(&self, samples: &HashMap<String, PriceSample>) -> Vec<PriceChange> {
        let mut inner = self.inner.write();
        let Inner { order, entries } = &mut *inner;

        let mut changes = Vec::new();

        for id in order.iter() {
            let Some(sample) = samples.get(id) else {
                continue;
            };
            let Some(entry) = entries.get_mut(id) else {
                continue;
            };

            if !sample.is_valid() {
                warn!(asset = %id, price = sample.price, "ignoring invalid price sample");
                continue;
            }

            let old_direction = entry.direction;

            entry.previous = entry.current.take();
            entry.current = Some(sample.clone());
            entry.stale = false;
            entry.direction = match &entry.previous {
                Some(prev) => Direction::between(prev.price, sample.price),
                None => Direction::Unknown,
            };

            changes.push(PriceChange {
                asset_id: id.clone(),
                previous: entry.previous.clone(),
                current: sample.clone(),
                direction: entry.direction,
                direction_changed: entry.direction != old_direction,
            });
        }

        changes
    }

    /// Flag every entry holding a price as stale. Prices themselves are kept.
    /// Returns true if any flag flipped.
    pub fn mark_stale(&self) -> bool {
        let mut inner = self.inner.write();
        let mut flipped = false;
        for entry in inner.entries.values_mut() {
            if entry.current.is_some() && !entry.stale {
                entry.stale = true;
                flipped = true;
            }
        }
        flipped
    }

    pub fn read(&self, asset_id: &str) -> Option<PriceEntry> {
        self.inner.read().entries.get(asset_id).cloned()
    }

    /// All entries in configured order.
    pub fn snapshot(&self) -> Vec<PriceEntry> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect()
    }

    /// Align tracked entries with `assets`: removed assets are dropped, new
    /// ones start empty, surviving ones keep their history.
    pub fn retain(&self, assets: &AssetSet) {
        let mut inner = self.inner.write();

        inner.entries.retain(|id, _| assets.contains(id));
        for asset in assets.iter() {
            inner
                .entries
                .entry(asset.id.clone())
                .and_modify(|e| e.asset = asset.clone())
                .or_insert_with(|| PriceEntry::empty(asset.clone()));
        }
        inner.order = assets.iter().map(|a| a.id.clone()).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::types::AssetRole;

    fn assets() -> AssetSet {
        AssetSet::new(vec![
            Asset::new("BTC", AssetRole::Primary),
            Asset::new("ETH", AssetRole::Secondary),
        ])
    }

    fn cycle(ts: u64, prices: &[(&str, f64)]) -> HashMap<String, PriceSample> {
        prices
            .iter()
            .map(|(id, p)| (id.to_string(), PriceSample::ok(*id, *p, ts)))
            .collect()
    }

    #[test]
    fn direction_unknown_until_second_sample() {
        let state = PriceState::new(&assets());

        let changes = state.update(&cycle(1, &[("BTC", 100.0)]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].direction, Direction::Unknown);
        assert!(!changes[0].direction_changed);

        let entry = state.read("BTC").unwrap();
        assert!(entry.previous.is_none());
        assert_eq!(entry.direction, Direction::Unknown);

        let changes = state.update(&cycle(2, &[("BTC", 101.0)]));
        assert_eq!(changes[0].direction, Direction::Up);
        assert!(changes[0].direction_changed);
        assert_eq!(state.read("BTC").unwrap().previous.unwrap().price, 100.0);
    }

    #[test]
    fn stale_marking_keeps_prices() {
        let state = PriceState::new(&assets());
        state.update(&cycle(1, &[("BTC", 100.0), ("ETH", 10.0)]));
        state.update(&cycle(2, &[("BTC", 99.0), ("ETH", 10.0)]));

        let before = state.read("BTC").unwrap();
        assert!(state.mark_stale());
        assert!(!state.mark_stale(), "second mark is a no-op");

        let after = state.read("BTC").unwrap();
        assert!(after.stale);
        assert_eq!(after.current, before.current);
        assert_eq!(after.previous, before.previous);
        assert_eq!(after.direction, Direction::Down);

        state.update(&cycle(3, &[("BTC", 99.0)]));
        let fresh = state.read("BTC").unwrap();
        assert!(!fresh.stale);
        assert_eq!(fresh.direction, Direction::Flat);
        assert!(state.read("ETH").unwrap().stale, "ETH got no new sample");
    }

    #[test]
    fn clock_stepping_back_still_installs_the_new_cycle() {
        let state = PriceState::new(&assets());
        state.update(&cycle(1_000_000, &[("BTC", 100.0)]));

        let changes = state.update(&cycle(999_000, &[("BTC", 120.0)]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].direction, Direction::Up);

        let entry = state.read("BTC").unwrap();
        assert_eq!(entry.current.unwrap().price, 120.0);
        assert_eq!(entry.previous.unwrap().price, 100.0);

        // same timestamp twice is still two cycles
        state.update(&cycle(999_000, &[("BTC", 110.0)]));
        let entry = state.read("BTC").unwrap();
        assert_eq!(entry.current.unwrap().price, 110.0);
        assert_eq!(entry.direction, Direction::Down);
    }

    #[test]
    fn untracked_and_invalid_samples_do_not_create_entries() {
        let state = PriceState::new(&assets());
        let changes = state.update(&cycle(1, &[("DOGE", 1.0), ("BTC", -5.0)]));
        assert!(changes.is_empty());
        assert!(state.read("DOGE").is_none());
        assert!(state.read("BTC").unwrap().current.is_none());
    }

    #[test]
    fn retain_drops_removed_assets_and_keeps_history() {
        let state = PriceState::new(&assets());
        state.update(&cycle(1, &[("BTC", 100.0), ("ETH", 10.0)]));

        state.retain(&AssetSet::new(vec![
            Asset::new("SOL", AssetRole::Primary),
            Asset::new("BTC", AssetRole::Secondary),
        ]));

        let ids: Vec<_> = state.snapshot().into_iter().map(|e| e.asset.id).collect();
        assert_eq!(ids, vec!["SOL", "BTC"]);
        assert!(state.read("ETH").is_none());
        assert_eq!(state.read("BTC").unwrap().current.unwrap().price, 100.0);
        assert_eq!(state.read("BTC").unwrap().asset.role, AssetRole::Secondary);
    }
}
