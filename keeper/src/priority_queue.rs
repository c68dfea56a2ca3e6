//! Priority queue for tracking vessel health (min-heap by ICR)

use ballast_engine::{AccountId, AssetId};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;

type VesselKey = (AssetId, AccountId);

/// Vessel health snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VesselHealth {
    pub asset: AssetId,
    pub owner: AccountId,
    /// Individual collateral ratio at the scan price, 1e18-scaled
    pub icr: u128,
    /// Collateral including pending redistribution
    pub coll: u128,
    /// Composite debt including pending redistribution and the reserve
    pub debt: u128,
    /// Unix time of the scan
    pub last_update: u64,
}

impl VesselHealth {
    /// Check if vessel is below the liquidation threshold
    pub fn needs_liquidation(&self, threshold: u128) -> bool {
        self.icr < threshold
    }

    /// Check if vessel is healthy but within `margin` of the threshold
    pub fn in_watch_zone(&self, threshold: u128, margin: u128) -> bool {
        self.icr >= threshold && self.icr < threshold.saturating_add(margin)
    }

    fn key(&self) -> VesselKey {
        (self.asset, self.owner)
    }
}

/// Health-based priority queue (min-heap: lowest ICR first)
pub struct HealthQueue {
    /// Priority queue (using Reverse for min-heap)
    queue: PriorityQueue<VesselKey, Reverse<u128>>,
    /// Map for O(1) lookups
    map: HashMap<VesselKey, VesselHealth>,
}

impl HealthQueue {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            map: HashMap::new(),
        }
    }

    /// Push or update vessel health
    pub fn push(&mut self, health: VesselHealth) {
        let key = health.key();
        let icr = health.icr;
        self.map.insert(key, health);
        self.queue.push(key, Reverse(icr));
    }

    /// Pop vessel with lowest ICR
    pub fn pop(&mut self) -> Option<VesselHealth> {
        let (key, _priority) = self.queue.pop()?;
        self.map.remove(&key)
    }

    /// Peek at vessel with lowest ICR without removing
    pub fn peek(&self) -> Option<&VesselHealth> {
        let (key, _priority) = self.queue.peek()?;
        self.map.get(key)
    }

    pub fn remove(&mut self, asset: AssetId, owner: AccountId) -> Option<VesselHealth> {
        self.queue.remove(&(asset, owner));
        self.map.remove(&(asset, owner))
    }

    pub fn get(&self, asset: AssetId, owner: AccountId) -> Option<&VesselHealth> {
        self.map.get(&(asset, owner))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Vessels of `asset` below `threshold`, worst first
    pub fn get_liquidatable(&self, asset: AssetId, threshold: u128) -> Vec<VesselHealth> {
        let mut out: Vec<VesselHealth> = self
            .map
            .values()
            .filter(|vh| vh.asset == asset && vh.needs_liquidation(threshold))
            .cloned()
            .collect();
        out.sort_by_key(|vh| (vh.icr, vh.owner));
        out
    }

    /// Vessels of `asset` close above `threshold`
    pub fn get_watchlist(&self, asset: AssetId, threshold: u128, margin: u128) -> Vec<VesselHealth> {
        self.map
            .values()
            .filter(|vh| vh.asset == asset && vh.in_watch_zone(threshold, margin))
            .cloned()
            .collect()
    }

    /// Drop every entry of one asset
    pub fn clear_asset(&mut self, asset: AssetId) {
        self.map.retain(|key, _| key.0 != asset);
        self.queue.retain(|key, _| key.0 != asset);
    }
}

impl Default for HealthQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PCT: u128 = 10_000_000_000_000_000;
    const ETH: AssetId = AssetId(1);

    fn make_vessel_health(owner: u64, icr_pct: u128) -> VesselHealth {
        VesselHealth {
            asset: ETH,
            owner: AccountId(owner),
            icr: icr_pct * PCT,
            coll: 10,
            debt: 1_000,
            last_update: 0,
        }
    }

    #[test]
    fn test_queue_push_pop() {
        let mut queue = HealthQueue::new();

        queue.push(make_vessel_health(1, 105));
        queue.push(make_vessel_health(2, 150));
        queue.push(make_vessel_health(3, 90));

        assert_eq!(queue.len(), 3);

        // Should pop lowest ICR first
        let popped = queue.pop().unwrap();
        assert_eq!(popped.icr, 90 * PCT);

        let popped = queue.pop().unwrap();
        assert_eq!(popped.icr, 105 * PCT);
    }

    #[test]
    fn test_queue_peek() {
        let mut queue = HealthQueue::new();

        queue.push(make_vessel_health(1, 150));
        queue.push(make_vessel_health(2, 105));

        let peeked = queue.peek().unwrap();
        assert_eq!(peeked.owner, AccountId(2));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_liquidatable_vessels_worst_first() {
        let mut queue = HealthQueue::new();

        queue.push(make_vessel_health(1, 105));
        queue.push(make_vessel_health(2, 150));
        queue.push(make_vessel_health(3, 95));
        queue.push(make_vessel_health(4, 110)); // at MCR is not liquidatable
        let mut other = make_vessel_health(5, 50);
        other.asset = AssetId(2);
        queue.push(other);

        let owners: Vec<_> = queue.get_liquidatable(ETH, 110 * PCT).into_iter().map(|vh| vh.owner).collect();
        assert_eq!(owners, vec![AccountId(3), AccountId(1)]);
    }

    #[test]
    fn test_watchlist() {
        let mut queue = HealthQueue::new();

        queue.push(make_vessel_health(1, 112));
        queue.push(make_vessel_health(2, 130));
        queue.push(make_vessel_health(3, 100));

        let watch = queue.get_watchlist(ETH, 110 * PCT, 5 * PCT);
        assert_eq!(watch.len(), 1);
        assert_eq!(watch[0].owner, AccountId(1));
    }

    #[test]
    fn test_queue_update_and_clear_asset() {
        let mut queue = HealthQueue::new();

        let mut vh = make_vessel_health(1, 150);
        queue.push(vh.clone());
        vh.icr = 100 * PCT;
        queue.push(vh);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(ETH, AccountId(1)).unwrap().icr, 100 * PCT);

        let mut other = make_vessel_health(1, 120);
        other.asset = AssetId(2);
        queue.push(other);
        queue.clear_asset(ETH);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().asset, AssetId(2));
        assert!(queue.remove(AssetId(2), AccountId(1)).is_none());
        assert!(queue.is_empty());
    }
}
