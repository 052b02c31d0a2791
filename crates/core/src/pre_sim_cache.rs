//! Per-(user, debtAsset, collateralAsset, blockTag, debtAmount) pre-sim
//! plan cache, bounded by an LRU ring and a per-block TTL.
//!
//! Grounded on `StagedLiquidation`'s DashMap+TTL+LRU shape, generalized
//! from position-hash invalidation to fingerprint keying plus a
//! per-block TTL.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Identifies a single pre-simulated liquidation plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreSimFingerprint {
    pub user: Address,
    pub debt_asset: Address,
    pub collateral_asset: Address,
    pub block_tag: u64,
    pub debt_amount: U256,
}

/// A pre-computed liquidation plan.
#[derive(Debug, Clone)]
pub struct PreSimPlan {
    pub fingerprint: PreSimFingerprint,
    pub expected_collateral: U256,
    pub estimated_profit_usd: f64,
    pub created_at_block: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PreSimCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

/// `fingerprint -> plan` cache, LRU-bounded with a per-block TTL.
pub struct PreSimCache {
    ttl_blocks: u64,
    max_size: usize,
    entries: DashMap<PreSimFingerprint, PreSimPlan>,
    /// Most-recently-used ordering, back = most recent.
    lru: Mutex<VecDeque<PreSimFingerprint>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl PreSimCache {
    pub fn new(ttl_blocks: u64, max_size: usize) -> Self {
        Self {
            ttl_blocks,
            max_size,
            entries: DashMap::new(),
            lru: Mutex::new(VecDeque::new()),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns the cached plan iff `current_block - plan.created_at_block
    /// <= ttl_blocks`. Expired or absent entries count as a miss; an
    /// expired entry is evicted immediately.
    pub fn get(&self, fingerprint: &PreSimFingerprint, current_block: u64) -> Option<PreSimPlan> {
        let hit = match self.entries.get(fingerprint) {
            Some(entry) => {
                if current_block.saturating_sub(entry.created_at_block) <= self.ttl_blocks {
                    Some(entry.clone())
                } else {
                    None
                }
            }
            None => None,
        };

        match hit {
            Some(plan) => {
                self.touch(fingerprint);
                self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Some(plan)
            }
            None => {
                self.entries.remove(fingerprint);
                self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                None
            }
        }
    }

    fn touch(&self, fingerprint: &PreSimFingerprint) {
        let mut lru = self.lru.lock().unwrap();
        lru.retain(|f| f != fingerprint);
        lru.push_back(fingerprint.clone());
    }

    /// Insert or refresh a plan, evicting the least-recently-used entry
    /// on overflow.
    pub fn set(&self, plan: PreSimPlan) {
        let fingerprint = plan.fingerprint.clone();
        let is_new = !self.entries.contains_key(&fingerprint);
        self.entries.insert(fingerprint.clone(), plan);
        self.touch(&fingerprint);

        if is_new {
            let mut lru = self.lru.lock().unwrap();
            while self.entries.len() > self.max_size {
                if let Some(evicted) = lru.pop_front() {
                    self.entries.remove(&evicted);
                } else {
                    break;
                }
            }
        }
    }

    pub fn stats(&self) -> PreSimCacheStats {
        PreSimCacheStats {
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
            size: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(user_byte: u8, block_tag: u64) -> PreSimFingerprint {
        PreSimFingerprint {
            user: Address::repeat_byte(user_byte),
            debt_asset: Address::repeat_byte(0xAA),
            collateral_asset: Address::repeat_byte(0xBB),
            block_tag,
            debt_amount: U256::from(1000u64),
        }
    }

    fn plan(fingerprint: PreSimFingerprint, created_at_block: u64) -> PreSimPlan {
        PreSimPlan {
            fingerprint,
            expected_collateral: U256::from(900u64),
            estimated_profit_usd: 5.0,
            created_at_block,
            timestamp: 0,
        }
    }

    #[test]
    fn pre_sim_hit_rate_scenario() {
        let cache = PreSimCache::new(5, 100);
        let block = 12_345_678u64;

        for i in 1..=5u8 {
            let fingerprint = fp(i, block);
            cache.set(plan(fingerprint, block));
        }

        for i in 1..=5u8 {
            assert!(cache.get(&fp(i, block), block).is_some());
        }
        let stats = cache.stats();
        assert_eq!(stats.hits, 5);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 5);

        // Advance beyond TTL: all queries now miss.
        for i in 1..=5u8 {
            assert!(cache.get(&fp(i, block), block + 6).is_none());
        }
    }

    #[test]
    fn lru_eviction_on_overflow() {
        let cache = PreSimCache::new(100, 2);
        cache.set(plan(fp(1, 1), 1));
        cache.set(plan(fp(2, 1), 1));
        // touch fp(1) so fp(2) becomes the least-recently-used
        cache.get(&fp(1, 1), 1);
        cache.set(plan(fp(3, 1), 1));

        assert!(cache.get(&fp(2, 1), 1).is_none());
        assert!(cache.get(&fp(1, 1), 1).is_some());
        assert!(cache.get(&fp(3, 1), 1).is_some());
        assert!(cache.len() <= 2);
    }
}
