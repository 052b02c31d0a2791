//! Single-flight admission control per `(triggerType, key, blockTag)`.
//!
//! Grounded on the former `pre_staging.rs`'s DashMap-keyed TTL/validity
//! pattern, adapted from a value cache to a plain acquire/release
//! admission lock, plus a bounded-LRU "recently completed" ring mirroring
//! the former `position_tracker.rs`'s bounded `staged_txs` eviction.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanKey {
    pub trigger_type: String,
    pub key: Option<String>,
    pub block_tag: u64,
}

impl ScanKey {
    pub fn new(trigger_type: impl Into<String>, key: Option<String>, block_tag: u64) -> Self {
        Self {
            trigger_type: trigger_type.into(),
            key,
            block_tag,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanRegistryConfig {
    pub ttl: Duration,
    pub max_recently_completed_size: usize,
}

impl Default for ScanRegistryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_recently_completed_size: 10_000,
        }
    }
}

impl ScanRegistryConfig {
    /// Size the TTL/ring against observed block cadence.
    pub fn for_block_time(avg_block_time_ms: u64) -> Self {
        Self {
            ttl: Duration::from_millis((avg_block_time_ms * 3).max(5_000)),
            ..Default::default()
        }
    }
}

/// Enforces at-most-one in-flight scan per key, and refuses immediate
/// re-scans of a key within the TTL after completion.
pub struct ScanRegistry {
    config: ScanRegistryConfig,
    in_flight: DashMap<ScanKey, Instant>,
    recently_completed: DashMap<ScanKey, Instant>,
    /// Insertion order for bounding `recently_completed`.
    completed_order: Mutex<VecDeque<ScanKey>>,
}

impl ScanRegistry {
    pub fn new(config: ScanRegistryConfig) -> Self {
        Self {
            config,
            in_flight: DashMap::new(),
            recently_completed: DashMap::new(),
            completed_order: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns true iff there is no in-flight scan for this key and it was
    /// not recently completed within the TTL. On success, marks the key
    /// in-flight.
    pub fn acquire(&self, key: ScanKey) -> bool {
        self.cleanup();

        if self.in_flight.contains_key(&key) {
            return false;
        }
        if let Some(completed_at) = self.recently_completed.get(&key) {
            if completed_at.elapsed() < self.config.ttl {
                return false;
            }
        }

        self.in_flight.insert(key, Instant::now());
        true
    }

    /// Move `key` from in-flight to recently-completed.
    pub fn release(&self, key: ScanKey) {
        self.in_flight.remove(&key);
        self.recently_completed.insert(key.clone(), Instant::now());

        let mut order = self.completed_order.lock().unwrap();
        order.push_back(key);
        while order.len() > self.config.max_recently_completed_size {
            if let Some(evicted) = order.pop_front() {
                self.recently_completed.remove(&evicted);
            }
        }
    }

    /// Remove entries (in-flight stuck beyond TTL, or completed beyond
    /// TTL) older than the configured TTL.
    pub fn cleanup(&self) {
        let ttl = self.config.ttl;
        self.recently_completed.retain(|_, at| at.elapsed() < ttl);
        // in-flight entries are only removed by an explicit release; a
        // TTL-expired in-flight entry is treated as abandoned and freed
        // so a stuck scan cannot wedge the key forever.
        self.in_flight.retain(|_, at| at.elapsed() < ttl * 4);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_exclusive_until_release() {
        let registry = ScanRegistry::new(ScanRegistryConfig::default());
        let key = ScanKey::new("reserve_fast", Some("0xabc".into()), 100);

        assert!(registry.acquire(key.clone()));
        assert!(!registry.acquire(key.clone()));

        registry.release(key.clone());
        // still within TTL, still refused
        assert!(!registry.acquire(key.clone()));
    }

    #[test]
    fn acquire_allowed_again_after_ttl_expiry() {
        let registry = ScanRegistry::new(ScanRegistryConfig {
            ttl: Duration::from_millis(10),
            ..Default::default()
        });
        let key = ScanKey::new("near_threshold", None, 1);

        assert!(registry.acquire(key.clone()));
        registry.release(key.clone());
        std::thread::sleep(Duration::from_millis(30));
        assert!(registry.acquire(key));
    }

    #[test]
    fn different_block_tags_are_independent_keys() {
        let registry = ScanRegistry::new(ScanRegistryConfig::default());
        let k1 = ScanKey::new("head_critical", None, 1);
        let k2 = ScanKey::new("head_critical", None, 2);
        assert!(registry.acquire(k1));
        assert!(registry.acquire(k2));
    }
}
