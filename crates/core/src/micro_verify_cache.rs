//! Per-(user, blockTag) health-factor verification cache with in-flight
//! single-flight deduplication.
//!
//! Uses the same DashMap-locking idiom as [`crate::pre_sim_cache`],
//! extended with `tokio::sync::broadcast`-based single-flight
//! notification so concurrent callers for the same key share one build
//! and wake together on completion.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Result of a `getUserAccountData` verification at a given block.
#[derive(Debug, Clone)]
pub struct VerifiedHf {
    pub hf: f64,
    pub total_collateral_base: u128,
    pub total_debt_base: u128,
    pub liquidation_threshold_bps: u16,
    pub ltv_bps: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user: Address,
    block_tag: u64,
}

enum Slot {
    /// A build is in flight; waiters subscribe to be notified on completion.
    Pending(broadcast::Sender<VerifiedHf>),
    Ready(VerifiedHf),
}

/// `(user, blockTag) -> HF` cache with single-flight dedup and per-block TTL.
pub struct MicroVerifyCache {
    slots: DashMap<CacheKey, Slot>,
}

impl Default for MicroVerifyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MicroVerifyCache {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Returns the cached result if present, without triggering a build.
    pub fn peek(&self, user: Address, block_tag: u64) -> Option<VerifiedHf> {
        let key = CacheKey { user, block_tag };
        match self.slots.get(&key)?.value() {
            Slot::Ready(v) => Some(v.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Returns the verified HF for `(user, block_tag)`. If no entry
    /// exists, runs `build` exactly once; concurrent callers for the
    /// same key await the same in-flight future and receive its result.
    pub async fn get_or_create_inflight<F, Fut, E>(
        self: &Arc<Self>,
        user: Address,
        block_tag: u64,
        build: F,
    ) -> Result<VerifiedHf, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<VerifiedHf, E>>,
    {
        let key = CacheKey { user, block_tag };

        enum Role {
            Builder,
            Waiter(broadcast::Receiver<VerifiedHf>),
            Cached(VerifiedHf),
        }

        let role = {
            match self.slots.entry(key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(entry) => match entry.get() {
                    Slot::Ready(v) => Role::Cached(v.clone()),
                    Slot::Pending(tx) => Role::Waiter(tx.subscribe()),
                },
                dashmap::mapref::entry::Entry::Vacant(entry) => {
                    let (tx, _rx) = broadcast::channel(1);
                    entry.insert(Slot::Pending(tx));
                    Role::Builder
                }
            }
        };

        match role {
            Role::Cached(v) => Ok(v),
            Role::Waiter(mut rx) => match rx.recv().await {
                Ok(v) => Ok(v),
                // Sender dropped without a value (build failed): treat as
                // a fresh miss, retry as our own build.
                Err(_) => Box::pin(self.get_or_create_inflight(user, block_tag, build)).await,
            },
            Role::Builder => {
                let result = build().await;
                match &result {
                    Ok(v) => {
                        let tx = match self.slots.insert(key, Slot::Ready(v.clone())) {
                            Some(Slot::Pending(tx)) => Some(tx),
                            _ => None,
                        };
                        if let Some(tx) = tx {
                            let _ = tx.send(v.clone());
                        }
                    }
                    Err(_) => {
                        // Drop the pending slot so the key is retried on
                        // the next lookup rather than wedged forever.
                        self.slots.remove(&key);
                    }
                }
                result
            }
        }
    }

    /// Purge all cached/pending entries for blocks older than `current_block`.
    pub fn purge_stale(&self, current_block: u64) {
        self.slots.retain(|key, _| key.block_tag >= current_block);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample() -> VerifiedHf {
        VerifiedHf {
            hf: 1.02,
            total_collateral_base: 1000,
            total_debt_base: 500,
            liquidation_threshold_bps: 8000,
            ltv_bps: 7500,
        }
    }

    #[tokio::test]
    async fn single_flight_dedups_concurrent_builds() {
        let cache = Arc::new(MicroVerifyCache::new());
        let build_count = Arc::new(AtomicUsize::new(0));
        let user = Address::repeat_byte(1);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let build_count = build_count.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create_inflight(user, 100, || {
                        let build_count = build_count.clone();
                        async move {
                            build_count.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, anyhow::Error>(sample())
                        }
                    })
                    .await
            }));
        }

        for h in handles {
            let result = h.await.unwrap();
            assert!(result.is_ok());
        }

        assert_eq!(build_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn purge_stale_removes_old_blocks() {
        let cache = Arc::new(MicroVerifyCache::new());
        let user = Address::repeat_byte(1);
        cache
            .get_or_create_inflight(user, 100, || async { Ok::<_, anyhow::Error>(sample()) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
        cache.purge_stale(101);
        assert_eq!(cache.len(), 0);
    }
}
