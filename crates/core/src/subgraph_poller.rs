//! Polling-based `LiquidationCall` tracker, used where the WS
//! event path is unavailable or as a redundant cross-check.
//!
//! Grounded on the former `scanner.rs`'s interval-ticker/bootstrap shape
//! and `position_tracker.rs`'s bounded-FIFO eviction, recombined over the
//! out-of-scope `SubgraphClient` trait instead of a direct RPC log scan.

use liquidator_api::{LiquidationCallEvent, LiquidationCallFilter, SubgraphClient};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SubgraphPollerConfig {
    pub interval_ms: u64,
    pub poll_limit: u32,
    pub track_max: usize,
}

impl Default for SubgraphPollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 15_000,
            poll_limit: 100,
            track_max: 10_000,
        }
    }
}

/// Bounded FIFO set of seen `(txHash, user)` keys, used to diff each poll
/// snapshot against what has already been surfaced.
struct SeenSet {
    max: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenSet {
    fn new(max: usize) -> Self {
        Self {
            max,
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Returns true iff `key` is newly inserted (was not already tracked).
    fn insert(&mut self, key: String) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        self.members.insert(key.clone());
        self.order.push_back(key);
        while self.order.len() > self.max {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }
}

fn event_key(event: &LiquidationCallEvent) -> String {
    format!("{}:{:?}", event.tx_hash, event.user)
}

/// A single poll's result: every liquidation seen this tick, plus the
/// subset that is novel relative to prior ticks.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    pub all: Vec<LiquidationCallEvent>,
    pub new: Vec<LiquidationCallEvent>,
}

/// Ticks on an interval, diffing subgraph liquidation events against a
/// bounded "already seen" set.
pub struct SubgraphPoller {
    config: SubgraphPollerConfig,
    subgraph: Arc<dyn SubgraphClient>,
    seen: tokio::sync::Mutex<SeenSet>,
}

impl SubgraphPoller {
    pub fn new(config: SubgraphPollerConfig, subgraph: Arc<dyn SubgraphClient>) -> Self {
        let seen = SeenSet::new(config.track_max);
        Self {
            config,
            subgraph,
            seen: tokio::sync::Mutex::new(seen),
        }
    }

    /// One poll cycle: fetch the most recent page, diff, return the
    /// snapshot. Errors are surfaced via `PollSnapshot::default()` plus a
    /// logged warning, never panicking the caller's loop.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> PollSnapshot {
        let page = self
            .subgraph
            .liquidation_calls(LiquidationCallFilter {
                since_ts: None,
                until_ts: None,
                cursor: None,
                page_size: self.config.poll_limit,
            })
            .await;

        if let Some(err) = page.error {
            warn!(error = %err, "subgraph poll failed");
            return PollSnapshot::default();
        }

        let mut seen = self.seen.lock().await;
        let mut new = Vec::new();
        for event in &page.items {
            if seen.insert(event_key(event)) {
                new.push(event.clone());
            }
        }
        drop(seen);

        if !new.is_empty() {
            info!(count = new.len(), "new liquidation events observed");
        }

        PollSnapshot {
            all: page.items,
            new,
        }
    }

    /// Runs the interval loop until `shutdown` fires, invoking the two
    /// callbacks: `on_liquidations` sees every snapshot,
    /// `on_new_liquidations` only the novel subset.
    pub async fn run_forever<FAll, FNew>(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
        mut on_liquidations: FAll,
        mut on_new_liquidations: FNew,
    ) where
        FAll: FnMut(&PollSnapshot) + Send,
        FNew: FnMut(&[LiquidationCallEvent]) + Send,
    {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.poll_once().await;
                    on_liquidations(&snapshot);
                    if !snapshot.new.is_empty() {
                        on_new_liquidations(&snapshot.new);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use liquidator_api::InMemorySubgraphClient;

    fn event(user_byte: u8, block: u64) -> LiquidationCallEvent {
        LiquidationCallEvent {
            block_number: block,
            timestamp: block,
            tx_hash: format!("0x{block:064x}"),
            liquidator: Address::repeat_byte(0xEE),
            user: Address::repeat_byte(user_byte),
            collateral_asset: Address::repeat_byte(1),
            debt_asset: Address::repeat_byte(2),
            debt_to_cover: U256::from(1_000u64),
            liquidated_collateral_amount: U256::from(900u64),
        }
    }

    #[tokio::test]
    async fn second_poll_yields_no_new_events_for_unchanged_data() {
        let client = Arc::new(InMemorySubgraphClient::new(
            vec![event(1, 100), event(2, 101)],
            Vec::new(),
        ));
        let poller = SubgraphPoller::new(SubgraphPollerConfig::default(), client);

        let first = poller.poll_once().await;
        assert_eq!(first.new.len(), 2);

        let second = poller.poll_once().await;
        assert_eq!(second.new.len(), 0);
        assert_eq!(second.all.len(), 2);
    }

    #[test]
    fn seen_set_evicts_oldest_past_max() {
        let mut set = SeenSet::new(2);
        assert!(set.insert("a".to_string()));
        assert!(set.insert("b".to_string()));
        assert!(set.insert("c".to_string()));
        assert!(set.insert("a".to_string()));
        assert!(!set.insert("c".to_string()));
    }
}
