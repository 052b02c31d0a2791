//! Paginated ground-truth `LiquidationCall` loader.
//!
//! Goes through the out-of-scope `SubgraphClient` trait, same as
//! [`crate::priority_sweep::PrioritySweepRunner`].

use alloy::primitives::Address;
use liquidator_api::{LiquidationCallEvent, LiquidationCallFilter, SubgraphClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct GroundTruthConfig {
    pub page_size: u32,
    pub max_pages: usize,
    pub inter_request_delay_ms: u64,
}

impl Default for GroundTruthConfig {
    fn default() -> Self {
        Self {
            page_size: 1_000,
            max_pages: 1_000,
            inter_request_delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroundTruthResult {
    pub events: Vec<LiquidationCallEvent>,
    pub partial: bool,
    pub error: Option<String>,
}

pub struct GroundTruthLoader {
    config: GroundTruthConfig,
    subgraph: Arc<dyn SubgraphClient>,
}

impl GroundTruthLoader {
    pub fn new(config: GroundTruthConfig, subgraph: Arc<dyn SubgraphClient>) -> Self {
        Self { config, subgraph }
    }

    /// Paginate `liquidationCalls` within `[since_ts, until_ts]`. Auth
    /// errors and other per-page failures mark the result `partial` and
    /// fall back to whatever was already collected, rather than aborting.
    pub async fn load(&self, since_ts: u64, until_ts: u64) -> GroundTruthResult {
        let mut events = Vec::new();
        let mut cursor: Option<String> = None;
        let mut partial = false;
        let mut error = None;

        for _ in 0..self.config.max_pages {
            let page = self
                .subgraph
                .liquidation_calls(LiquidationCallFilter {
                    since_ts: Some(since_ts),
                    until_ts: Some(until_ts),
                    cursor: cursor.clone(),
                    page_size: self.config.page_size,
                })
                .await;

            if page.partial {
                partial = true;
            }
            if let Some(err) = page.error {
                warn!(error = %err, "ground truth page failed, continuing with partial data");
                error = Some(err);
                partial = true;
                break;
            }

            events.extend(page.items);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }

            tokio::time::sleep(Duration::from_millis(self.config.inter_request_delay_ms)).await;
        }

        GroundTruthResult {
            events,
            partial,
            error,
        }
    }
}

/// Index ground truth by user for O(1) lookup during block-by-block replay.
pub fn index_by_user(events: &[LiquidationCallEvent]) -> HashMap<Address, LiquidationCallEvent> {
    let mut map = HashMap::new();
    for event in events {
        map.entry(event.user).or_insert_with(|| event.clone());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidator_api::InMemorySubgraphClient;
    use alloy::primitives::U256;

    fn event(user_byte: u8, block: u64, ts: u64) -> LiquidationCallEvent {
        LiquidationCallEvent {
            block_number: block,
            timestamp: ts,
            tx_hash: format!("0x{block:064x}"),
            liquidator: Address::repeat_byte(0xEE),
            user: Address::repeat_byte(user_byte),
            collateral_asset: Address::repeat_byte(1),
            debt_asset: Address::repeat_byte(2),
            debt_to_cover: U256::from(1000u64),
            liquidated_collateral_amount: U256::from(900u64),
        }
    }

    #[tokio::test]
    async fn loads_all_pages_within_range() {
        let events: Vec<_> = (0..5).map(|i| event(i, 100 + i as u64, 1_000 + i as u64)).collect();
        let client = Arc::new(InMemorySubgraphClient::new(events, Vec::new()));
        let loader = GroundTruthLoader::new(
            GroundTruthConfig {
                page_size: 2,
                inter_request_delay_ms: 0,
                ..Default::default()
            },
            client,
        );

        let result = loader.load(1_000, 1_004).await;
        assert!(!result.partial);
        assert_eq!(result.events.len(), 5);
    }

    #[tokio::test]
    async fn marks_partial_on_injected_failure() {
        let client = Arc::new(InMemorySubgraphClient::new(vec![event(1, 100, 1_000)], Vec::new()));
        client.inject_failure("auth error");
        let loader = GroundTruthLoader::new(GroundTruthConfig::default(), client);

        let result = loader.load(0, 2_000).await;
        assert!(result.partial);
        assert!(result.error.is_some());
    }
}
