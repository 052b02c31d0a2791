//! Subgraph GraphQL client contract.
//!
//! The real subgraph is an external collaborator: this module only defines
//! the trait callers program against plus an in-memory fixture for tests.
//! Paging, auth and backoff are the concrete implementation's problem.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Max page size the subgraph is willing to return per request.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// A single historical `LiquidationCall` event as reported by the subgraph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiquidationCallEvent {
    pub block_number: u64,
    pub timestamp: u64,
    pub tx_hash: String,
    pub liquidator: Address,
    pub user: Address,
    pub collateral_asset: Address,
    pub debt_asset: Address,
    pub debt_to_cover: U256,
    pub liquidated_collateral_amount: U256,
}

/// A borrower summary used to seed/refresh the candidate universe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BorrowerSummary {
    pub user: Address,
    pub borrowed_reserves_count: u32,
    pub debt_usd_cents: u64,
    pub collateral_usd_cents: u64,
}

/// Filter for a paginated `users` query.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub min_debt_usd_cents: Option<u64>,
    pub min_collateral_usd_cents: Option<u64>,
    pub cursor: Option<String>,
    pub page_size: u32,
}

/// Optional timestamp range for a paginated `liquidationCalls` query.
#[derive(Debug, Clone, Default)]
pub struct LiquidationCallFilter {
    pub since_ts: Option<u64>,
    pub until_ts: Option<u64>,
    pub cursor: Option<String>,
    pub page_size: u32,
}

/// Result of a single page fetch. `partial` signals the page is
/// incomplete (e.g. an abort signal fired mid-fetch); `error` carries a
/// human-readable cause without failing the whole call.
#[derive(Debug, Clone, Default)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub partial: bool,
    pub error: Option<String>,
}

impl<T> PagedResult<T> {
    pub fn ok(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self {
            items,
            next_cursor,
            partial: false,
            error: None,
        }
    }
}

/// Contract for the external subgraph GraphQL service.
#[async_trait]
pub trait SubgraphClient: Send + Sync {
    /// Paginated `liquidationCalls`, ordered by timestamp ascending.
    async fn liquidation_calls(
        &self,
        filter: LiquidationCallFilter,
    ) -> PagedResult<LiquidationCallEvent>;

    /// Paginated `users` filtered by debt/collateral thresholds.
    async fn users(&self, filter: UserFilter) -> PagedResult<BorrowerSummary>;
}

/// In-memory fixture implementation, used by tests and by replay when no
/// live subgraph is configured.
pub struct InMemorySubgraphClient {
    events: Vec<LiquidationCallEvent>,
    users: Vec<BorrowerSummary>,
    /// Queue of canned partial/error responses to return before falling
    /// back to the real fixture data, for exercising backoff paths.
    injected_failures: Mutex<VecDeque<String>>,
}

impl InMemorySubgraphClient {
    pub fn new(events: Vec<LiquidationCallEvent>, users: Vec<BorrowerSummary>) -> Self {
        Self {
            events,
            users,
            injected_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue an error to be returned by the next call instead of data.
    pub fn inject_failure(&self, message: impl Into<String>) {
        self.injected_failures.lock().unwrap().push_back(message.into());
    }

    fn take_injected_failure(&self) -> Option<String> {
        self.injected_failures.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl SubgraphClient for InMemorySubgraphClient {
    async fn liquidation_calls(
        &self,
        filter: LiquidationCallFilter,
    ) -> PagedResult<LiquidationCallEvent> {
        if let Some(err) = self.take_injected_failure() {
            return PagedResult {
                items: Vec::new(),
                next_cursor: None,
                partial: true,
                error: Some(err),
            };
        }

        let page_size = filter.page_size.min(MAX_PAGE_SIZE).max(1) as usize;
        let filtered: Vec<LiquidationCallEvent> = self
            .events
            .iter()
            .filter(|e| filter.since_ts.map(|t| e.timestamp >= t).unwrap_or(true))
            .filter(|e| filter.until_ts.map(|t| e.timestamp <= t).unwrap_or(true))
            .cloned()
            .collect();

        let start = filter
            .cursor
            .as_deref()
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + page_size).min(filtered.len());
        let items = filtered.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
        let next_cursor = if end < filtered.len() {
            Some(end.to_string())
        } else {
            None
        };

        PagedResult::ok(items, next_cursor)
    }

    async fn users(&self, filter: UserFilter) -> PagedResult<BorrowerSummary> {
        if let Some(err) = self.take_injected_failure() {
            return PagedResult {
                items: Vec::new(),
                next_cursor: None,
                partial: true,
                error: Some(err),
            };
        }

        let page_size = filter.page_size.min(MAX_PAGE_SIZE).max(1) as usize;
        let filtered: Vec<BorrowerSummary> = self
            .users
            .iter()
            .filter(|u| {
                filter
                    .min_debt_usd_cents
                    .map(|m| u.debt_usd_cents >= m)
                    .unwrap_or(true)
            })
            .filter(|u| {
                filter
                    .min_collateral_usd_cents
                    .map(|m| u.collateral_usd_cents >= m)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        let start = filter
            .cursor
            .as_deref()
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + page_size).min(filtered.len());
        let items = filtered.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
        let next_cursor = if end < filtered.len() {
            Some(end.to_string())
        } else {
            None
        };

        PagedResult::ok(items, next_cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_events() -> Vec<LiquidationCallEvent> {
        (0..5)
            .map(|i| LiquidationCallEvent {
                block_number: 100 + i,
                timestamp: 1_000 + i,
                tx_hash: format!("0x{i:064x}"),
                liquidator: Address::ZERO,
                user: Address::ZERO,
                collateral_asset: Address::ZERO,
                debt_asset: Address::ZERO,
                debt_to_cover: U256::from(1000),
                liquidated_collateral_amount: U256::from(900),
            })
            .collect()
    }

    #[tokio::test]
    async fn paginates_liquidation_calls() {
        let client = InMemorySubgraphClient::new(sample_events(), Vec::new());

        let page1 = client
            .liquidation_calls(LiquidationCallFilter {
                page_size: 2,
                ..Default::default()
            })
            .await;
        assert_eq!(page1.items.len(), 2);
        assert!(page1.next_cursor.is_some());

        let page2 = client
            .liquidation_calls(LiquidationCallFilter {
                page_size: 2,
                cursor: page1.next_cursor,
                ..Default::default()
            })
            .await;
        assert_eq!(page2.items.len(), 2);
    }

    #[tokio::test]
    async fn injected_failure_marks_partial() {
        let client = InMemorySubgraphClient::new(sample_events(), Vec::new());
        client.inject_failure("rate limited");

        let result = client
            .liquidation_calls(LiquidationCallFilter {
                page_size: 10,
                ..Default::default()
            })
            .await;

        assert!(result.partial);
        assert_eq!(result.error.as_deref(), Some("rate limited"));
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn filters_users_by_thresholds() {
        let users = vec![
            BorrowerSummary {
                user: Address::ZERO,
                borrowed_reserves_count: 1,
                debt_usd_cents: 500,
                collateral_usd_cents: 1000,
            },
            BorrowerSummary {
                user: Address::ZERO,
                borrowed_reserves_count: 1,
                debt_usd_cents: 50,
                collateral_usd_cents: 100,
            },
        ];
        let client = InMemorySubgraphClient::new(Vec::new(), users);

        let result = client
            .users(UserFilter {
                min_debt_usd_cents: Some(200),
                page_size: 10,
                ..Default::default()
            })
            .await;

        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].debt_usd_cents, 500);
    }
}
