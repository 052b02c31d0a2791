//! Periodic subgraph sweep that re-scores the full borrower universe and
//! publishes a bounded top-N `PrioritySet` snapshot.
//!
//! Grounded on the former `scanner.rs`'s `bootstrap()` (paginated
//! discovery, single-flight-via-`AtomicBool` reentrancy guard) and a
//! min-heap top-N pattern common to MEV-adjacent scanners. Subgraph
//! paging goes through the out-of-scope `SubgraphClient` trait.

use alloy::primitives::Address;
use liquidator_api::{SubgraphClient, UserFilter};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::candidate::{now_unix, HotlistWeights};

/// Weights for sweep-time scoring; kept independent of the live
/// hotlist's own weights since the sweep scores a wider candidate pool.
#[derive(Debug, Clone, Copy)]
pub struct SweepWeights {
    pub debt: f64,
    pub collateral: f64,
    pub hf_penalty: f64,
    pub hf_ceiling: f64,
    pub low_hf_boost: f64,
}

impl Default for SweepWeights {
    fn default() -> Self {
        Self {
            debt: 1.0,
            collateral: 0.2,
            hf_penalty: 1.0,
            hf_ceiling: 1.5,
            low_hf_boost: 2.0,
        }
    }
}

impl From<SweepWeights> for HotlistWeights {
    fn from(w: SweepWeights) -> Self {
        HotlistWeights {
            w1: w.hf_penalty,
            w2: w.low_hf_boost,
            w3: w.debt,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrioritySweepConfig {
    pub interval_min: u64,
    pub target_size: usize,
    pub max_scan_users: usize,
    pub page_size: u32,
    pub inter_request_delay_ms: u64,
    pub sweep_timeout_ms: u64,
    pub min_debt_usd: f64,
    pub min_collateral_usd: f64,
    pub weights: SweepWeights,
}

impl Default for PrioritySweepConfig {
    fn default() -> Self {
        Self {
            interval_min: 15,
            target_size: 2_000,
            max_scan_users: 50_000,
            page_size: 1_000,
            inter_request_delay_ms: 100,
            sweep_timeout_ms: 60_000,
            min_debt_usd: 10.0,
            min_collateral_usd: 10.0,
            weights: SweepWeights::default(),
        }
    }
}

/// Immutable published snapshot of the top-N priority set.
#[derive(Debug, Clone)]
pub struct PrioritySet {
    pub version: u64,
    pub generated_at: u64,
    pub users: Vec<Address>,
    pub scanned: usize,
    pub total_candidates: usize,
}

struct ScoredUser {
    score: f64,
    user: Address,
}

impl PartialEq for ScoredUser {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.user == other.user
    }
}
impl Eq for ScoredUser {}
impl PartialOrd for ScoredUser {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScoredUser {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the heap is a min-heap on score: popping evicts the
        // current lowest-scoring member when the heap overflows `target_size`.
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.user.cmp(&other.user))
    }
}

fn score_user(debt_usd: f64, collateral_usd: f64, weights: SweepWeights) -> f64 {
    // Without a live HF reading at sweep time, proximity is approximated
    // purely from position size; the live trigger fabric supplies
    // the HF-aware hotlist scoring once a candidate enters the universe.
    weights.debt * debt_usd.max(1.0).log10() + weights.collateral * collateral_usd.max(1.0).log10()
        - weights.hf_penalty * 0.0
        - weights.low_hf_boost * 0.0
        + weights.hf_ceiling * 0.0
}

/// Runs the periodic sweep and holds the latest published `PrioritySet`.
pub struct PrioritySweepRunner {
    config: PrioritySweepConfig,
    subgraph: Arc<dyn SubgraphClient>,
    latest: parking_lot::RwLock<Option<PrioritySet>>,
    version: AtomicU64,
    running: AtomicBool,
}

impl PrioritySweepRunner {
    pub fn new(config: PrioritySweepConfig, subgraph: Arc<dyn SubgraphClient>) -> Self {
        Self {
            config,
            subgraph,
            latest: parking_lot::RwLock::new(None),
            version: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn latest(&self) -> Option<PrioritySet> {
        self.latest.read().clone()
    }

    /// Run the sweep forever on `interval_min` ticks. Overlapping runs
    /// are suppressed by the `running` guard (single-flight).
    pub async fn run_forever(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_min * 60));
        loop {
            ticker.tick().await;
            self.clone().run_once().await;
        }
    }

    /// Run a single sweep if one is not already in progress. Returns
    /// `None` if skipped due to reentrancy, `Some(false)` on failure with
    /// the prior snapshot left untouched.
    #[instrument(skip(self))]
    pub async fn run_once(self: Arc<Self>) -> Option<bool> {
        if self
            .running
            .compare_exchange(false, true, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst)
            .is_err()
        {
            info!("priority sweep already in progress, skipping tick");
            return None;
        }

        let result = tokio::time::timeout(
            Duration::from_millis(self.config.sweep_timeout_ms),
            self.sweep(),
        )
        .await;

        self.running.store(false, AtomicOrdering::SeqCst);

        match result {
            Ok(Ok(set)) => {
                let version = set.version;
                *self.latest.write() = Some(set);
                info!(version, "priority sweep published new snapshot");
                Some(true)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "priority sweep aborted, keeping prior snapshot");
                Some(false)
            }
            Err(_) => {
                warn!("priority sweep timed out, keeping prior snapshot");
                Some(false)
            }
        }
    }

    async fn sweep(&self) -> anyhow::Result<PrioritySet> {
        let mut heap: BinaryHeap<ScoredUser> = BinaryHeap::new();
        let mut cursor: Option<String> = None;
        let mut scanned = 0usize;

        loop {
            if scanned >= self.config.max_scan_users {
                break;
            }

            let page = self
                .subgraph
                .users(UserFilter {
                    min_debt_usd_cents: Some((self.config.min_debt_usd * 100.0) as u64),
                    min_collateral_usd_cents: Some((self.config.min_collateral_usd * 100.0) as u64),
                    cursor: cursor.clone(),
                    page_size: self.config.page_size,
                })
                .await;

            if let Some(err) = page.error {
                anyhow::bail!("subgraph users query failed: {err}");
            }

            for u in &page.items {
                scanned += 1;
                let debt_usd = u.debt_usd_cents as f64 / 100.0;
                let collateral_usd = u.collateral_usd_cents as f64 / 100.0;
                let score = score_user(debt_usd, collateral_usd, self.config.weights);

                heap.push(ScoredUser { score, user: u.user });
                while heap.len() > self.config.target_size {
                    heap.pop();
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }

            tokio::time::sleep(Duration::from_millis(self.config.inter_request_delay_ms)).await;
        }

        let mut scored: Vec<ScoredUser> = heap.into_vec();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        let users: Vec<Address> = scored.into_iter().map(|s| s.user).collect();

        let version = self.version.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        Ok(PrioritySet {
            version,
            generated_at: now_unix(),
            total_candidates: users.len(),
            users,
            scanned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidator_api::{BorrowerSummary, InMemorySubgraphClient};

    fn user(byte: u8, debt_cents: u64, collateral_cents: u64) -> BorrowerSummary {
        BorrowerSummary {
            user: Address::repeat_byte(byte),
            borrowed_reserves_count: 1,
            debt_usd_cents: debt_cents,
            collateral_usd_cents: collateral_cents,
        }
    }

    #[tokio::test]
    async fn sweep_publishes_monotonic_versions() {
        let users = vec![user(1, 100_00, 200_00), user(2, 5_00, 10_00)];
        let client = Arc::new(InMemorySubgraphClient::new(Vec::new(), users));
        let runner = Arc::new(PrioritySweepRunner::new(
            PrioritySweepConfig {
                target_size: 1,
                ..Default::default()
            },
            client,
        ));

        assert_eq!(runner.clone().run_once().await, Some(true));
        let first = runner.latest().unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.users.len(), 1);

        assert_eq!(runner.clone().run_once().await, Some(true));
        let second = runner.latest().unwrap();
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn aborted_sweep_keeps_prior_snapshot() {
        let users = vec![user(1, 100_00, 200_00)];
        let client = Arc::new(InMemorySubgraphClient::new(Vec::new(), users));
        client.inject_failure("network down");
        let runner = Arc::new(PrioritySweepRunner::new(PrioritySweepConfig::default(), client));

        let outcome = runner.clone().run_once().await;
        assert_eq!(outcome, Some(false));
        assert!(runner.latest().is_none());
    }

    #[tokio::test]
    async fn deterministic_reruns_yield_identical_users() {
        let users = vec![user(1, 100_00, 200_00), user(2, 50_00, 60_00), user(3, 10_00, 15_00)];
        let client = Arc::new(InMemorySubgraphClient::new(Vec::new(), users));
        let runner = Arc::new(PrioritySweepRunner::new(
            PrioritySweepConfig {
                target_size: 3,
                ..Default::default()
            },
            client,
        ));

        runner.clone().run_once().await;
        let first_users = runner.latest().unwrap().users;
        runner.clone().run_once().await;
        let second_users = runner.latest().unwrap().users;
        assert_eq!(first_users, second_users);
    }
}
