//! Tiered fee plans derived from fee history.
//!
//! Derives three simultaneous fee tiers (fast/mid/safe) from a single
//! fee-history fetch, refreshed on a timer.

use alloy::providers::{Provider, ProviderBuilder};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasTier {
    Fast,
    Mid,
    Safe,
}

#[derive(Debug, Clone, Copy)]
pub struct GasPlan {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl GasPlan {
    pub fn tip(&self) -> u128 {
        self.max_priority_fee_per_gas
    }
}

#[derive(Debug, Clone)]
pub struct GasLadderConfig {
    pub http_url: String,
    pub refresh_interval_ms: u64,
    pub fast_tip_multiplier: f64,
    pub mid_tip_multiplier: f64,
    pub safe_tip_multiplier: f64,
}

impl Default for GasLadderConfig {
    fn default() -> Self {
        Self {
            http_url: "http://localhost:8545".to_string(),
            refresh_interval_ms: 12_000,
            fast_tip_multiplier: 2.0,
            mid_tip_multiplier: 1.2,
            safe_tip_multiplier: 0.8,
        }
    }
}

/// Three fee-tier plans maintained by a single refresh task and read
/// concurrently without locking (single-writer, multi-reader via atomics).
pub struct GasLadder {
    config: GasLadderConfig,
    base_fee_wei: AtomicU64,
    base_priority_fee_wei: AtomicU64,
}

impl GasLadder {
    pub fn new(config: GasLadderConfig) -> Self {
        Self {
            config,
            base_fee_wei: AtomicU64::new(1_000_000_000),
            base_priority_fee_wei: AtomicU64::new(1_000_000_000),
        }
    }

    /// Fetch fee history once and seed the ladder.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        self.refresh_once().await
    }

    async fn refresh_once(&self) -> Result<()> {
        let url = self.config.http_url.parse()?;
        let provider = ProviderBuilder::new().on_http(url);

        let fee_history = provider
            .get_fee_history(10, alloy::eips::BlockNumberOrTag::Latest, &[50.0])
            .await?;

        let base_fee = fee_history
            .base_fee_per_gas
            .last()
            .copied()
            .unwrap_or(1_000_000_000);
        let priority_fee: u64 = fee_history
            .reward
            .as_ref()
            .and_then(|r| r.last())
            .and_then(|rewards| rewards.first())
            .map(|r| *r as u64)
            .unwrap_or(1_000_000_000);

        self.base_fee_wei.store(base_fee, Ordering::SeqCst);
        self.base_priority_fee_wei
            .store(priority_fee.max(1), Ordering::SeqCst);
        Ok(())
    }

    /// Spawn the periodic refresh task; logs and retains the last good
    /// values on failure rather than aborting.
    pub fn spawn_refresh(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(self.config.refresh_interval_ms));
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh_once().await {
                    warn!(error = %e, "gas ladder refresh failed, keeping last plan");
                } else {
                    info!("gas ladder refreshed");
                }
            }
        });
    }

    fn tier_multiplier(&self, tier: GasTier) -> f64 {
        match tier {
            GasTier::Fast => self.config.fast_tip_multiplier,
            GasTier::Mid => self.config.mid_tip_multiplier,
            GasTier::Safe => self.config.safe_tip_multiplier,
        }
    }

    /// O(1) read of the requested tier's current plan.
    pub fn get_gas_plan(&self, tier: GasTier) -> GasPlan {
        let base_fee = self.base_fee_wei.load(Ordering::SeqCst) as f64;
        let base_priority = self.base_priority_fee_wei.load(Ordering::SeqCst) as f64;
        let multiplier = self.tier_multiplier(tier);

        let priority = (base_priority * multiplier).max(1.0) as u128;
        let max_fee = (base_fee * 2.0 + priority as f64) as u128;

        GasPlan {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_strictly_ordered() {
        let ladder = GasLadder::new(GasLadderConfig::default());
        let fast = ladder.get_gas_plan(GasTier::Fast);
        let mid = ladder.get_gas_plan(GasTier::Mid);
        let safe = ladder.get_gas_plan(GasTier::Safe);

        assert!(fast.tip() > mid.tip());
        assert!(mid.tip() > safe.tip());
    }

    #[test]
    fn plan_lookup_is_consistent_across_calls() {
        let ladder = GasLadder::new(GasLadderConfig::default());
        let a = ladder.get_gas_plan(GasTier::Fast);
        let b = ladder.get_gas_plan(GasTier::Fast);
        assert_eq!(a.max_priority_fee_per_gas, b.max_priority_fee_per_gas);
    }
}
