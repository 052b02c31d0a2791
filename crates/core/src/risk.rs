//! Daily P&L tracking and the ordered risk-gate ladder.
//!
//! Grounded on the former `liquidator.rs::execute_staged`'s ordered
//! profitability-gate style, generalized into a standalone rule evaluator
//! with `chrono`-based UTC date rollover.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct RiskManagerConfig {
    pub min_profit_after_gas_usd: f64,
    pub max_position_size_usd: f64,
    pub daily_loss_limit_usd: f64,
    pub blacklisted_tokens: HashSet<String>,
}

impl Default for RiskManagerConfig {
    fn default() -> Self {
        Self {
            min_profit_after_gas_usd: 5.0,
            max_position_size_usd: 1_000_000.0,
            daily_loss_limit_usd: 10_000.0,
            blacklisted_tokens: HashSet::new(),
        }
    }
}

/// A candidate opportunity as seen by the risk gate.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub collateral_symbol: String,
    pub debt_symbol: String,
    pub position_size_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Blacklisted,
    InsufficientProfit,
    PositionTooLarge,
    DailyLossLimitReached,
}

#[derive(Debug, Clone)]
pub struct RiskDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl RiskDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }
    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

struct DailyPnl {
    date: NaiveDate,
    cumulative_loss_usd: f64,
}

/// Daily P&L tracker plus the ordered blacklist/profit/size/loss gate.
pub struct RiskManager {
    config: RiskManagerConfig,
    daily: Mutex<DailyPnl>,
}

impl RiskManager {
    pub fn new(config: RiskManagerConfig) -> Self {
        Self {
            config,
            daily: Mutex::new(DailyPnl {
                date: Utc::now().date_naive(),
                cumulative_loss_usd: 0.0,
            }),
        }
    }

    fn roll_if_needed(&self, daily: &mut DailyPnl) {
        let today = Utc::now().date_naive();
        if today != daily.date {
            daily.date = today;
            daily.cumulative_loss_usd = 0.0;
        }
    }

    /// Record a realized loss (positive value) against today's budget.
    pub fn record_loss(&self, loss_usd: f64) {
        let mut daily = self.daily.lock();
        self.roll_if_needed(&mut daily);
        daily.cumulative_loss_usd += loss_usd.max(0.0);
    }

    pub fn cumulative_loss_today(&self) -> f64 {
        let mut daily = self.daily.lock();
        self.roll_if_needed(&mut daily);
        daily.cumulative_loss_usd
    }

    /// Evaluate gates in a fixed order: blacklist, min profit,
    /// position size, daily loss budget.
    pub fn can_execute(&self, opportunity: &Opportunity, after_gas_profit_usd: f64) -> RiskDecision {
        if self.config.blacklisted_tokens.contains(&opportunity.collateral_symbol)
            || self.config.blacklisted_tokens.contains(&opportunity.debt_symbol)
        {
            return RiskDecision::deny(DenyReason::Blacklisted);
        }

        if after_gas_profit_usd < self.config.min_profit_after_gas_usd {
            return RiskDecision::deny(DenyReason::InsufficientProfit);
        }

        if opportunity.position_size_usd > self.config.max_position_size_usd {
            return RiskDecision::deny(DenyReason::PositionTooLarge);
        }

        let mut daily = self.daily.lock();
        self.roll_if_needed(&mut daily);
        if daily.cumulative_loss_usd >= self.config.daily_loss_limit_usd {
            return RiskDecision::deny(DenyReason::DailyLossLimitReached);
        }

        RiskDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opp(coll: &str, debt: &str, size: f64) -> Opportunity {
        Opportunity {
            collateral_symbol: coll.to_string(),
            debt_symbol: debt.to_string(),
            position_size_usd: size,
        }
    }

    #[test]
    fn blacklist_is_checked_first() {
        let mut config = RiskManagerConfig::default();
        config.blacklisted_tokens.insert("SCAM".to_string());
        let risk = RiskManager::new(config);

        let decision = risk.can_execute(&opp("SCAM", "USDC", 100.0), 1000.0);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::Blacklisted));
    }

    #[test]
    fn rejects_insufficient_profit() {
        let risk = RiskManager::new(RiskManagerConfig::default());
        let decision = risk.can_execute(&opp("WETH", "USDC", 100.0), 1.0);
        assert_eq!(decision.reason, Some(DenyReason::InsufficientProfit));
    }

    #[test]
    fn rejects_oversized_positions() {
        let risk = RiskManager::new(RiskManagerConfig {
            max_position_size_usd: 500.0,
            ..Default::default()
        });
        let decision = risk.can_execute(&opp("WETH", "USDC", 1_000.0), 1000.0);
        assert_eq!(decision.reason, Some(DenyReason::PositionTooLarge));
    }

    #[test]
    fn daily_loss_limit_blocks_further_execution() {
        let risk = RiskManager::new(RiskManagerConfig {
            daily_loss_limit_usd: 100.0,
            ..Default::default()
        });
        risk.record_loss(150.0);
        let decision = risk.can_execute(&opp("WETH", "USDC", 10.0), 1000.0);
        assert_eq!(decision.reason, Some(DenyReason::DailyLossLimitReached));
    }

    #[test]
    fn allows_when_all_gates_pass() {
        let risk = RiskManager::new(RiskManagerConfig::default());
        let decision = risk.can_execute(&opp("WETH", "USDC", 100.0), 1000.0);
        assert!(decision.allowed);
    }
}
