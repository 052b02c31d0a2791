//! Net liquidation profit computation.
//!
//! Generalizes the former `liquidator.rs::estimate_profit`'s USD-value
//! shortcut into an explicit repay/seize unit-conversion formula: repay
//! is computed in debt-asset units, seize in collateral-asset units
//! via the liquidation bonus and both assets' oracle prices, and only then
//! converted to USD for the profitability gate.

use alloy::primitives::{Address, U256};

/// Per-reserve risk inputs for a single user, one entry per reserve the
/// user touches as either collateral or debt (or both).
#[derive(Debug, Clone)]
pub struct ReserveRisk {
    pub asset: Address,
    pub collateral_value_base: U256,
    pub debt_value_base: U256,
    pub uses_as_collateral: bool,
    pub price_base: U256,
    pub decimals: u8,
    pub liquidation_bonus_bps: u16,
}

#[derive(Debug, Clone)]
pub struct UserRiskSnapshot {
    pub user: Address,
    pub reserves: Vec<ReserveRisk>,
    pub total_debt_raw_by_asset: std::collections::HashMap<Address, U256>,
}

#[derive(Debug, Clone)]
pub struct ProfitEngineConfig {
    pub close_factor_bps: u32,
    pub max_slippage_bps: u32,
    pub gas_cost_usd: f64,
    pub min_profit_usd: f64,
}

impl Default for ProfitEngineConfig {
    fn default() -> Self {
        Self {
            close_factor_bps: 5000,
            max_slippage_bps: 50,
            gas_cost_usd: 2.0,
            min_profit_usd: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfitResult {
    pub profitable: bool,
    pub net_profit_usd: f64,
    pub gross_profit_usd: f64,
    pub debt_asset: Option<Address>,
    pub collateral_asset: Option<Address>,
    pub repay_amount: U256,
    pub seize_amount: U256,
    /// USD value of the debt being repaid, i.e. the position size being
    /// liquidated (`repayAmount` priced in the debt asset). Used both as
    /// the risk manager's position-size gate input and as the decision
    /// trace's debt estimate.
    pub repay_value_usd: f64,
    pub skip_reason: Option<String>,
}

impl ProfitResult {
    fn unprofitable(reason: impl Into<String>) -> Self {
        Self {
            profitable: false,
            net_profit_usd: 0.0,
            gross_profit_usd: 0.0,
            debt_asset: None,
            collateral_asset: None,
            repay_amount: U256::ZERO,
            seize_amount: U256::ZERO,
            repay_value_usd: 0.0,
            skip_reason: Some(reason.into()),
        }
    }
}

fn usd_value(amount_base: U256, decimals_adjust: f64) -> f64 {
    // `*_value_base` is already expressed in the protocol's oracle base
    // currency (8-decimal USD for Aave); scale to a float at this, the
    // only float-conversion boundary in this module.
    let raw = amount_base.to::<u128>() as f64;
    raw / 1e8 * decimals_adjust
}

pub struct ProfitEngine {
    config: ProfitEngineConfig,
}

impl ProfitEngine {
    pub fn new(config: ProfitEngineConfig) -> Self {
        Self { config }
    }

    /// Pick the highest-value debt and collateral
    /// reserves, compute repay/seize amounts, then gross/net profit.
    pub fn evaluate(&self, snapshot: &UserRiskSnapshot) -> ProfitResult {
        let debt_reserve = snapshot
            .reserves
            .iter()
            .filter(|r| !r.debt_value_base.is_zero())
            .max_by_key(|r| r.debt_value_base);

        let collateral_reserve = snapshot
            .reserves
            .iter()
            .filter(|r| r.uses_as_collateral && !r.collateral_value_base.is_zero())
            .max_by_key(|r| r.collateral_value_base);

        let (debt_reserve, collateral_reserve) = match (debt_reserve, collateral_reserve) {
            (Some(d), Some(c)) => (d, c),
            _ => return ProfitResult::unprofitable("no eligible debt/collateral reserve pair"),
        };

        let total_debt_raw = snapshot
            .total_debt_raw_by_asset
            .get(&debt_reserve.asset)
            .copied()
            .unwrap_or(U256::ZERO);

        if total_debt_raw.is_zero() {
            return ProfitResult::unprofitable("no raw debt amount available");
        }

        let repay_amount = total_debt_raw * U256::from(self.config.close_factor_bps) / U256::from(10_000u32);

        // seize = repay * (10000+bonus) * debtPrice * 10^collDec / (10000 * collPrice * 10^debtDec)
        let bonus_factor = U256::from(10_000u32 + collateral_reserve.liquidation_bonus_bps as u32);
        let numerator = repay_amount
            .saturating_mul(bonus_factor)
            .saturating_mul(debt_reserve.price_base)
            .saturating_mul(pow10(collateral_reserve.decimals));
        let denominator = U256::from(10_000u32)
            .saturating_mul(collateral_reserve.price_base)
            .saturating_mul(pow10(debt_reserve.decimals));

        if denominator.is_zero() {
            return ProfitResult::unprofitable("zero-price collateral reserve");
        }

        let seize_amount = numerator / denominator;

        let repay_value_usd = usd_value(
            repay_amount.saturating_mul(debt_reserve.price_base) / pow10(debt_reserve.decimals),
            1.0,
        );
        let seize_value_usd = usd_value(
            seize_amount.saturating_mul(collateral_reserve.price_base) / pow10(collateral_reserve.decimals),
            1.0,
        );

        let gross_profit_usd = seize_value_usd - repay_value_usd;
        let slippage_usd = seize_value_usd * self.config.max_slippage_bps as f64 / 10_000.0;
        let net_profit_usd = gross_profit_usd - slippage_usd - self.config.gas_cost_usd;

        let profitable = net_profit_usd >= self.config.min_profit_usd;

        ProfitResult {
            profitable,
            net_profit_usd,
            gross_profit_usd,
            debt_asset: Some(debt_reserve.asset),
            collateral_asset: Some(collateral_reserve.asset),
            repay_amount,
            seize_amount,
            repay_value_usd,
            skip_reason: if profitable {
                None
            } else {
                Some("net profit below threshold".to_string())
            },
        }
    }
}

fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn reserve(asset: Address, collateral: u64, debt: u64, collateral_flag: bool, price: u64, dec: u8, bonus: u16) -> ReserveRisk {
        ReserveRisk {
            asset,
            collateral_value_base: U256::from(collateral),
            debt_value_base: U256::from(debt),
            uses_as_collateral: collateral_flag,
            price_base: U256::from(price),
            decimals: dec,
            liquidation_bonus_bps: bonus,
        }
    }

    #[test]
    fn unprofitable_when_no_collateral_reserve() {
        let engine = ProfitEngine::new(ProfitEngineConfig::default());
        let snapshot = UserRiskSnapshot {
            user: Address::ZERO,
            reserves: vec![reserve(Address::repeat_byte(1), 0, 1000, false, 1_00000000, 18, 500)],
            total_debt_raw_by_asset: HashMap::new(),
        };
        let result = engine.evaluate(&snapshot);
        assert!(!result.profitable);
        assert!(result.skip_reason.is_some());
    }

    #[test]
    fn picks_highest_value_reserves_and_computes_seize() {
        let engine = ProfitEngine::new(ProfitEngineConfig {
            close_factor_bps: 5000,
            max_slippage_bps: 0,
            gas_cost_usd: 0.0,
            min_profit_usd: 0.0,
        });

        let debt_asset = Address::repeat_byte(1);
        let coll_asset = Address::repeat_byte(2);

        let mut debt_map = HashMap::new();
        debt_map.insert(debt_asset, U256::from(1_000_000_000_000_000_000u64)); // 1.0 token, 18 dec

        let snapshot = UserRiskSnapshot {
            user: Address::ZERO,
            reserves: vec![
                reserve(debt_asset, 0, 1_00000000, false, 1_00000000, 18, 0),
                reserve(coll_asset, 2_00000000, 0, true, 1_00000000, 18, 500),
            ],
            total_debt_raw_by_asset: debt_map,
        };

        let result = engine.evaluate(&snapshot);
        assert!(result.seize_amount > U256::ZERO);
        assert_eq!(result.debt_asset, Some(debt_asset));
        assert_eq!(result.collateral_asset, Some(coll_asset));
        // bonus=5% on a 0.5 token repay at equal price => seize ~0.525 tokens
        assert!(result.profitable);
    }
}
