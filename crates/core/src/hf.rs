//! Per-snapshot health-factor math and price-shock projection.
//!
//! Pure functions over a plain `UserSnapshot`, independent of any tiering
//! or caching concern — those live in [`crate::candidate`].

use alloy::primitives::Address;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Per-reserve contribution to a user's risk snapshot.
#[derive(Debug, Clone)]
pub struct ReserveSnapshot {
    pub asset: Address,
    pub collateral_usd: f64,
    pub debt_usd: f64,
    /// Liquidation threshold in basis points (e.g. 8000 = 80%).
    pub liquidation_threshold_bps: u16,
    /// Whether this reserve counts toward HF as collateral.
    pub usable_as_collateral: bool,
}

impl ReserveSnapshot {
    fn lt_decimal(&self) -> f64 {
        self.liquidation_threshold_bps as f64 / 10_000.0
    }

    fn risk_adjusted_collateral(&self) -> f64 {
        if self.usable_as_collateral {
            self.collateral_usd * self.lt_decimal()
        } else {
            0.0
        }
    }
}

/// A user's full risk snapshot: one entry per reserve touched.
#[derive(Debug, Clone, Default)]
pub struct UserSnapshot {
    pub user: Address,
    pub reserves: SmallVec<[ReserveSnapshot; 8]>,
}

impl UserSnapshot {
    pub fn total_collateral_usd(&self) -> f64 {
        self.reserves.iter().map(|r| r.collateral_usd).sum()
    }

    pub fn total_debt_usd(&self) -> f64 {
        self.reserves.iter().map(|r| r.debt_usd).sum()
    }
}

/// HF = Σ(collateral·LT) / Σ(debt). Returns `f64::INFINITY` when debt is zero.
pub fn calculate_hf(snapshot: &UserSnapshot) -> f64 {
    let total_debt: f64 = snapshot.reserves.iter().map(|r| r.debt_usd).sum();
    if total_debt <= 0.0 {
        return f64::INFINITY;
    }

    let adjusted_collateral: f64 = snapshot
        .reserves
        .iter()
        .map(|r| r.risk_adjusted_collateral())
        .sum();

    adjusted_collateral / total_debt
}

/// Project HF under a hypothetical set of per-asset price multipliers
/// (e.g. `0.9` for a 10% price drop). A multiplier applies to both the
/// collateral and debt value of that reserve; the liquidation threshold is
/// unchanged. Assets absent from the map keep their current price.
pub fn project_hf(snapshot: &UserSnapshot, price_multipliers: &HashMap<Address, f64>) -> f64 {
    let mut total_debt = 0.0;
    let mut adjusted_collateral = 0.0;

    for reserve in &snapshot.reserves {
        let multiplier = price_multipliers.get(&reserve.asset).copied().unwrap_or(1.0);

        total_debt += reserve.debt_usd * multiplier;
        if reserve.usable_as_collateral {
            adjusted_collateral += reserve.collateral_usd * multiplier * reserve.lt_decimal();
        }
    }

    if total_debt <= 0.0 {
        return f64::INFINITY;
    }

    adjusted_collateral / total_debt
}

/// Batch HF computation over multiple users.
pub fn calculate_hf_batch(snapshots: &[UserSnapshot]) -> HashMap<Address, f64> {
    snapshots
        .iter()
        .map(|s| (s.user, calculate_hf(s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_reserve_snapshot(collateral_usd: f64, debt_usd: f64, lt_bps: u16) -> UserSnapshot {
        let mut reserves = SmallVec::new();
        reserves.push(ReserveSnapshot {
            asset: Address::ZERO,
            collateral_usd,
            debt_usd,
            liquidation_threshold_bps: lt_bps,
            usable_as_collateral: true,
        });
        UserSnapshot {
            user: Address::ZERO,
            reserves,
        }
    }

    #[test]
    fn hf_matches_known_value() {
        let snapshot = single_reserve_snapshot(1000.0, 500.0, 8000);
        // (1000 * 0.80) / 500 = 1.6
        assert!((calculate_hf(&snapshot) - 1.6).abs() < 1e-9);
    }

    #[test]
    fn zero_debt_is_infinite() {
        let snapshot = single_reserve_snapshot(1000.0, 0.0, 8000);
        assert_eq!(calculate_hf(&snapshot), f64::INFINITY);
    }

    #[test]
    fn project_hf_applies_multiplier_to_collateral_and_debt() {
        let collateral_asset = Address::repeat_byte(1);
        let debt_asset = Address::repeat_byte(2);
        let mut reserves = SmallVec::new();
        reserves.push(ReserveSnapshot {
            asset: collateral_asset,
            collateral_usd: 1000.0,
            debt_usd: 0.0,
            liquidation_threshold_bps: 8000,
            usable_as_collateral: true,
        });
        reserves.push(ReserveSnapshot {
            asset: debt_asset,
            collateral_usd: 0.0,
            debt_usd: 500.0,
            liquidation_threshold_bps: 0,
            usable_as_collateral: false,
        });
        let snapshot = UserSnapshot {
            user: Address::ZERO,
            reserves,
        };

        assert!((calculate_hf(&snapshot) - 1.6).abs() < 1e-9);

        let mut multipliers = HashMap::new();
        multipliers.insert(collateral_asset, 0.9); // 10% collateral drop
        let projected = project_hf(&snapshot, &multipliers);
        // (1000*0.9*0.80) / 500 = 1.44
        assert!((projected - 1.44).abs() < 1e-9);
    }

    #[test]
    fn batch_computes_all_users() {
        let mut a = single_reserve_snapshot(1000.0, 500.0, 8000);
        a.user = Address::repeat_byte(1);
        let mut b = single_reserve_snapshot(200.0, 1000.0, 8000);
        b.user = Address::repeat_byte(2);

        let result = calculate_hf_batch(&[a, b]);
        assert_eq!(result.len(), 2);
        assert!((result[&Address::repeat_byte(1)] - 1.6).abs() < 1e-9);
    }
}
