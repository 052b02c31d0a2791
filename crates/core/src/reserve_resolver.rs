//! Assembles a [`crate::profit::UserRiskSnapshot`] for a single flagged
//! user immediately before profit evaluation.
//!
//! Grounded on `liquidator_chain::multicall::MicroVerifier`'s typed-RPC
//! read pattern, fanned out per reserve instead of per user: this only
//! runs once per execution attempt, after `ScanRegistry` admission has
//! already gated the hot path, so per-reserve sequential calls (rather
//! than a multicall batch) are an acceptable latency trade for the
//! simpler code.

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use liquidator_chain::contracts::aave_v3::IProtocolDataProvider;
use liquidator_chain::OracleMonitor;
use std::collections::HashMap;
use tracing::warn;

use crate::profit::{ReserveRisk, UserRiskSnapshot};

/// Static per-reserve metadata the resolver needs beyond what's on-chain:
/// which oracle feed prices this asset.
#[derive(Debug, Clone, Copy)]
pub struct ReserveMeta {
    pub asset: Address,
}

/// Reads per-reserve user figures and liquidation bonus for every
/// candidate reserve, skipping reserves the user doesn't touch. Missing
/// or errored reserve reads are dropped rather than aborting the whole
/// snapshot, so a partial picture still lets `ProfitEngine` pick the best
/// available pair.
pub async fn resolve_user_risk_snapshot<P: Provider + Clone>(
    user: Address,
    reserves: &[ReserveMeta],
    data_provider: Address,
    oracle: &OracleMonitor,
    provider: &P,
) -> UserRiskSnapshot {
    let contract = IProtocolDataProvider::new(data_provider, provider);

    let mut snapshot_reserves = Vec::with_capacity(reserves.len());
    let mut total_debt_raw_by_asset = HashMap::new();

    for meta in reserves {
        let user_data = match contract.getUserReserveData(meta.asset, user).call().await {
            Ok(d) => d,
            Err(err) => {
                warn!(asset = %meta.asset, %user, %err, "reserve resolver: getUserReserveData failed, skipping reserve");
                continue;
            }
        };

        let total_debt_raw = user_data.currentStableDebt + user_data.currentVariableDebt;
        if user_data.currentATokenBalance.is_zero() && total_debt_raw.is_zero() {
            continue;
        }

        let config_data = match contract.getReserveConfigurationData(meta.asset).call().await {
            Ok(d) => d,
            Err(err) => {
                warn!(asset = %meta.asset, %err, "reserve resolver: getReserveConfigurationData failed, skipping reserve");
                continue;
            }
        };

        let price = oracle.get_price_or_default(&meta.asset);
        let decimals = config_data.decimals.to::<u64>() as u8;
        // Aave encodes liquidationBonus as 10000+bonus (e.g. 10500 = 5%).
        let liquidation_bonus_bps = config_data
            .liquidationBonus
            .to::<u64>()
            .saturating_sub(10_000) as u16;

        total_debt_raw_by_asset.insert(meta.asset, total_debt_raw);

        snapshot_reserves.push(ReserveRisk {
            asset: meta.asset,
            collateral_value_base: token_value_base(
                user_data.currentATokenBalance,
                price.price,
                decimals,
            ),
            debt_value_base: token_value_base(total_debt_raw, price.price, decimals),
            uses_as_collateral: user_data.usageAsCollateralEnabled,
            price_base: price.price,
            decimals,
            liquidation_bonus_bps,
        });
    }

    UserRiskSnapshot {
        user,
        reserves: snapshot_reserves,
        total_debt_raw_by_asset,
    }
}

/// `amount_raw * price_base / 10^decimals`, kept in integer base-currency
/// units the way `getUserAccountData`'s totals already are.
fn token_value_base(amount_raw: U256, price_base: U256, decimals: u8) -> U256 {
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    if divisor.is_zero() {
        return U256::ZERO;
    }
    amount_raw.saturating_mul(price_base) / divisor
}
