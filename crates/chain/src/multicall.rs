//! Batched `getUserAccountData` reads via Multicall3, with per-block
//! throttling and de-dup.
//!
//! Grounded on [`crate::provider::ProviderManager`]'s typed `sol!` RPC
//! pattern and `get_positions_batch`'s bounded-concurrency fan-out,
//! applied to Aave's `getUserAccountData` behind Multicall3's
//! `aggregate3`. Per-block throttling mirrors `crate::oracle_monitor`'s
//! interval/staleness
//! bookkeeping style.

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{instrument, warn};

sol! {
    #[sol(rpc)]
    interface IPoolAccountData {
        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralBase,
            uint256 totalDebtBase,
            uint256 availableBorrowsBase,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );
    }

    struct Call3 {
        address target;
        bool allowFailure;
        bytes callData;
    }

    struct Result3 {
        bool success;
        bytes returnData;
    }

    #[sol(rpc)]
    interface IMulticall3 {
        function aggregate3(Call3[] calldata calls) external payable returns (Result3[] memory returnData);
    }
}

/// The trigger category that caused a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    ProjectionCross,
    NearThreshold,
    ReserveFast,
    HeadCritical,
    Sprinter,
    IndexJump,
    PriceShock,
    LiquidationRefresh,
}

/// Result of a single `getUserAccountData` read.
#[derive(Debug, Clone)]
pub struct UserAccountData {
    pub user: Address,
    pub hf: f64,
    pub total_collateral_base: U256,
    pub total_debt_base: U256,
    pub liquidation_threshold_bps: u16,
    pub ltv_bps: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum MicroVerifyError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("multicall entry reverted for user {0}")]
    Reverted(Address),
    #[error("decode error: {0}")]
    Decode(String),
}

fn decode_account_data(user: Address, data: &Bytes) -> Result<UserAccountData, MicroVerifyError> {
    let decoded = IPoolAccountData::getUserAccountDataCall::abi_decode_returns(data, true)
        .map_err(|e| MicroVerifyError::Decode(e.to_string()))?;

    // healthFactor is WAD-scaled; u128::MAX sentinel signals "no debt".
    let hf = if decoded.totalDebtBase.is_zero() {
        f64::INFINITY
    } else {
        let wad = U256::from(10u64).pow(U256::from(18));
        let scaled = decoded.healthFactor.saturating_mul(U256::from(1_000_000u64)) / wad;
        scaled.to::<u128>() as f64 / 1_000_000.0
    };

    Ok(UserAccountData {
        user,
        hf,
        total_collateral_base: decoded.totalCollateralBase,
        total_debt_base: decoded.totalDebtBase,
        liquidation_threshold_bps: decoded.currentLiquidationThreshold.to::<u64>() as u16,
        ltv_bps: decoded.ltv.to::<u64>() as u16,
    })
}

#[derive(Debug, Clone)]
pub struct MicroVerifierConfig {
    pub max_per_block: usize,
    pub min_interval_ms: u64,
}

impl Default for MicroVerifierConfig {
    fn default() -> Self {
        Self {
            max_per_block: 200,
            min_interval_ms: 20,
        }
    }
}

/// Batched single/multi-user HF verifier.
pub struct MicroVerifier {
    http_url: String,
    pool_address: Address,
    multicall_address: Address,
    config: MicroVerifierConfig,
    last_call_at: Mutex<Instant>,
    calls_this_block: AtomicU64,
    current_block: AtomicU64,
    seen_this_block: DashSet<Address>,
    error_count: AtomicU64,
}

impl MicroVerifier {
    pub fn new(
        http_url: impl Into<String>,
        pool_address: Address,
        multicall_address: Address,
        config: MicroVerifierConfig,
    ) -> Self {
        Self {
            http_url: http_url.into(),
            pool_address,
            multicall_address,
            config,
            last_call_at: Mutex::new(Instant::now() - Duration::from_secs(1)),
            calls_this_block: AtomicU64::new(0),
            current_block: AtomicU64::new(0),
            seen_this_block: DashSet::new(),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Reset the per-block cap and dedup set when a new block arrives.
    pub fn roll_block(&self, block: u64) {
        if self.current_block.swap(block, Ordering::SeqCst) != block {
            self.calls_this_block.store(0, Ordering::SeqCst);
            self.seen_this_block.clear();
        }
    }

    async fn throttle(&self) {
        let mut last = self.last_call_at.lock().await;
        let elapsed = last.elapsed();
        let min = Duration::from_millis(self.config.min_interval_ms);
        if elapsed < min {
            tokio::time::sleep(min - elapsed).await;
        }
        *last = Instant::now();
    }

    /// Verify a single user at `block_tag`. Errors do not consume the
    /// per-block cap but increment the error counter.
    #[instrument(skip(self), fields(user = %user, block_tag))]
    pub async fn verify_one(
        &self,
        user: Address,
        block_tag: u64,
        _trigger: TriggerKind,
    ) -> Result<UserAccountData, MicroVerifyError> {
        if self.calls_this_block.load(Ordering::SeqCst) as usize >= self.config.max_per_block {
            return Err(MicroVerifyError::Rpc("per-block cap exceeded".into()));
        }
        if !self.seen_this_block.insert(user) {
            return Err(MicroVerifyError::Rpc("user already verified this block".into()));
        }

        self.throttle().await;

        let url = self
            .http_url
            .parse()
            .map_err(|_| MicroVerifyError::Rpc("invalid rpc url".to_string()))?;
        let provider = ProviderBuilder::new().on_http(url);

        let call = IPoolAccountData::getUserAccountDataCall { user };
        let calldata = call.abi_encode();

        let tx = alloy::rpc::types::TransactionRequest::default()
            .to(self.pool_address)
            .input(Bytes::from(calldata).into());

        let result = provider
            .call(&tx)
            .block(alloy::eips::BlockId::number(block_tag))
            .await
            .map_err(|e| {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                MicroVerifyError::Rpc(e.to_string())
            })?;

        self.calls_this_block.fetch_add(1, Ordering::SeqCst);
        decode_account_data(user, &result)
    }

    /// Batch verification via Multicall3's `aggregate3`, serialized
    /// against the same throttle as `verify_one`. Per-entry failures are
    /// reported individually rather than failing the whole batch.
    pub async fn verify_batch(
        &self,
        users: &[Address],
        block_tag: u64,
    ) -> Vec<Result<UserAccountData, MicroVerifyError>> {
        if users.is_empty() {
            return Vec::new();
        }

        self.throttle().await;

        let url: Result<_, MicroVerifyError> = self
            .http_url
            .parse()
            .map_err(|_| MicroVerifyError::Rpc("invalid rpc url".to_string()));
        let url = match url {
            Ok(u) => u,
            Err(e) => return users.iter().map(|_| Err(err_clone(&e))).collect(),
        };
        let provider = ProviderBuilder::new().on_http(url);

        let calls: Vec<Call3> = users
            .iter()
            .map(|u| Call3 {
                target: self.pool_address,
                allowFailure: true,
                callData: Bytes::from(IPoolAccountData::getUserAccountDataCall { user: *u }.abi_encode()),
            })
            .collect();

        let aggregate = IMulticall3::aggregate3Call { calls };
        let tx = alloy::rpc::types::TransactionRequest::default()
            .to(self.multicall_address)
            .input(Bytes::from(aggregate.abi_encode()).into());

        let raw = match provider
            .call(&tx)
            .block(alloy::eips::BlockId::number(block_tag))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                let err = MicroVerifyError::Rpc(e.to_string());
                return users.iter().map(|_| Err(err_clone(&err))).collect();
            }
        };

        let decoded = match IMulticall3::aggregate3Call::abi_decode_returns(&raw, true) {
            Ok(d) => d,
            Err(e) => {
                let err = MicroVerifyError::Decode(e.to_string());
                return users.iter().map(|_| Err(err_clone(&err))).collect();
            }
        };

        self.calls_this_block
            .fetch_add(users.len() as u64, Ordering::SeqCst);

        users
            .iter()
            .zip(decoded.returnData.iter())
            .map(|(user, result)| {
                if !result.success {
                    warn!(%user, "multicall entry reverted");
                    Err(MicroVerifyError::Reverted(*user))
                } else {
                    decode_account_data(*user, &result.returnData)
                }
            })
            .collect()
    }
}

fn err_clone(e: &MicroVerifyError) -> MicroVerifyError {
    match e {
        MicroVerifyError::Rpc(s) => MicroVerifyError::Rpc(s.clone()),
        MicroVerifyError::Decode(s) => MicroVerifyError::Decode(s.clone()),
        MicroVerifyError::Reverted(a) => MicroVerifyError::Reverted(*a),
    }
}

/// Handle shared between the scheduler and whoever constructs it.
pub type SharedMicroVerifier = Arc<MicroVerifier>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_kind_is_a_plain_tag() {
        // sprinter/head_critical/near_threshold carry no
        // distinguishing promotion logic, only caller-chosen tags.
        assert_ne!(TriggerKind::Sprinter, TriggerKind::HeadCritical);
        assert_ne!(TriggerKind::HeadCritical, TriggerKind::NearThreshold);
    }

    #[test]
    fn roll_block_resets_dedup_state() {
        let verifier = MicroVerifier::new(
            "http://localhost:8545",
            Address::ZERO,
            Address::ZERO,
            MicroVerifierConfig::default(),
        );
        verifier.seen_this_block.insert(Address::repeat_byte(1));
        verifier.calls_this_block.store(5, Ordering::SeqCst);
        verifier.roll_block(100);
        assert_eq!(verifier.calls_this_block.load(Ordering::SeqCst), 0);
        assert!(verifier.seen_this_block.is_empty());
    }
}
