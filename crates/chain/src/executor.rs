//! Liquidation submission driver: calldata templating plus
//! public/private/shadow submission with retry/fallback.
//!
//! Grounded on `signer::TransactionSender`'s cached-nonce/cached-gas-price
//! fast path, generalized from a single public-broadcast sender to
//! public/private/shadow submission modes, with calldata caching
//! keyed the way `contracts::LiquidatorContract`'s `calldata_cache`
//! caches a single pre-staged payload. Retry classification reuses
//! `liquidator_api::relay::RelayFailureKind` since both surfaces need the
//! same RPC_ERROR/TIMEOUT/DISABLED/UNKNOWN split.

use alloy::consensus::TxEnvelope;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use liquidator_api::{RelayClient, RelayError, RelayFailureKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::contracts::aave_v3::IPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    Public,
    Private,
    Shadow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    Direct,
    Race,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub rpc_url: String,
    pub pool_address: Address,
    pub chain_id: u64,
    pub submission_mode: SubmissionMode,
    pub fallback_mode: FallbackMode,
    pub max_retries: u32,
    pub refresh_index_bps: i64,
    pub gas_limit: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            pool_address: Address::ZERO,
            chain_id: 1,
            submission_mode: SubmissionMode::Shadow,
            fallback_mode: FallbackMode::Direct,
            max_retries: 2,
            refresh_index_bps: 5,
            gas_limit: 600_000,
        }
    }
}

/// Outcome of one submission attempt.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub sent_private: bool,
    pub tx_hash: Option<TxHash>,
    pub error_code: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CalldataKey {
    user: Address,
    debt_asset: Address,
    collateral_asset: Address,
}

#[derive(Debug, Clone)]
struct CalldataEntry {
    calldata: Bytes,
    cached_at_index: U256,
}

fn pct_diff_bps(old: U256, new: U256) -> i64 {
    if old.is_zero() {
        return i64::MAX;
    }
    let diff = if new >= old { new - old } else { old - new };
    let bps = (diff * U256::from(10_000u64)) / old;
    let bps = bps.to::<u64>() as i64;
    if new < old {
        -bps
    } else {
        bps
    }
}

/// Caches encoded `liquidationCall` calldata keyed by (user, debtAsset,
/// collateralAsset), refreshed once the reserve's debt index has moved
/// by more than `refresh_index_bps` since the cached template was built.
struct CalldataTemplateCache {
    entries: DashMap<CalldataKey, CalldataEntry>,
}

impl CalldataTemplateCache {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn get_or_build(
        &self,
        key: CalldataKey,
        current_index: U256,
        refresh_bps: i64,
        debt_to_cover: U256,
    ) -> Bytes {
        if let Some(entry) = self.entries.get(&key) {
            if pct_diff_bps(entry.cached_at_index, current_index).abs() < refresh_bps {
                return entry.calldata.clone();
            }
        }

        let call = IPool::liquidationCallCall {
            collateralAsset: key.collateral_asset,
            debtAsset: key.debt_asset,
            user: key.user,
            debtToCover: debt_to_cover,
            receiveAToken: false,
        };
        let calldata = Bytes::from(call.abi_encode());

        self.entries.insert(
            key,
            CalldataEntry {
                calldata: calldata.clone(),
                cached_at_index: current_index,
            },
        );
        calldata
    }
}

/// Drives liquidation submission across the three modes.
pub struct LiquidationExecutor {
    config: ExecutorConfig,
    wallet: EthereumWallet,
    signer_address: Address,
    relay: Option<RelayClient>,
    nonce: AtomicU64,
    templates: CalldataTemplateCache,
}

impl LiquidationExecutor {
    pub fn new(
        config: ExecutorConfig,
        wallet: EthereumWallet,
        signer_address: Address,
        relay: Option<RelayClient>,
        initial_nonce: u64,
    ) -> Self {
        Self {
            config,
            wallet,
            signer_address,
            relay,
            nonce: AtomicU64::new(initial_nonce),
            templates: CalldataTemplateCache::new(),
        }
    }

    fn build_calldata(
        &self,
        user: Address,
        debt_asset: Address,
        collateral_asset: Address,
        debt_to_cover: U256,
        current_debt_index: U256,
    ) -> Bytes {
        let key = CalldataKey {
            user,
            debt_asset,
            collateral_asset,
        };
        self.templates.get_or_build(
            key,
            current_debt_index,
            self.config.refresh_index_bps,
            debt_to_cover,
        )
    }

    async fn sign_raw_tx(&self, calldata: Bytes) -> anyhow::Result<(TxEnvelope, Bytes)> {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let tx = TransactionRequest::default()
            .with_from(self.signer_address)
            .with_to(self.config.pool_address)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_gas_limit(self.config.gas_limit)
            .with_chain_id(self.config.chain_id);

        let envelope: TxEnvelope = tx.build(&self.wallet).await?;
        let raw = alloy::eips::eip2718::Encodable2718::encoded_2718(&envelope);
        Ok((envelope, Bytes::from(raw)))
    }

    /// Submit a direct `liquidationCall` via the public mempool.
    async fn submit_public(&self, calldata: Bytes) -> ExecutionOutcome {
        let start = Instant::now();
        let provider = match self.config.rpc_url.parse() {
            Ok(url) => ProviderBuilder::new().wallet(self.wallet.clone()).on_http(url),
            Err(_) => {
                return ExecutionOutcome {
                    success: false,
                    sent_private: false,
                    tx_hash: None,
                    error_code: Some("RPC_ERROR".to_string()),
                    latency_ms: start.elapsed().as_millis() as u64,
                }
            }
        };

        let tx = TransactionRequest::default()
            .with_to(self.config.pool_address)
            .with_input(calldata)
            .with_gas_limit(self.config.gas_limit)
            .with_chain_id(self.config.chain_id);

        match provider.send_transaction(tx).await {
            Ok(pending) => ExecutionOutcome {
                success: true,
                sent_private: false,
                tx_hash: Some(*pending.tx_hash()),
                error_code: None,
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => {
                warn!(error = %e, "public submission failed");
                ExecutionOutcome {
                    success: false,
                    sent_private: false,
                    tx_hash: None,
                    error_code: Some("RPC_ERROR".to_string()),
                    latency_ms: start.elapsed().as_millis() as u64,
                }
            }
        }
    }

    /// Submit via the private relay, retrying up to `max_retries` times,
    /// then applying `fallback_mode` on exhaustion.
    async fn submit_private(&self, calldata: Bytes) -> ExecutionOutcome {
        let start = Instant::now();
        let relay = match &self.relay {
            Some(r) => r,
            None => {
                return ExecutionOutcome {
                    success: false,
                    sent_private: false,
                    tx_hash: None,
                    error_code: Some("DISABLED".to_string()),
                    latency_ms: start.elapsed().as_millis() as u64,
                }
            }
        };

        let (_, raw_tx) = match self.sign_raw_tx(calldata.clone()).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "failed to sign private submission");
                return ExecutionOutcome {
                    success: false,
                    sent_private: false,
                    tx_hash: None,
                    error_code: Some("UNKNOWN".to_string()),
                    latency_ms: start.elapsed().as_millis() as u64,
                };
            }
        };

        let timeout = Duration::from_secs(5);
        let mut last_err: Option<RelayError> = None;

        for attempt in 0..=self.config.max_retries {
            let attempt_start = Instant::now();
            match relay.submit_private(&raw_tx, "unsigned").await {
                Ok(outcome) => {
                    return ExecutionOutcome {
                        success: outcome.success,
                        sent_private: true,
                        tx_hash: outcome.tx_hash,
                        error_code: None,
                        latency_ms: start.elapsed().as_millis() as u64,
                    };
                }
                Err(e) => {
                    let kind = RelayFailureKind::classify(&e, attempt_start.elapsed(), timeout);
                    warn!(attempt, ?kind, error = %e, "private relay attempt failed");
                    last_err = Some(e);
                }
            }
        }

        let _ = last_err;

        match self.config.fallback_mode {
            FallbackMode::Direct => {
                info!("private relay exhausted, falling back to public");
                self.submit_public(calldata).await
            }
            FallbackMode::Race => {
                info!("private relay exhausted, racing public submission against one more relay attempt");
                let (public_outcome, relay_outcome) = tokio::join!(
                    self.submit_public(calldata.clone()),
                    self.race_relay_attempt(&raw_tx, timeout)
                );
                match (public_outcome, relay_outcome) {
                    (public, Some(relay)) if relay.success && !public.success => relay,
                    (public, _) => public,
                }
            }
        }
    }

    /// One extra private-relay attempt raced against the public fallback
    /// in `FallbackMode::Race`. Returns `None` if relay isn't configured.
    async fn race_relay_attempt(
        &self,
        raw_tx: &Bytes,
        timeout: Duration,
    ) -> Option<ExecutionOutcome> {
        let relay = self.relay.as_ref()?;
        let start = Instant::now();
        match relay.submit_private(raw_tx, "unsigned").await {
            Ok(outcome) => Some(ExecutionOutcome {
                success: outcome.success,
                sent_private: true,
                tx_hash: outcome.tx_hash,
                error_code: None,
                latency_ms: start.elapsed().as_millis() as u64,
            }),
            Err(e) => {
                let kind = RelayFailureKind::classify(&e, start.elapsed(), timeout);
                warn!(?kind, error = %e, "raced relay attempt failed");
                None
            }
        }
    }

    /// Submit a liquidation according to the configured mode.
    #[instrument(skip(self), fields(user = %user, mode = ?self.config.submission_mode))]
    pub async fn submit(
        &self,
        user: Address,
        debt_asset: Address,
        collateral_asset: Address,
        debt_to_cover: U256,
        current_debt_index: U256,
    ) -> ExecutionOutcome {
        let calldata = self.build_calldata(
            user,
            debt_asset,
            collateral_asset,
            debt_to_cover,
            current_debt_index,
        );

        match self.config.submission_mode {
            SubmissionMode::Shadow => {
                info!(user = %user, calldata_len = calldata.len(), "shadow mode, not submitting");
                ExecutionOutcome {
                    success: false,
                    sent_private: false,
                    tx_hash: None,
                    error_code: Some("DISABLED".to_string()),
                    latency_ms: 0,
                }
            }
            SubmissionMode::Public => self.submit_public(calldata).await,
            SubmissionMode::Private => self.submit_private(calldata).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pct_diff_bps_detects_large_index_move() {
        let old = U256::from(1_000_000_000_000_000_000u128);
        let new = old + old / U256::from(100u64);
        assert!(pct_diff_bps(old, new) >= 99 && pct_diff_bps(old, new) <= 101);
    }

    #[test]
    fn calldata_cache_rebuilds_past_refresh_threshold() {
        let cache = CalldataTemplateCache::new();
        let key = CalldataKey {
            user: Address::repeat_byte(1),
            debt_asset: Address::repeat_byte(2),
            collateral_asset: Address::repeat_byte(3),
        };
        let old_index = U256::from(1_000_000_000_000_000_000u128);
        let first = cache.get_or_build(key, old_index, 5, U256::from(1_000u64));

        let unchanged = cache.get_or_build(key, old_index, 5, U256::from(1_000u64));
        assert_eq!(first, unchanged);

        let moved_index = old_index + old_index / U256::from(10u64);
        let second = cache.get_or_build(key, moved_index, 5, U256::from(2_000u64));
        assert_ne!(first, second);
    }
}
