//! Runtime engine configuration: one sub-struct per component group,
//! each carrying the stated default for every field. Parses env vars
//! with plain `std::env::var` reads and typed fallbacks rather than a
//! generic env deserializer, since no such crate is in the dependency
//! tree.

use alloy::primitives::Address;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::candidate::{CandidateSetConfig, HotlistConfig, HotlistWeights};
use crate::priority_sweep::{PrioritySweepConfig, SweepWeights};
use crate::profit::ProfitEngineConfig;
use crate::reserve_index::DEFAULT_MIN_INDEX_DELTA_BPS;
use crate::risk::RiskManagerConfig;

fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_str(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_str(name).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

/// Detection thresholds.
#[derive(Debug, Clone, Copy)]
pub struct DetectionConfig {
    pub execution_hf_threshold_bps: u32,
    pub near_hf: f64,
    pub evict_hf: f64,
    pub evict_consecutive: u32,
    pub hf_pred_critical: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            execution_hf_threshold_bps: 9800,
            near_hf: 1.03,
            evict_hf: 1.20,
            evict_consecutive: 3,
            hf_pred_critical: 1.00,
        }
    }
}

impl DetectionConfig {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            execution_hf_threshold_bps: env_parse(
                "EXECUTION_HF_THRESHOLD_BPS",
                d.execution_hf_threshold_bps,
            ),
            near_hf: env_parse("NEAR_HF", d.near_hf),
            evict_hf: env_parse("EVICT_HF", d.evict_hf),
            evict_consecutive: env_parse("EVICT_CONSECUTIVE", d.evict_consecutive),
            hf_pred_critical: env_parse("HF_PRED_CRITICAL", d.hf_pred_critical),
        }
    }

    pub fn candidate_set_config(&self, max_accounts_per_block: usize) -> CandidateSetConfig {
        CandidateSetConfig {
            evict_hf: self.evict_hf,
            evict_consecutive: self.evict_consecutive as u32,
            near_hf: self.near_hf,
            max_accounts_per_block,
        }
    }
}

/// Priority sweep and hotlist sizing.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub target_size: usize,
    pub max_scan_users: usize,
    pub interval_min: u64,
    pub page_size: u32,
    pub inter_request_ms: u64,
    pub timeout_ms: u64,
    pub weights: SweepWeights,
    pub hotlist_max_hf: f64,
    pub min_debt_usd: f64,
    pub min_collateral_usd: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        let defaults = PrioritySweepConfig::default();
        Self {
            target_size: defaults.target_size,
            max_scan_users: defaults.max_scan_users,
            interval_min: defaults.interval_min,
            page_size: defaults.page_size,
            inter_request_ms: defaults.inter_request_delay_ms,
            timeout_ms: defaults.sweep_timeout_ms,
            weights: defaults.weights,
            hotlist_max_hf: 1.05,
            min_debt_usd: defaults.min_debt_usd,
            min_collateral_usd: defaults.min_collateral_usd,
        }
    }
}

impl SweepConfig {
    fn from_env() -> Self {
        let d = Self::default();
        let weights = SweepWeights {
            debt: env_parse("PRIORITY_SWEEP_WEIGHT_DEBT", d.weights.debt),
            collateral: env_parse("PRIORITY_SWEEP_WEIGHT_COLLATERAL", d.weights.collateral),
            hf_penalty: env_parse("PRIORITY_SWEEP_WEIGHT_HF_PENALTY", d.weights.hf_penalty),
            hf_ceiling: env_parse("PRIORITY_SWEEP_WEIGHT_HF_CEILING", d.weights.hf_ceiling),
            low_hf_boost: env_parse("PRIORITY_SWEEP_WEIGHT_LOW_HF_BOOST", d.weights.low_hf_boost),
        };
        Self {
            target_size: env_parse("PRIORITY_TARGET_SIZE", d.target_size),
            max_scan_users: env_parse("PRIORITY_MAX_SCAN_USERS", d.max_scan_users),
            interval_min: env_parse("PRIORITY_SWEEP_INTERVAL_MIN", d.interval_min),
            page_size: env_parse("PRIORITY_SWEEP_PAGE_SIZE", d.page_size),
            inter_request_ms: env_parse("PRIORITY_SWEEP_INTER_REQUEST_MS", d.inter_request_ms),
            timeout_ms: env_parse("PRIORITY_SWEEP_TIMEOUT_MS", d.timeout_ms),
            weights,
            hotlist_max_hf: env_parse("HOTLIST_MAX_HF", d.hotlist_max_hf),
            min_debt_usd: env_parse("PRIORITY_MIN_DEBT_USD", d.min_debt_usd),
            min_collateral_usd: env_parse("PRIORITY_MIN_COLLATERAL_USD", d.min_collateral_usd),
        }
    }

    pub fn priority_sweep_config(&self) -> PrioritySweepConfig {
        PrioritySweepConfig {
            interval_min: self.interval_min,
            target_size: self.target_size,
            max_scan_users: self.max_scan_users,
            page_size: self.page_size,
            inter_request_delay_ms: self.inter_request_ms,
            sweep_timeout_ms: self.timeout_ms,
            min_debt_usd: self.min_debt_usd,
            min_collateral_usd: self.min_collateral_usd,
            weights: self.weights,
        }
    }

    pub fn hotlist_config(&self, min_hf: f64) -> HotlistConfig {
        HotlistConfig {
            max_entries: 500,
            min_hf,
            max_hf: self.hotlist_max_hf,
            min_debt_usd: self.min_debt_usd,
            weights: HotlistWeights::from(self.weights),
        }
    }
}

/// Real-time trigger thresholds.
#[derive(Debug, Clone, Copy)]
pub struct TriggerConfig {
    pub price_trigger_drop_bps: i64,
    pub price_trigger_debounce_sec: u64,
    pub price_trigger_cumulative: bool,
    pub price_trigger_poll_sec: u64,
    pub price_trigger_max_scan: usize,
    pub index_jump_bps_trigger: i64,
    pub reserve_min_index_delta_bps: i64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            price_trigger_drop_bps: 200,
            price_trigger_debounce_sec: 5,
            price_trigger_cumulative: false,
            price_trigger_poll_sec: 10,
            price_trigger_max_scan: 500,
            index_jump_bps_trigger: 50,
            reserve_min_index_delta_bps: DEFAULT_MIN_INDEX_DELTA_BPS,
        }
    }
}

impl TriggerConfig {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            price_trigger_drop_bps: env_parse("PRICE_TRIGGER_DROP_BPS", d.price_trigger_drop_bps),
            price_trigger_debounce_sec: env_parse(
                "PRICE_TRIGGER_DEBOUNCE_SEC",
                d.price_trigger_debounce_sec,
            ),
            price_trigger_cumulative: env_bool(
                "PRICE_TRIGGER_CUMULATIVE",
                d.price_trigger_cumulative,
            ),
            price_trigger_poll_sec: env_parse(
                "PRICE_TRIGGER_POLL_SEC",
                d.price_trigger_poll_sec,
            ),
            price_trigger_max_scan: env_parse(
                "PRICE_TRIGGER_MAX_SCAN",
                d.price_trigger_max_scan,
            ),
            index_jump_bps_trigger: env_parse(
                "INDEX_JUMP_BPS_TRIGGER",
                d.index_jump_bps_trigger,
            ),
            reserve_min_index_delta_bps: env_parse(
                "RESERVE_MIN_INDEX_DELTA_BPS",
                d.reserve_min_index_delta_bps,
            ),
        }
    }
}

/// MicroVerifier admission control.
#[derive(Debug, Clone, Copy)]
pub struct VerifierConfig {
    pub micro_verify_enabled: bool,
    pub micro_verify_max_per_block: usize,
    pub micro_verify_interval_ms: u64,
    pub user_snapshot_ttl_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            micro_verify_enabled: true,
            micro_verify_max_per_block: 200,
            micro_verify_interval_ms: 20,
            user_snapshot_ttl_ms: 2_000,
        }
    }
}

impl VerifierConfig {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            micro_verify_enabled: env_bool("MICRO_VERIFY_ENABLED", d.micro_verify_enabled),
            micro_verify_max_per_block: env_parse(
                "MICRO_VERIFY_MAX_PER_BLOCK",
                d.micro_verify_max_per_block,
            ),
            micro_verify_interval_ms: env_parse(
                "MICRO_VERIFY_INTERVAL_MS",
                d.micro_verify_interval_ms,
            ),
            user_snapshot_ttl_ms: env_parse("USER_SNAPSHOT_TTL_MS", d.user_snapshot_ttl_ms),
        }
    }
}

/// Pre-simulation cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub pre_sim_enabled: bool,
    pub pre_sim_cache_ttl_blocks: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pre_sim_enabled: true,
            pre_sim_cache_ttl_blocks: 2,
        }
    }
}

impl CacheConfig {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            pre_sim_enabled: env_bool("PRE_SIM_ENABLED", d.pre_sim_enabled),
            pre_sim_cache_ttl_blocks: env_parse(
                "PRE_SIM_CACHE_TTL_BLOCKS",
                d.pre_sim_cache_ttl_blocks,
            ),
        }
    }
}

/// Profit/risk gating.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub min_profit_after_gas_usd: f64,
    pub max_position_size_usd: f64,
    pub daily_loss_limit_usd: f64,
    pub blacklisted_tokens: HashSet<String>,
    pub close_factor_bps: u32,
    pub max_slippage_bps: u32,
    pub gas_cost_usd: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let risk = RiskManagerConfig::default();
        let profit = ProfitEngineConfig::default();
        Self {
            min_profit_after_gas_usd: risk.min_profit_after_gas_usd,
            max_position_size_usd: risk.max_position_size_usd,
            daily_loss_limit_usd: risk.daily_loss_limit_usd,
            blacklisted_tokens: risk.blacklisted_tokens,
            close_factor_bps: profit.close_factor_bps,
            max_slippage_bps: profit.max_slippage_bps,
            gas_cost_usd: profit.gas_cost_usd,
        }
    }
}

impl ExecutionConfig {
    fn from_env() -> Self {
        let d = Self::default();
        let blacklisted_tokens = env_str("BLACKLISTED_TOKENS")
            .map(|v| v.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect())
            .unwrap_or(d.blacklisted_tokens.clone());
        Self {
            min_profit_after_gas_usd: env_parse(
                "MIN_PROFIT_AFTER_GAS_USD",
                d.min_profit_after_gas_usd,
            ),
            max_position_size_usd: env_parse("MAX_POSITION_SIZE_USD", d.max_position_size_usd),
            daily_loss_limit_usd: env_parse("DAILY_LOSS_LIMIT_USD", d.daily_loss_limit_usd),
            blacklisted_tokens,
            close_factor_bps: env_parse("CLOSE_FACTOR_BPS", d.close_factor_bps),
            max_slippage_bps: env_parse("MAX_SLIPPAGE_BPS", d.max_slippage_bps),
            gas_cost_usd: env_parse("GAS_COST_USD", d.gas_cost_usd),
        }
    }

    pub fn risk_manager_config(&self) -> RiskManagerConfig {
        RiskManagerConfig {
            min_profit_after_gas_usd: self.min_profit_after_gas_usd,
            max_position_size_usd: self.max_position_size_usd,
            daily_loss_limit_usd: self.daily_loss_limit_usd,
            blacklisted_tokens: self.blacklisted_tokens.clone(),
        }
    }

    pub fn profit_engine_config(&self) -> ProfitEngineConfig {
        ProfitEngineConfig {
            close_factor_bps: self.close_factor_bps,
            max_slippage_bps: self.max_slippage_bps,
            gas_cost_usd: self.gas_cost_usd,
            min_profit_usd: self.min_profit_after_gas_usd,
        }
    }
}

/// Private-relay submission mode, `PRIVATE_TX_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateTxMode {
    Disabled,
    Protect,
    Direct,
}

impl PrivateTxMode {
    fn parse(v: &str) -> Self {
        match v.to_lowercase().as_str() {
            "protect" => Self::Protect,
            "direct" => Self::Direct,
            _ => Self::Disabled,
        }
    }
}

/// Relay/private-submission settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub private_tx_rpc_url: Option<String>,
    pub private_tx_mode: PrivateTxMode,
    pub private_tx_max_retries: u32,
    pub private_tx_fallback_mode: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            private_tx_rpc_url: None,
            private_tx_mode: PrivateTxMode::Disabled,
            private_tx_max_retries: 2,
            private_tx_fallback_mode: "direct".to_string(),
        }
    }
}

impl RelayConfig {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            private_tx_rpc_url: env_str("PRIVATE_TX_RPC_URL"),
            private_tx_mode: env_str("PRIVATE_TX_MODE")
                .map(|v| PrivateTxMode::parse(&v))
                .unwrap_or(d.private_tx_mode),
            private_tx_max_retries: env_parse(
                "PRIVATE_TX_MAX_RETRIES",
                d.private_tx_max_retries,
            ),
            private_tx_fallback_mode: env_str("PRIVATE_TX_FALLBACK_MODE")
                .unwrap_or(d.private_tx_fallback_mode),
        }
    }
}

/// Historical replay settings.
#[derive(Debug, Clone)]
pub struct ReplayConfigValues {
    pub enabled: bool,
    pub block_range: Option<String>,
    pub output_dir: String,
    pub max_accounts_per_block: usize,
}

impl Default for ReplayConfigValues {
    fn default() -> Self {
        Self {
            enabled: false,
            block_range: None,
            output_dir: "replay-output".to_string(),
            max_accounts_per_block: 5_000,
        }
    }
}

impl ReplayConfigValues {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            enabled: env_bool("REPLAY", d.enabled),
            block_range: env_str("REPLAY_BLOCK_RANGE"),
            output_dir: env_str("REPLAY_OUTPUT_DIR").unwrap_or(d.output_dir),
            max_accounts_per_block: env_parse(
                "REPLAY_MAX_ACCOUNTS_PER_BLOCK",
                d.max_accounts_per_block,
            ),
        }
    }
}

/// Ambient, ungrouped settings (connection endpoints, signer, logging).
#[derive(Debug, Clone)]
pub struct AmbientConfig {
    pub rpc_http_url: String,
    pub rpc_ws_url: String,
    pub rpc_secondary_http_url: Option<String>,
    pub pool_address: Address,
    pub multicall3_address: Address,
    pub protocol_data_provider: Address,
    pub chain_id: u64,
    pub private_key: Option<String>,
    pub log_format: String,
    pub engine_profile: String,
    pub borrowers_index_mode: String,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub backfill_blocks: u64,
    pub backfill_chunk_blocks: u64,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            rpc_http_url: "http://localhost:8545".to_string(),
            rpc_ws_url: "ws://localhost:8546".to_string(),
            rpc_secondary_http_url: None,
            pool_address: Address::ZERO,
            multicall3_address: "0xcA11bde05977b3631167028862bE2a173976CA11"
                .parse()
                .unwrap(),
            protocol_data_provider: Address::ZERO,
            chain_id: 1,
            private_key: None,
            log_format: "compact".to_string(),
            engine_profile: "testing".to_string(),
            borrowers_index_mode: "memory".to_string(),
            redis_url: None,
            database_url: None,
            backfill_blocks: 500_000,
            backfill_chunk_blocks: 2_000,
        }
    }
}

impl AmbientConfig {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            rpc_http_url: env_str("RPC_HTTP_URL").unwrap_or(d.rpc_http_url),
            rpc_ws_url: env_str("RPC_WS_URL").unwrap_or(d.rpc_ws_url),
            rpc_secondary_http_url: env_str("RPC_SECONDARY_HTTP_URL"),
            pool_address: env_str("POOL_ADDRESS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.pool_address),
            multicall3_address: env_str("MULTICALL3_ADDRESS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.multicall3_address),
            protocol_data_provider: env_str("PROTOCOL_DATA_PROVIDER")
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.protocol_data_provider),
            chain_id: env_parse("CHAIN_ID", d.chain_id),
            private_key: env_str("PRIVATE_KEY"),
            log_format: env_str("LOG_FORMAT").unwrap_or(d.log_format),
            engine_profile: env_str("ENGINE_PROFILE").unwrap_or(d.engine_profile),
            borrowers_index_mode: env_str("BORROWERS_INDEX_MODE").unwrap_or(d.borrowers_index_mode),
            redis_url: env_str("REDIS_URL"),
            database_url: env_str("DATABASE_URL"),
            backfill_blocks: env_parse("BACKFILL_BLOCKS", d.backfill_blocks),
            backfill_chunk_blocks: env_parse("BACKFILL_CHUNK_BLOCKS", d.backfill_chunk_blocks),
        }
    }
}

/// Full engine configuration tree, one sub-struct per settings group.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub detection: DetectionConfig,
    pub sweep: SweepConfig,
    pub triggers: TriggerConfig,
    pub verifier: VerifierConfig,
    pub caches: CacheConfig,
    pub execution: ExecutionConfig,
    pub relay: RelayConfig,
    pub replay: ReplayConfigValues,
    pub ambient: AmbientConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            sweep: SweepConfig::default(),
            triggers: TriggerConfig::default(),
            verifier: VerifierConfig::default(),
            caches: CacheConfig::default(),
            execution: ExecutionConfig::default(),
            relay: RelayConfig::default(),
            replay: ReplayConfigValues::default(),
            ambient: AmbientConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build the full config tree from environment variables, loading
    /// `.env` first. Every field falls back to its stated default.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            detection: DetectionConfig::from_env(),
            sweep: SweepConfig::from_env(),
            triggers: TriggerConfig::from_env(),
            verifier: VerifierConfig::from_env(),
            caches: CacheConfig::from_env(),
            execution: ExecutionConfig::from_env(),
            relay: RelayConfig::from_env(),
            replay: ReplayConfigValues::from_env(),
            ambient: AmbientConfig::from_env(),
        }
    }

    /// Conservative preset for unit/integration tests: tight loops,
    /// small caps, execution effectively disabled.
    pub fn testing() -> Self {
        let mut cfg = Self::default();
        cfg.ambient.engine_profile = "testing".to_string();
        cfg.sweep.target_size = 50;
        cfg.sweep.max_scan_users = 500;
        cfg.sweep.interval_min = 1;
        cfg.verifier.micro_verify_max_per_block = 20;
        cfg.execution.min_profit_after_gas_usd = 0.0;
        cfg
    }

    /// Mainnet-scale defaults as shipped.
    pub fn production() -> Self {
        let mut cfg = Self::default();
        cfg.ambient.engine_profile = "production".to_string();
        cfg
    }

    /// Tighter thresholds and larger scan budgets for chasing marginal
    /// opportunities at the cost of more RPC load.
    pub fn aggressive() -> Self {
        let mut cfg = Self::default();
        cfg.ambient.engine_profile = "aggressive".to_string();
        cfg.detection.near_hf = 1.05;
        cfg.sweep.target_size = 5_000;
        cfg.sweep.max_scan_users = 100_000;
        cfg.verifier.micro_verify_max_per_block = 500;
        cfg.triggers.price_trigger_drop_bps = 100;
        cfg
    }
}

static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Install the global engine config. Must be called at most once, before
/// any code path relies on [`config`].
pub fn init_config(cfg: EngineConfig) {
    let _ = ENGINE_CONFIG.set(cfg);
}

/// The globally installed engine config, falling back to `production()`
/// defaults if [`init_config`] was never called (e.g. in a unit test that
/// exercises a free function directly).
pub fn config() -> &'static EngineConfig {
    ENGINE_CONFIG.get_or_init(EngineConfig::production)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_profile_shrinks_scan_budgets() {
        let cfg = EngineConfig::testing();
        assert!(cfg.sweep.max_scan_users < EngineConfig::production().sweep.max_scan_users);
    }

    #[test]
    fn aggressive_profile_widens_near_hf_and_scan_size() {
        let aggressive = EngineConfig::aggressive();
        let production = EngineConfig::production();
        assert!(aggressive.sweep.target_size > production.sweep.target_size);
        assert!(aggressive.triggers.price_trigger_drop_bps < production.triggers.price_trigger_drop_bps);
    }

    #[test]
    fn default_detection_thresholds_match_stated_values() {
        let cfg = DetectionConfig::default();
        assert_eq!(cfg.execution_hf_threshold_bps, 9800);
        assert!((cfg.near_hf - 1.03).abs() < 1e-9);
        assert!((cfg.evict_hf - 1.20).abs() < 1e-9);
        assert_eq!(cfg.evict_consecutive, 3);
    }
}
