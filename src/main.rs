//! Liquidation engine entry point for an Aave-v3-style lending protocol.
//!
//! Wires together chain connectivity, the active-borrower index, the
//! detection pipeline (real-time events plus periodic priority sweep),
//! profit/risk gating, and submission, then runs until killed.

use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::InMemorySubgraphClient;
use liquidator_chain::contracts::aave_v3::IPool;
use liquidator_chain::{
    EventListener, ExecutorConfig, FallbackMode, GasLadder, GasLadderConfig, HedgedProvider,
    HedgedProviderConfig, LiquidationExecutor, MicroVerifier, MicroVerifierConfig, OracleMonitor,
    OracleType, ProviderManager, SubmissionMode,
};
use liquidator_core::candidate::now_unix;
use liquidator_core::decision_trace::DEFAULT_RETENTION_SECS;
use liquidator_core::risk::Opportunity;
use liquidator_core::{
    config, init_config, resolve_user_risk_snapshot, AttemptMeta, BorrowersIndex,
    BorrowersIndexConfig, BorrowersIndexMode, CandidateSet, DecisionAction, DecisionTrace,
    DecisionTraceStore, EngineConfig, HotlistManager, MicroVerifyCache, PrioritySweepRunner,
    PrivateTxMode, ProfitEngine, RealTimeEvent, RealTimeHFService, RealTimeServiceConfig,
    ReserveIndexTracker, ReserveMeta, RiskManager, ScanRegistry, ScanRegistryConfig,
};

fn print_banner() {
    println!(
        r#"
 _     _             _     _       _   _                 _____             _
| |   (_) __ _ _   _(_) __| | __ _| |_(_) ___  _ __      | ____|_ __   __ _(_)_ __   ___
| |   | |/ _` | | | | |/ _` |/ _` | __| |/ _ \| '_ \     |  _| | '_ \ / _` | | '_ \ / _ \
| |___| | (_| | |_| | | (_| | (_| | |_| | (_) | | | |    | |___| | | | (_| | | | | |  __/
|_____|_|\__, |\__,_|_|\__,_|\__,_|\__|_|\___/|_| |_|    |_____|_| |_|\__, |_|_| |_|\___|
         |___/                                                       |___/
"#
    );
}

/// Parses `ORACLE_FEEDS="asset:aggregator,asset:aggregator"` into the
/// `(oracle, asset, type)` triples `EventListener`/`OracleMonitor` want.
/// Every feed is registered as `OracleType::Standard`: this engine has no
/// on-chain discovery path for OCR2 vs. standard aggregators, so the
/// distinction is left to whoever configures the feed list.
fn parse_oracle_feeds(raw: &str) -> Vec<(Address, Address, OracleType)> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (asset, aggregator) = pair.split_once(':')?;
            let asset: Address = asset.trim().parse().ok()?;
            let aggregator: Address = aggregator.trim().parse().ok()?;
            Some((aggregator, asset, OracleType::Standard))
        })
        .collect()
}

/// Maps the relay-facing `PRIVATE_TX_MODE` onto the executor's submission
/// mode. `Disabled` without a configured relay always submits publicly;
/// `testing` profiles stay in `Shadow` regardless, so a freshly-configured
/// engine never fires a real transaction until the profile is switched.
fn resolve_submission_mode(config: &EngineConfig) -> SubmissionMode {
    if config.ambient.engine_profile == "testing" {
        return SubmissionMode::Shadow;
    }
    match config.relay.private_tx_mode {
        PrivateTxMode::Disabled => SubmissionMode::Public,
        PrivateTxMode::Protect | PrivateTxMode::Direct => SubmissionMode::Private,
    }
}

fn resolve_fallback_mode(raw: &str) -> FallbackMode {
    match raw.to_lowercase().as_str() {
        "race" => FallbackMode::Race,
        _ => FallbackMode::Direct,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    init_config(EngineConfig::from_env());
    let config = config();

    info!(profile = %config.ambient.engine_profile, "starting liquidation engine");

    let provider_manager = ProviderManager::new(
        &config.ambient.rpc_http_url,
        &config.ambient.rpc_http_url,
        &config.ambient.rpc_http_url,
        &config.ambient.rpc_ws_url,
        config.ambient.pool_address,
    )
    .await
    .context("provider manager init failed")?;

    let provider = Arc::new(ProviderBuilder::new().on_http(config.ambient.rpc_http_url.parse()?));

    let chain_id = provider.get_chain_id().await.unwrap_or(config.ambient.chain_id);
    info!(chain_id, "connected to chain");

    // Reserve discovery: every reserve the pool lists, plus its variable
    // debt token (for borrower backfill) and a bare `ReserveMeta` (for the
    // per-execution risk resolver).
    let pool = IPool::new(config.ambient.pool_address, provider.as_ref());
    let reserve_list = pool
        .getReservesList()
        .call()
        .await
        .context("getReservesList failed")?
        ._0;
    info!(reserve_count = reserve_list.len(), "discovered reserves");

    let mut reserve_pairs = Vec::with_capacity(reserve_list.len());
    let mut reserve_metas = Vec::with_capacity(reserve_list.len());
    for asset in &reserve_list {
        match pool.getReserveData(*asset).call().await {
            Ok(data) => {
                reserve_pairs.push((*asset, data.variableDebtTokenAddress));
                reserve_metas.push(ReserveMeta { asset: *asset });
            }
            Err(err) => {
                warn!(%asset, %err, "getReserveData failed, skipping reserve");
            }
        }
    }

    let borrowers_mode = match config.ambient.borrowers_index_mode.as_str() {
        #[cfg(feature = "redis-store")]
        "redis" => BorrowersIndexMode::Redis,
        #[cfg(feature = "postgres-store")]
        "postgres" => BorrowersIndexMode::Postgres,
        _ => BorrowersIndexMode::Memory,
    };
    let borrowers_config = BorrowersIndexConfig {
        mode: borrowers_mode,
        redis_url: config.ambient.redis_url.clone(),
        postgres_url: config.ambient.database_url.clone(),
        backfill_blocks: config.ambient.backfill_blocks,
        chunk_blocks: config.ambient.backfill_chunk_blocks,
    };
    let borrowers = Arc::new(BorrowersIndex::new(&borrowers_config));
    borrowers
        .initialize(&reserve_pairs, provider.as_ref(), &borrowers_config)
        .await;
    info!(
        borrowers = borrowers.get_all_borrowers().len(),
        "borrowers index initialized"
    );

    let candidates = Arc::new(CandidateSet::new(
        config
            .detection
            .candidate_set_config(config.replay.max_accounts_per_block),
    ));
    let hotlist = Arc::new(HotlistManager::new(
        config.sweep.hotlist_config(config.detection.near_hf),
    ));
    let scan_registry = Arc::new(ScanRegistry::new(ScanRegistryConfig::for_block_time(2_000)));
    let reserve_index = Arc::new(ReserveIndexTracker::new(config.triggers.reserve_min_index_delta_bps));
    let verify_cache = Arc::new(MicroVerifyCache::new());

    let verifier = Arc::new(MicroVerifier::new(
        config.ambient.rpc_http_url.clone(),
        config.ambient.pool_address,
        config.ambient.multicall3_address,
        MicroVerifierConfig {
            max_per_block: config.verifier.micro_verify_max_per_block,
            min_interval_ms: config.verifier.micro_verify_interval_ms,
        },
    ));

    let oracle_feeds = std::env::var("ORACLE_FEEDS")
        .ok()
        .map(|v| parse_oracle_feeds(&v))
        .unwrap_or_default();
    info!(feed_count = oracle_feeds.len(), "loaded oracle feed configuration");

    let listener = Arc::new(EventListener::new(
        config.ambient.rpc_ws_url.clone(),
        config.ambient.pool_address,
        oracle_feeds.clone(),
    ));

    let oracle_monitor = Arc::new(OracleMonitor::new(Arc::new(provider_manager)));
    for (oracle, asset, _) in &oracle_feeds {
        oracle_monitor.register_oracle(*oracle, *asset);
    }

    let gas_ladder = Arc::new(GasLadder::new(GasLadderConfig {
        http_url: config.ambient.rpc_http_url.clone(),
        ..GasLadderConfig::default()
    }));
    if let Err(err) = gas_ladder.init().await {
        warn!(%err, "gas ladder initial fetch failed, starting with defaults");
    }
    gas_ladder.clone().spawn_refresh();

    let _hedged = Arc::new(HedgedProvider::new(HedgedProviderConfig {
        primary_url: config.ambient.rpc_http_url.clone(),
        secondary_url: config
            .ambient
            .rpc_secondary_http_url
            .clone()
            .unwrap_or_else(|| config.ambient.rpc_http_url.clone()),
        hedge_delay_ms: 150,
    }));

    let trace_store = Arc::new(DecisionTraceStore::new(Duration::from_secs(
        DEFAULT_RETENTION_SECS,
    )));

    let executor = match &config.ambient.private_key {
        Some(private_key) => {
            let signer: PrivateKeySigner = private_key.parse().context("invalid private key")?;
            let signer_address = signer.address();
            let wallet = EthereumWallet::from(signer);

            let relay = match config.relay.private_tx_mode {
                PrivateTxMode::Disabled => None,
                _ => config
                    .relay
                    .private_tx_rpc_url
                    .as_ref()
                    .map(|url| liquidator_api::RelayClient::new(url.clone(), signer_address.to_string())),
            };

            let initial_nonce = provider
                .get_transaction_count(signer_address)
                .await
                .unwrap_or(0);

            let executor_config = ExecutorConfig {
                rpc_url: config.ambient.rpc_http_url.clone(),
                pool_address: config.ambient.pool_address,
                chain_id,
                submission_mode: resolve_submission_mode(config),
                fallback_mode: resolve_fallback_mode(&config.relay.private_tx_fallback_mode),
                max_retries: config.relay.private_tx_max_retries,
                ..ExecutorConfig::default()
            };

            Some(Arc::new(LiquidationExecutor::new(
                executor_config,
                wallet,
                signer_address,
                relay,
                initial_nonce,
            )))
        }
        None => {
            warn!("no PRIVATE_KEY configured, running in detection-only mode");
            None
        }
    };

    let risk_manager = Arc::new(RiskManager::new(config.execution.risk_manager_config()));
    let profit_engine = Arc::new(ProfitEngine::new(config.execution.profit_engine_config()));

    let realtime_config = RealTimeServiceConfig {
        price_trigger_drop_bps: config.triggers.price_trigger_drop_bps,
        price_trigger_debounce_sec: config.triggers.price_trigger_debounce_sec,
        price_trigger_cumulative: config.triggers.price_trigger_cumulative,
        trigger_max_scan: config.triggers.price_trigger_max_scan,
        index_jump_bps_trigger: config.triggers.index_jump_bps_trigger,
        hf_pred_critical: config.detection.hf_pred_critical,
        ..RealTimeServiceConfig::default()
    };
    let realtime = Arc::new(RealTimeHFService::new(
        listener.clone(),
        verifier.clone(),
        candidates.clone(),
        hotlist.clone(),
        scan_registry.clone(),
        reserve_index.clone(),
        verify_cache.clone(),
        borrowers.clone(),
        realtime_config,
    ));

    // The live subgraph is an external collaborator this engine doesn't
    // implement; the priority sweep runs against the documented in-memory
    // stand-in until a concrete GraphQL client is wired in.
    let subgraph = Arc::new(InMemorySubgraphClient::new(Vec::new(), Vec::new()));
    let sweep = Arc::new(PrioritySweepRunner::new(
        config.sweep.priority_sweep_config(),
        subgraph,
    ));

    let mut events = realtime.subscribe();

    let realtime_task = {
        let realtime = realtime.clone();
        tokio::spawn(async move {
            if let Err(err) = realtime.run().await {
                error!(%err, "real-time service exited");
            }
        })
    };
    let sweep_task = tokio::spawn(sweep.run_forever());

    let data_provider_address = config.ambient.protocol_data_provider;
    let consumer_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let RealTimeEvent::Liquidatable { user, hf, block_tag, .. } = event else {
                continue;
            };

            let snapshot = resolve_user_risk_snapshot(
                user,
                &reserve_metas,
                data_provider_address,
                &oracle_monitor,
                provider.as_ref(),
            )
            .await;

            let result = profit_engine.evaluate(&snapshot);
            if !result.profitable {
                trace_store.record(DecisionTrace {
                    user,
                    ts: now_unix(),
                    action: DecisionAction::Skip,
                    reason: result
                        .skip_reason
                        .unwrap_or_else(|| "not profitable".to_string()),
                    hf_at_decision: hf,
                    hf_prev_block: hf,
                    est_debt_usd: result.repay_value_usd,
                    est_profit_usd: result.net_profit_usd,
                    gas_price_gwei: 0.0,
                    head_lag_blocks: 0,
                    gas_threshold_gwei: 0.0,
                    attempt_meta: None,
                });
                continue;
            }

            let (Some(debt_asset), Some(collateral_asset)) =
                (result.debt_asset, result.collateral_asset)
            else {
                continue;
            };

            let opportunity = Opportunity {
                collateral_symbol: collateral_asset.to_string(),
                debt_symbol: debt_asset.to_string(),
                position_size_usd: result.repay_value_usd,
            };
            let decision = risk_manager.can_execute(&opportunity, result.net_profit_usd);
            if !decision.allowed {
                trace_store.record(DecisionTrace {
                    user,
                    ts: now_unix(),
                    action: DecisionAction::Skip,
                    reason: format!("{:?}", decision.reason),
                    hf_at_decision: hf,
                    hf_prev_block: hf,
                    est_debt_usd: result.repay_value_usd,
                    est_profit_usd: result.net_profit_usd,
                    gas_price_gwei: 0.0,
                    head_lag_blocks: 0,
                    gas_threshold_gwei: 0.0,
                    attempt_meta: None,
                });
                continue;
            }

            let Some(executor) = executor.as_ref() else {
                warn!(%user, block_tag, "profitable liquidation detected but no executor configured");
                continue;
            };

            let current_debt_index = match IPool::new(config.ambient.pool_address, provider.as_ref())
                .getReserveData(debt_asset)
                .call()
                .await
            {
                Ok(d) => alloy::primitives::U256::from(d.variableBorrowIndex),
                Err(err) => {
                    warn!(%err, "could not fetch current debt index before submit, using zero");
                    alloy::primitives::U256::ZERO
                }
            };

            let outcome = executor
                .submit(
                    user,
                    debt_asset,
                    collateral_asset,
                    result.repay_amount,
                    current_debt_index,
                )
                .await;

            if !outcome.success {
                // A failed/reverted submission still burns gas; count at
                // least the configured gas cost against the daily budget.
                risk_manager.record_loss(config.execution.gas_cost_usd);
            }

            trace_store.record(DecisionTrace {
                user,
                ts: now_unix(),
                action: if outcome.success {
                    DecisionAction::Attempt
                } else {
                    DecisionAction::Revert
                },
                reason: outcome.error_code.clone().unwrap_or_default(),
                hf_at_decision: hf,
                hf_prev_block: hf,
                est_debt_usd: result.repay_value_usd,
                est_profit_usd: result.net_profit_usd,
                gas_price_gwei: 0.0,
                head_lag_blocks: 0,
                gas_threshold_gwei: 0.0,
                attempt_meta: Some(AttemptMeta {
                    tx_hash: outcome.tx_hash.map(|h| h.to_string()),
                    sent_private: outcome.sent_private,
                }),
            });

            info!(%user, success = outcome.success, latency_ms = outcome.latency_ms, "liquidation attempt complete");
        }
    });

    tokio::select! {
        res = realtime_task => { res.context("real-time task panicked")?; }
        res = sweep_task => { res.context("sweep task panicked")?; }
        res = consumer_task => { res.context("consumer task panicked")?; }
    }

    Ok(())
}
