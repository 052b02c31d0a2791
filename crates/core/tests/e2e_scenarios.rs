//! Black-box end-to-end scenarios from the detection pipeline's testable
//! properties: pre-sim cache hit-rate, hotlist priority ordering, gas
//! ladder tier ordering, block-range parsing, replay coverage, and miss
//! classification.

use std::sync::Arc;

use alloy::primitives::{Address, U256};

use liquidator_api::{InMemorySubgraphClient, LiquidationCallEvent};
use liquidator_chain::gas_ladder::{GasLadder, GasLadderConfig, GasTier};
use liquidator_chain::multicall::MicroVerifier;
use liquidator_core::candidate::{CandidateSetConfig, HotlistConfig, HotlistManager, HotlistWeights};
use liquidator_core::decision_trace::{now_unix, DecisionAction, DecisionTrace};
use liquidator_core::miss_classifier::{MissClassifier, MissContext, MissReason};
use liquidator_core::pre_sim_cache::{PreSimCache, PreSimFingerprint, PreSimPlan};
use liquidator_core::replay::{
    index_by_user, parse_block_range, GroundTruthConfig, GroundTruthLoader, ReplayController,
    ReplayControllerConfig, UniverseBuilder,
};
use liquidator_core::CandidateSet;

fn user(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// Insert 5 plans at a fixed block, expect 5/5 hits, then a
/// full miss once `currentBlock` advances past the TTL.
#[test]
fn pre_sim_hit_rate_then_ttl_expiry() {
    let cache = PreSimCache::new(/* ttl_blocks */ 10, /* max_size */ 100);
    let block = 12_345_678u64;

    let fingerprints: Vec<PreSimFingerprint> = (1..=5u8)
        .map(|i| PreSimFingerprint {
            user: user(i),
            debt_asset: Address::repeat_byte(0xAA),
            collateral_asset: Address::repeat_byte(0xBB),
            block_tag: block,
            debt_amount: U256::from(1_000u64),
        })
        .collect();

    for fp in &fingerprints {
        cache.set(PreSimPlan {
            fingerprint: fp.clone(),
            expected_collateral: U256::from(900u64),
            estimated_profit_usd: 7.5,
            created_at_block: block,
            timestamp: now_unix(),
        });
    }

    for fp in &fingerprints {
        assert!(cache.get(fp, block).is_some());
    }
    let stats = cache.stats();
    assert_eq!(stats.hits, 5);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.size, 5);

    let ttl_blocks = 10;
    for fp in &fingerprints {
        assert!(cache.get(fp, block + ttl_blocks + 1).is_none());
    }
}

/// Hotlist priority ordering and lowest-priority eviction
/// under a bounded `maxEntries`.
#[test]
fn hotlist_orders_by_priority_and_evicts_lowest() {
    let hotlist = HotlistManager::new(HotlistConfig {
        max_entries: 10,
        min_hf: 0.98,
        max_hf: 1.05,
        min_debt_usd: 100.0,
        weights: HotlistWeights::default(),
    });

    let a = Address::repeat_byte(0xA);
    let b = Address::repeat_byte(0xB);
    assert!(hotlist.consider(a, 1.04, 200.0));
    assert!(hotlist.consider(b, 1.02, 500.0));

    let ranked = hotlist.get_all();
    assert_eq!(ranked[0].address, b, "lower HF and higher debt outranks a");

    // Fill the rest of the list with clearly higher-priority entries
    // (near the 1.0 boundary, larger debt) so `a` is the minimum.
    for i in 0..8u8 {
        let addr = Address::repeat_byte(0x10 + i);
        assert!(hotlist.consider(addr, 0.985, 10_000.0));
    }
    assert_eq!(hotlist.len(), 10);

    // One more high-priority entrant must evict the current minimum (`a`).
    let newcomer = Address::repeat_byte(0xFF);
    assert!(hotlist.consider(newcomer, 0.981, 50_000.0));
    assert_eq!(hotlist.len(), 10);
    assert!(!hotlist.get_all().iter().any(|e| e.address == a));
}

/// Fee-tier ordering holds strictly after initialization.
#[test]
fn gas_ladder_tiers_are_strictly_ordered() {
    let ladder = GasLadder::new(GasLadderConfig::default());
    let fast = ladder.get_gas_plan(GasTier::Fast);
    let mid = ladder.get_gas_plan(GasTier::Mid);
    let safe = ladder.get_gas_plan(GasTier::Safe);

    assert!(fast.tip() > mid.tip());
    assert!(mid.tip() > safe.tip());
}

/// Block-range parser accepts a valid range and rejects an
/// inverted one with the documented message.
#[test]
fn block_range_parser_accepts_and_rejects() {
    let range = parse_block_range("38393176-38395221").unwrap();
    assert_eq!(range.start, 38_393_176);
    assert_eq!(range.end, 38_395_221);
    assert_eq!(range.span(), 2_045);
    assert_eq!(range.count(), 2_046);

    let err = parse_block_range("100-99").unwrap_err();
    assert_eq!(err.to_string(), "start must be ≤ end");
}

/// Replay coverage over a synthetic 200-block window with 30
/// ground-truth events, against a real RPC endpoint. Requires a live (or
/// local anvil-forked) node at `RPC_TEST_URL`/`http://localhost:8545`, so
/// this is `#[ignore]`-gated like the other network-dependent tests in
/// this crate.
#[tokio::test]
#[ignore = "requires network: RPC_TEST_URL or a local anvil node"]
async fn replay_coverage_matches_ground_truth_count() {
    let http_url = std::env::var("RPC_TEST_URL").unwrap_or_else(|_| "http://localhost:8545".into());

    let start_block = 1_000u64;
    let events: Vec<LiquidationCallEvent> = (0..30u8)
        .map(|i| LiquidationCallEvent {
            block_number: start_block + (i as u64) * 6,
            timestamp: 1_700_000_000 + i as u64,
            tx_hash: format!("0x{i:064x}"),
            liquidator: Address::repeat_byte(0xEE),
            user: user(i + 1),
            collateral_asset: Address::repeat_byte(1),
            debt_asset: Address::repeat_byte(2),
            debt_to_cover: U256::from(1_000u64),
            liquidated_collateral_amount: U256::from(900u64),
        })
        .collect();

    let subgraph = Arc::new(InMemorySubgraphClient::new(events.clone(), Vec::new()));
    let loader = GroundTruthLoader::new(GroundTruthConfig::default(), subgraph);
    let ground_truth = loader.load(0, u64::MAX).await;
    assert_eq!(ground_truth.events.len(), 30);

    let candidate_set = Arc::new(CandidateSet::new(CandidateSetConfig::default()));
    UniverseBuilder::seed(&candidate_set, &ground_truth.events, start_block);
    assert_eq!(candidate_set.len(), 30);

    let verifier = Arc::new(MicroVerifier::new(
        http_url,
        Address::ZERO,
        Address::ZERO,
        Default::default(),
    ));

    let mut controller = ReplayController::new(
        ReplayControllerConfig { hf_threshold: 1.0 },
        candidate_set,
        verifier,
        index_by_user(&ground_truth.events),
    );

    let range = parse_block_range(&format!("{start_block}-{}", start_block + 199)).unwrap();
    let reporter = controller.run(range).await;
    let summary = reporter.build_summary(30, 0, true, false);

    assert_eq!(summary.detected + summary.missed, 30);
    assert!((summary.coverage_ratio - summary.detected as f64 / 30.0).abs() < 1e-9);
}

/// Miss classification distinguishes `late_send` (prior HF<1
/// sample exists) from `gas_outbid` (a recorded skip decision citing gas).
#[test]
fn miss_classifier_distinguishes_late_send_and_gas_outbid() {
    let competitor = Address::repeat_byte(0xC0);
    let our_address = Address::repeat_byte(0x01);
    let target_user = user(0xAB);

    let late_send_ctx = MissContext {
        user: target_user,
        liquidator: competitor,
        our_address,
        event_ts: now_unix(),
        in_watch_set: true,
        decision: None,
        blocks_since_first_seen: Some(2),
        transient_blocks: 3,
    };
    let late_send = MissClassifier::classify(&late_send_ctx);
    assert_eq!(late_send.reason, MissReason::LateSend);
    assert_eq!(late_send.blocks_since_first_seen, Some(2));

    let skip_decision = DecisionTrace {
        user: target_user,
        ts: now_unix(),
        action: DecisionAction::Skip,
        reason: "gas_price too low".to_string(),
        hf_at_decision: 0.97,
        hf_prev_block: 0.97,
        est_debt_usd: 1_000.0,
        est_profit_usd: 10.0,
        gas_price_gwei: 0.5,
        head_lag_blocks: 0,
        gas_threshold_gwei: 2.0,
        attempt_meta: None,
    };
    let gas_outbid_ctx = MissContext {
        user: target_user,
        liquidator: competitor,
        our_address,
        event_ts: now_unix(),
        in_watch_set: true,
        decision: Some(&skip_decision),
        blocks_since_first_seen: Some(1),
        transient_blocks: 3,
    };
    let gas_outbid = MissClassifier::classify(&gas_outbid_ctx);
    assert_eq!(gas_outbid.reason, MissReason::GasOutbid);
}
