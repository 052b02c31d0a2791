//! Real-time event-driven health-factor monitoring.
//!
//! Fuses new block heads, `ReserveDataUpdated`, Chainlink-style price
//! transmissions (in-block and pending/mempool), and liquidation events
//! into a single admission-gated verification pipeline. Emits outcomes on
//! a broadcast channel for downstream subscribers (the execution layer);
//! this service never calls the executor directly.
//!
//! Grounded on [`crate::replay::controller::ReplayController`]'s
//! verify-then-update-candidate-set sequence, generalized from a
//! block-by-block batch loop to independent per-source event reactions,
//! each gated through [`crate::scan_registry::ScanRegistry`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256};
use dashmap::DashMap;
use futures::stream::StreamExt;
use liquidator_chain::{
    EventListener, MicroVerifier, OracleUpdate, PendingTransmit, PoolEvent, PriceTransmission,
    ReserveUpdate, TriggerKind, UserAccountData,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::borrowers_index::BorrowersIndex;
use crate::candidate::{CandidateSet, EntryReason, HotlistManager};
use crate::decimal::PRICE_DECIMALS;
use crate::micro_verify_cache::{MicroVerifyCache, VerifiedHf};
use crate::reserve_index::ReserveIndexTracker;
use crate::scan_registry::{ScanKey, ScanRegistry};

/// Tunables for the real-time service; mirrors the "Triggers" group of
/// [`crate::config::EngineConfig`] plus the chunking/heartbeat knobs kept
/// separate from the sweep's own timeout handling.
#[derive(Debug, Clone)]
pub struct RealTimeServiceConfig {
    pub price_trigger_drop_bps: i64,
    pub price_trigger_debounce_sec: u64,
    pub price_trigger_cumulative: bool,
    /// Bounds any single emergency-scan fan-out (reserve_fast, price_shock,
    /// liquidation co-borrower refresh).
    pub trigger_max_scan: usize,
    /// Index delta at/above which a reserve update is escalated from
    /// `ReserveFast` to the more urgent `IndexJump` trigger.
    pub index_jump_bps_trigger: i64,
    pub hf_pred_critical: f64,
    /// Age past which a hotlist entry is re-verified on a new head.
    pub hotlist_revisit_age_sec: u64,
    pub chunk_timeout_ms: u64,
    pub chunk_retry_attempts: u32,
    /// If no new block head arrives within this window, `run` returns an
    /// error so the caller can restart the service.
    pub run_stall_abort_ms: u64,
    pub reconnect_initial_backoff_ms: u64,
    pub reconnect_max_backoff_ms: u64,
}

impl Default for RealTimeServiceConfig {
    fn default() -> Self {
        Self {
            price_trigger_drop_bps: 200,
            price_trigger_debounce_sec: 5,
            price_trigger_cumulative: false,
            trigger_max_scan: 500,
            index_jump_bps_trigger: 50,
            hf_pred_critical: 1.0,
            hotlist_revisit_age_sec: 10,
            chunk_timeout_ms: 5_000,
            chunk_retry_attempts: 3,
            run_stall_abort_ms: 60_000,
            reconnect_initial_backoff_ms: 500,
            reconnect_max_backoff_ms: 30_000,
        }
    }
}

/// Outcome of a real-time reaction, broadcast to downstream subscribers.
#[derive(Debug, Clone)]
pub enum RealTimeEvent {
    /// A verified user whose health factor has dropped below 1.0.
    Liquidatable {
        user: Address,
        hf: f64,
        block_tag: u64,
        trigger: TriggerKind,
    },
    /// An in-block or pending price transmission was observed. Per the
    /// open question on OCR2 report decoding, this carries timing only;
    /// no price magnitude is attached.
    Transmit {
        oracle: Address,
        asset: Address,
        tx_hash: B256,
        pending: bool,
    },
    /// A reserve's indices moved enough to warrant a fast recheck of its
    /// borrowers.
    ReserveFast { reserve: Address, block_tag: u64 },
}

struct PriceFeedState {
    baseline: f64,
    last_answer: f64,
    last_trigger_at: Option<Instant>,
}

fn to_verified(account: &UserAccountData) -> VerifiedHf {
    VerifiedHf {
        hf: account.hf,
        total_collateral_base: account.total_collateral_base.to::<u128>(),
        total_debt_base: account.total_debt_base.to::<u128>(),
        liquidation_threshold_bps: account.liquidation_threshold_bps,
        ltv_bps: account.ltv_bps,
    }
}

fn base_to_usd(base: u128) -> f64 {
    base as f64 / 10f64.powi(PRICE_DECIMALS as i32)
}

/// Fuses chain events into admission-gated HF verification and broadcasts
/// the outcomes.
pub struct RealTimeHFService {
    listener: Arc<EventListener>,
    verifier: Arc<MicroVerifier>,
    candidates: Arc<CandidateSet>,
    hotlist: Arc<HotlistManager>,
    scan_registry: Arc<ScanRegistry>,
    reserve_index: Arc<ReserveIndexTracker>,
    verify_cache: Arc<MicroVerifyCache>,
    borrowers: Arc<BorrowersIndex>,
    config: RealTimeServiceConfig,
    events_tx: broadcast::Sender<RealTimeEvent>,
    current_block: AtomicU64,
    price_feeds: DashMap<Address, PriceFeedState>,
}

impl RealTimeHFService {
    pub fn new(
        listener: Arc<EventListener>,
        verifier: Arc<MicroVerifier>,
        candidates: Arc<CandidateSet>,
        hotlist: Arc<HotlistManager>,
        scan_registry: Arc<ScanRegistry>,
        reserve_index: Arc<ReserveIndexTracker>,
        verify_cache: Arc<MicroVerifyCache>,
        borrowers: Arc<BorrowersIndex>,
        config: RealTimeServiceConfig,
    ) -> Self {
        let (events_tx, _rx) = broadcast::channel(1024);
        Self {
            listener,
            verifier,
            candidates,
            hotlist,
            scan_registry,
            reserve_index,
            verify_cache,
            borrowers,
            config,
            events_tx,
            current_block: AtomicU64::new(0),
            price_feeds: DashMap::new(),
        }
    }

    /// Subscribe to this service's event stream. Each subscriber gets its
    /// own independent receiver; lagging subscribers drop oldest events
    /// rather than blocking the service.
    pub fn subscribe(&self) -> broadcast::Receiver<RealTimeEvent> {
        self.events_tx.subscribe()
    }

    pub fn current_block(&self) -> u64 {
        self.current_block.load(Ordering::SeqCst)
    }

    /// Runs all listener loops until one reports a stall or a fatal
    /// subscribe error. Each loop reconnects on its own with exponential
    /// backoff; only a sustained absence of new block heads aborts the
    /// whole service.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let heads = tokio::spawn(self.clone().run_heads());
        let reserves = tokio::spawn(self.clone().run_reserve_updates());
        let oracles = tokio::spawn(self.clone().run_oracle_updates());
        let transmissions = tokio::spawn(self.clone().run_price_transmissions());
        let pending = tokio::spawn(self.clone().run_pending_transmits());
        let pool_events = tokio::spawn(self.clone().run_pool_events());

        tokio::select! {
            res = heads => res??,
            res = reserves => res??,
            res = oracles => res??,
            res = transmissions => res??,
            res = pending => res??,
            res = pool_events => res??,
        }

        Ok(())
    }

    async fn run_heads(self: Arc<Self>) -> anyhow::Result<()> {
        let mut backoff = self.config.reconnect_initial_backoff_ms;
        loop {
            let stall = Duration::from_millis(self.config.run_stall_abort_ms);
            let subscribe_result = self.listener.subscribe_new_heads().await;
            let mut stream = match subscribe_result {
                Ok(s) => s,
                Err(err) => {
                    warn!(%err, "new-head subscription failed, reconnecting");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    backoff = (backoff * 2).min(self.config.reconnect_max_backoff_ms);
                    continue;
                }
            };
            backoff = self.config.reconnect_initial_backoff_ms;

            loop {
                match tokio::time::timeout(stall, stream.next()).await {
                    Ok(Some(block)) => self.clone().handle_new_head(block).await,
                    Ok(None) => {
                        warn!("new-head stream ended, reconnecting");
                        break;
                    }
                    Err(_) => {
                        anyhow::bail!("no new block head observed within stall window");
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }

    async fn handle_new_head(self: Arc<Self>, block: u64) {
        self.current_block.store(block, Ordering::SeqCst);
        self.verifier.roll_block(block);

        for user in self.hotlist.get_needing_revisit(self.config.hotlist_revisit_age_sec) {
            let svc = self.clone();
            tokio::spawn(async move {
                svc.verify_and_emit(user, block, TriggerKind::NearThreshold).await;
            });
        }

        for entry in self.hotlist.get_all() {
            if entry.proj_hf < self.config.hf_pred_critical {
                let svc = self.clone();
                tokio::spawn(async move {
                    svc.verify_and_emit(entry.address, block, TriggerKind::HeadCritical).await;
                });
            }
        }
    }

    async fn run_reserve_updates(self: Arc<Self>) -> anyhow::Result<()> {
        self.run_listener_loop("reserve_updates", |svc| {
            let listener = svc.listener.clone();
            async move { listener.subscribe_reserve_updates().await }
        }, |svc, update: ReserveUpdate| async move {
            svc.handle_reserve_update(update).await;
        })
        .await
    }

    async fn handle_reserve_update(self: Arc<Self>, update: ReserveUpdate) {
        let Some(delta) = self
            .reserve_index
            .update(update.reserve, update.liquidity_index, update.variable_borrow_index)
        else {
            return;
        };

        if self.reserve_index.should_skip_recheck(&delta) {
            return;
        }

        let trigger = if delta.max_abs_bps() >= self.config.index_jump_bps_trigger {
            TriggerKind::IndexJump
        } else {
            TriggerKind::ReserveFast
        };

        let _ = self.events_tx.send(RealTimeEvent::ReserveFast {
            reserve: update.reserve,
            block_tag: update.block_number,
        });

        let borrowers = self.borrowers.get_borrowers(update.reserve);
        for user in borrowers.into_iter().take(self.config.trigger_max_scan) {
            let svc = self.clone();
            let block_tag = update.block_number;
            tokio::spawn(async move {
                svc.verify_and_emit(user, block_tag, trigger).await;
            });
        }
    }

    async fn run_oracle_updates(self: Arc<Self>) -> anyhow::Result<()> {
        self.run_listener_loop("oracle_updates", |svc| {
            let listener = svc.listener.clone();
            async move { listener.subscribe_oracle_updates().await }
        }, |svc, update: OracleUpdate| async move {
            svc.handle_oracle_update(update).await;
        })
        .await
    }

    async fn handle_oracle_update(self: Arc<Self>, update: OracleUpdate) {
        let price = update.price.to::<u128>() as f64 / 10f64.powi(PRICE_DECIMALS as i32);
        if price <= 0.0 {
            return;
        }

        let (triggered, block_tag) = {
            let mut state = self.price_feeds.entry(update.oracle).or_insert_with(|| PriceFeedState {
                baseline: price,
                last_answer: price,
                last_trigger_at: None,
            });

            let reference = if self.config.price_trigger_cumulative {
                state.baseline
            } else {
                state.last_answer
            };
            let drop_bps = ((reference - price) / reference * 10_000.0) as i64;
            state.last_answer = price;

            let debounced = state
                .last_trigger_at
                .is_some_and(|t| t.elapsed() < Duration::from_secs(self.config.price_trigger_debounce_sec));

            let triggered = drop_bps >= self.config.price_trigger_drop_bps && !debounced;
            if triggered {
                state.last_trigger_at = Some(Instant::now());
                state.baseline = price;
            }
            (triggered, update.block_number)
        };

        if !triggered {
            return;
        }

        info!(oracle = %update.oracle, asset = %update.asset, price, block_tag, "price trigger fired");
        let _ = self.events_tx.send(RealTimeEvent::Transmit {
            oracle: update.oracle,
            asset: update.asset,
            tx_hash: update.tx_hash,
            pending: false,
        });

        let borrowers = self.borrowers.get_borrowers(update.asset);
        for user in borrowers.into_iter().take(self.config.trigger_max_scan) {
            let svc = self.clone();
            tokio::spawn(async move {
                svc.verify_and_emit(user, block_tag, TriggerKind::PriceShock).await;
            });
        }
    }

    async fn run_price_transmissions(self: Arc<Self>) -> anyhow::Result<()> {
        self.run_listener_loop("price_transmissions", |svc| {
            let listener = svc.listener.clone();
            async move { listener.subscribe_price_transmissions().await }
        }, |svc, t: PriceTransmission| async move {
            let _ = svc.events_tx.send(RealTimeEvent::Transmit {
                oracle: t.oracle,
                asset: t.asset,
                tx_hash: t.tx_hash,
                pending: false,
            });
        })
        .await
    }

    async fn run_pending_transmits(self: Arc<Self>) -> anyhow::Result<()> {
        self.run_listener_loop("pending_transmits", |svc| {
            let listener = svc.listener.clone();
            async move { listener.subscribe_pending_transmits().await }
        }, |svc, t: PendingTransmit| async move {
            let _ = svc.events_tx.send(RealTimeEvent::Transmit {
                oracle: t.oracle,
                asset: t.asset,
                tx_hash: t.tx_hash,
                pending: true,
            });
        })
        .await
    }

    async fn run_pool_events(self: Arc<Self>) -> anyhow::Result<()> {
        self.run_listener_loop("pool_events", |svc| {
            let listener = svc.listener.clone();
            async move { listener.subscribe_pool_events().await }
        }, |svc, event: PoolEvent| async move {
            svc.handle_pool_event(event).await;
        })
        .await
    }

    async fn handle_pool_event(self: Arc<Self>, event: PoolEvent) {
        match event {
            PoolEvent::LiquidationCall {
                collateral_asset,
                debt_asset,
                user,
                block_number,
                ..
            } => {
                let svc = self.clone();
                tokio::spawn(async move {
                    svc.verify_and_emit(user, block_number, TriggerKind::LiquidationRefresh).await;
                });

                for reserve in [collateral_asset, debt_asset] {
                    let co_borrowers = self.borrowers.get_borrowers(reserve);
                    for co_borrower in co_borrowers.into_iter().take(self.config.trigger_max_scan) {
                        if co_borrower == user {
                            continue;
                        }
                        let svc = self.clone();
                        tokio::spawn(async move {
                            svc.verify_and_emit(co_borrower, block_number, TriggerKind::LiquidationRefresh).await;
                        });
                    }
                }
            }
            PoolEvent::Borrow { reserve, .. } => {
                self.borrowers.insert(reserve, event.user());
            }
            PoolEvent::Supply { .. } | PoolEvent::Withdraw { .. } | PoolEvent::Repay { .. } => {}
        }
    }

    /// Generic reconnect-with-backoff wrapper shared by every subscription
    /// loop: (re)subscribe, drain items through `handle` until the stream
    /// ends or subscribing fails, then back off and retry.
    async fn run_listener_loop<S, Sub, SubFut, H, HFut>(
        self: &Arc<Self>,
        label: &'static str,
        mut subscribe: Sub,
        handle: H,
    ) -> anyhow::Result<()>
    where
        S: futures::Stream + Unpin,
        Sub: FnMut(&Arc<Self>) -> SubFut,
        SubFut: Future<Output = anyhow::Result<std::pin::Pin<Box<S>>>>,
        H: Fn(Arc<Self>, S::Item) -> HFut,
        HFut: Future<Output = ()>,
    {
        let mut backoff = self.config.reconnect_initial_backoff_ms;
        loop {
            match subscribe(self).await {
                Ok(mut stream) => {
                    backoff = self.config.reconnect_initial_backoff_ms;
                    while let Some(item) = stream.next().await {
                        handle(self.clone(), item).await;
                    }
                    warn!(label, "listener stream ended, reconnecting");
                }
                Err(err) => {
                    warn!(label, %err, "listener subscribe failed, reconnecting");
                }
            }
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            backoff = (backoff * 2).min(self.config.reconnect_max_backoff_ms);
        }
    }

    /// Admission-gated verify: acquires `(trigger, user, block_tag)` in the
    /// scan registry, verifies (via the single-flight cache, with timeout
    /// and retry), and updates the candidate set and hotlist. Emits a
    /// `Liquidatable` event when the verified HF is below 1.0.
    #[instrument(skip(self), fields(%user, block_tag, ?trigger))]
    async fn verify_and_emit(self: Arc<Self>, user: Address, block_tag: u64, trigger: TriggerKind) {
        let key = ScanKey::new(format!("{trigger:?}"), Some(format!("{user:#x}")), block_tag);
        if !self.scan_registry.acquire(key.clone()) {
            return;
        }

        let verifier = self.verifier.clone();
        let timeout = Duration::from_millis(self.config.chunk_timeout_ms);
        let attempts = self.config.chunk_retry_attempts.max(1);

        let result = self
            .verify_cache
            .get_or_create_inflight(user, block_tag, || async move {
                let mut last_err = "verify failed".to_string();
                for attempt in 0..attempts {
                    match tokio::time::timeout(timeout, verifier.verify_one(user, block_tag, trigger)).await {
                        Ok(Ok(account)) => return Ok(to_verified(&account)),
                        Ok(Err(e)) => last_err = e.to_string(),
                        Err(_) => last_err = "verify timed out".to_string(),
                    }
                    if attempt + 1 < attempts {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
                Err(last_err)
            })
            .await;

        self.scan_registry.release(key);

        let account = match result {
            Ok(v) => v,
            Err(err) => {
                warn!(%user, block_tag, %err, "micro-verify failed after retries");
                return;
            }
        };

        self.candidates.upsert(user, account.hf, block_tag, EntryReason::BorrowEvent);
        self.candidates.record_scan(user, account.hf, block_tag);

        let debt_usd = base_to_usd(account.total_debt_base);
        self.hotlist.consider(user, account.hf, debt_usd);

        if account.hf < 1.0 {
            info!(%user, hf = account.hf, block_tag, ?trigger, "liquidatable user detected");
            let _ = self.events_tx.send(RealTimeEvent::Liquidatable {
                user,
                hf: account.hf,
                block_tag,
                trigger,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{CandidateSetConfig, HotlistConfig};
    use crate::reserve_index::IndexDelta;
    use crate::scan_registry::ScanRegistryConfig;
    use alloy::primitives::U256;
    use liquidator_chain::MicroVerifierConfig;

    fn make_service() -> Arc<RealTimeHFService> {
        let listener = Arc::new(EventListener::new("ws://localhost:8546", Address::ZERO, vec![]));
        let verifier = Arc::new(MicroVerifier::new(
            "http://localhost:8545",
            Address::ZERO,
            Address::ZERO,
            MicroVerifierConfig::default(),
        ));
        let candidates = Arc::new(CandidateSet::new(CandidateSetConfig::default()));
        let hotlist = Arc::new(HotlistManager::new(HotlistConfig::default()));
        let scan_registry = Arc::new(ScanRegistry::new(ScanRegistryConfig::default()));
        let reserve_index = Arc::new(ReserveIndexTracker::default());
        let verify_cache = Arc::new(MicroVerifyCache::new());
        let borrowers = Arc::new(BorrowersIndex::new(&Default::default()));

        Arc::new(RealTimeHFService::new(
            listener,
            verifier,
            candidates,
            hotlist,
            scan_registry,
            reserve_index,
            verify_cache,
            borrowers,
            RealTimeServiceConfig::default(),
        ))
    }

    #[test]
    fn reserve_update_escalates_to_index_jump_above_threshold() {
        let svc = make_service();
        let small = IndexDelta {
            liquidity_delta_bps: 10,
            borrow_delta_bps: 0,
        };
        let big = IndexDelta {
            liquidity_delta_bps: 100,
            borrow_delta_bps: 0,
        };
        assert!(small.max_abs_bps() < svc.config.index_jump_bps_trigger);
        assert!(big.max_abs_bps() >= svc.config.index_jump_bps_trigger);
    }

    #[tokio::test]
    async fn new_head_updates_current_block_and_rolls_verifier() {
        let svc = make_service();
        svc.clone().handle_new_head(12345).await;
        assert_eq!(svc.current_block(), 12345);
    }

    #[tokio::test]
    async fn pool_borrow_event_registers_borrower() {
        let svc = make_service();
        let reserve = Address::repeat_byte(7);
        let user = Address::repeat_byte(9);
        svc.clone()
            .handle_pool_event(PoolEvent::Borrow {
                reserve,
                user,
                on_behalf_of: user,
                amount: U256::from(1_000u64),
                block_number: 10,
                tx_hash: B256::ZERO,
            })
            .await;
        assert_eq!(svc.borrowers.get_borrowers(reserve), vec![user]);
    }

    #[test]
    fn price_feed_state_tracks_baseline_and_last_answer() {
        let state = PriceFeedState {
            baseline: 100.0,
            last_answer: 100.0,
            last_trigger_at: None,
        };
        assert_eq!(state.baseline, state.last_answer);
    }
}
