//! Structured decision traces for post-hoc miss/race analysis.
//!
//! Grounded on the former `position_tracker.rs`'s `DashMap`-of-`Vec`
//! keying style.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Attempt,
    Skip,
    Revert,
}

#[derive(Debug, Clone)]
pub struct AttemptMeta {
    pub tx_hash: Option<String>,
    pub sent_private: bool,
}

#[derive(Debug, Clone)]
pub struct DecisionTrace {
    pub user: Address,
    pub ts: u64,
    pub action: DecisionAction,
    pub reason: String,
    pub hf_at_decision: f64,
    pub hf_prev_block: f64,
    pub est_debt_usd: f64,
    pub est_profit_usd: f64,
    pub gas_price_gwei: f64,
    pub head_lag_blocks: u64,
    pub gas_threshold_gwei: f64,
    pub attempt_meta: Option<AttemptMeta>,
}

/// Default retention window.
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Traces retained for at least `retention` seconds, keyed by `(user, ts)`.
pub struct DecisionTraceStore {
    retention: Duration,
    traces: DashMap<Address, Vec<DecisionTrace>>,
}

impl DecisionTraceStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            traces: DashMap::new(),
        }
    }

    pub fn record(&self, trace: DecisionTrace) {
        self.traces.entry(trace.user).or_default().push(trace);
    }

    /// Drop traces older than the retention window across all users.
    pub fn prune(&self, now_unix: u64) {
        let retention_secs = self.retention.as_secs();
        self.traces.retain(|_, traces| {
            traces.retain(|t| now_unix.saturating_sub(t.ts) <= retention_secs);
            !traces.is_empty()
        });
    }

    /// Most recent trace for `user` within `window_secs` before `event_ts`
    /// (default window is 10s).
    pub fn find_decision(&self, user: Address, event_ts: u64, window_secs: u64) -> Option<DecisionTrace> {
        let entry = self.traces.get(&user)?;
        entry
            .iter()
            .filter(|t| t.ts <= event_ts && event_ts.saturating_sub(t.ts) <= window_secs)
            .max_by_key(|t| t.ts)
            .cloned()
    }

    /// Whether any trace for `user` recorded HF < 1.0 before `before_ts`.
    pub fn has_prior_hf_below_one(&self, user: Address, before_ts: u64) -> bool {
        match self.traces.get(&user) {
            Some(entry) => entry
                .iter()
                .any(|t| t.ts < before_ts && (t.hf_at_decision < 1.0 || t.hf_prev_block < 1.0)),
            None => false,
        }
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(user: Address, ts: u64, action: DecisionAction, reason: &str) -> DecisionTrace {
        DecisionTrace {
            user,
            ts,
            action,
            reason: reason.to_string(),
            hf_at_decision: 0.97,
            hf_prev_block: 0.97,
            est_debt_usd: 1000.0,
            est_profit_usd: 10.0,
            gas_price_gwei: 1.0,
            head_lag_blocks: 0,
            gas_threshold_gwei: 2.0,
            attempt_meta: None,
        }
    }

    #[test]
    fn finds_most_recent_trace_within_window() {
        let store = DecisionTraceStore::new(Duration::from_secs(DEFAULT_RETENTION_SECS));
        let user = Address::repeat_byte(1);
        store.record(trace(user, 100, DecisionAction::Skip, "gas too low"));
        store.record(trace(user, 105, DecisionAction::Skip, "still too low"));

        let found = store.find_decision(user, 108, 10).unwrap();
        assert_eq!(found.ts, 105);
    }

    #[test]
    fn respects_window_bound() {
        let store = DecisionTraceStore::new(Duration::from_secs(DEFAULT_RETENTION_SECS));
        let user = Address::repeat_byte(1);
        store.record(trace(user, 50, DecisionAction::Skip, "old"));

        assert!(store.find_decision(user, 100, 10).is_none());
    }

    #[test]
    fn prune_drops_old_entries() {
        let store = DecisionTraceStore::new(Duration::from_secs(10));
        let user = Address::repeat_byte(1);
        store.record(trace(user, 0, DecisionAction::Skip, "old"));
        store.prune(100);
        assert!(store.find_decision(user, 100, 1000).is_none());
    }
}
