//! Reserve liquidity/borrow index tracking and linear HF prediction.
//!
//! Grounded on a `DashMap<Address, _>`-by-asset indexing shape and a
//! linear-approximation style for the delta-HF projection.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;

use crate::decimal;

/// Clamp applied to any single bps-delta computation.
const MAX_DELTA_BPS: i64 = 100_000;

/// Default skip-recheck threshold: deltas below this are considered noise.
pub const DEFAULT_MIN_INDEX_DELTA_BPS: i64 = 2;

/// Placeholder sensitivity constant from the HFPredictor rule. Kept
/// verbatim; not a tuned model.
const HF_PREDICTION_SCALE: f64 = 0.001;

/// Last-seen (liquidityIndex, variableBorrowIndex) for a reserve, in RAY.
#[derive(Debug, Clone, Copy)]
struct ReserveIndices {
    liquidity_index: U256,
    variable_borrow_index: U256,
}

/// Result of applying a new pair of reserve indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexDelta {
    pub liquidity_delta_bps: i64,
    pub borrow_delta_bps: i64,
}

impl IndexDelta {
    pub fn max_abs_bps(&self) -> i64 {
        self.liquidity_delta_bps.abs().max(self.borrow_delta_bps.abs())
    }
}

/// Tracks per-reserve RAY indices and computes clamped bps-deltas on update.
pub struct ReserveIndexTracker {
    last: DashMap<Address, ReserveIndices>,
    min_index_delta_bps: i64,
}

impl ReserveIndexTracker {
    pub fn new(min_index_delta_bps: i64) -> Self {
        Self {
            last: DashMap::new(),
            min_index_delta_bps,
        }
    }

    /// Record a new pair of indices for `reserve`, returning the delta
    /// versus the previous observation (`None` on first sight).
    pub fn update(
        &self,
        reserve: Address,
        liquidity_index: U256,
        variable_borrow_index: U256,
    ) -> Option<IndexDelta> {
        let previous = self.last.insert(
            reserve,
            ReserveIndices {
                liquidity_index,
                variable_borrow_index,
            },
        )?;

        let liquidity_delta_bps = decimal::pct_diff_bps(previous.liquidity_index, liquidity_index)
            .clamp(-MAX_DELTA_BPS, MAX_DELTA_BPS);
        let borrow_delta_bps =
            decimal::pct_diff_bps(previous.variable_borrow_index, variable_borrow_index)
                .clamp(-MAX_DELTA_BPS, MAX_DELTA_BPS);

        Some(IndexDelta {
            liquidity_delta_bps,
            borrow_delta_bps,
        })
    }

    /// Whether this delta is small enough that a full recheck can be
    /// skipped for borrowers of this reserve.
    pub fn should_skip_recheck(&self, delta: &IndexDelta) -> bool {
        delta.max_abs_bps() < self.min_index_delta_bps
    }
}

impl Default for ReserveIndexTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INDEX_DELTA_BPS)
    }
}

/// Approximates HF movement from a reserve index delta without a full
/// position recalculation.
///
/// Rule: `ΔHF ≈ −(borrowΔ − liquidityΔ) / 100 · 0.001`. This is a stated
/// placeholder, not a calibrated sensitivity model — implemented verbatim.
pub struct HFPredictor {
    hf_pred_critical: f64,
}

impl HFPredictor {
    pub fn new(hf_pred_critical: f64) -> Self {
        Self { hf_pred_critical }
    }

    pub fn project(&self, current_hf: f64, delta: &IndexDelta) -> f64 {
        let delta_hf = -((delta.borrow_delta_bps - delta.liquidity_delta_bps) as f64) / 100.0
            * HF_PREDICTION_SCALE;
        current_hf + delta_hf
    }

    pub fn is_predicted_critical(&self, current_hf: f64, delta: &IndexDelta) -> bool {
        self.project(current_hf, delta) < self.hf_pred_critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_has_no_delta() {
        let tracker = ReserveIndexTracker::default();
        let reserve = Address::repeat_byte(1);
        assert!(tracker
            .update(reserve, decimal::RAY, decimal::RAY)
            .is_none());
    }

    #[test]
    fn computes_bps_delta_on_subsequent_update() {
        let tracker = ReserveIndexTracker::default();
        let reserve = Address::repeat_byte(1);
        tracker.update(reserve, decimal::RAY, decimal::RAY);

        let bumped_liquidity = decimal::RAY + decimal::RAY / U256::from(1000u64); // +0.1%
        let delta = tracker
            .update(reserve, bumped_liquidity, decimal::RAY)
            .unwrap();

        assert_eq!(delta.liquidity_delta_bps, 10);
        assert_eq!(delta.borrow_delta_bps, 0);
    }

    #[test]
    fn skip_recheck_below_threshold() {
        let tracker = ReserveIndexTracker::new(5);
        let delta = IndexDelta {
            liquidity_delta_bps: 2,
            borrow_delta_bps: -1,
        };
        assert!(tracker.should_skip_recheck(&delta));

        let big_delta = IndexDelta {
            liquidity_delta_bps: 10,
            borrow_delta_bps: 0,
        };
        assert!(!tracker.should_skip_recheck(&big_delta));
    }

    #[test]
    fn predictor_applies_rule_verbatim() {
        let predictor = HFPredictor::new(1.0);
        let delta = IndexDelta {
            liquidity_delta_bps: 0,
            borrow_delta_bps: 1000, // borrow index up 10%
        };
        // -(1000 - 0) / 100 * 0.001 = -0.01
        let projected = predictor.project(1.02, &delta);
        assert!((projected - 1.01).abs() < 1e-9);
        assert!(!predictor.is_predicted_critical(1.02, &delta));

        let big_delta = IndexDelta {
            liquidity_delta_bps: 0,
            borrow_delta_bps: 400_000, // clamp territory handled upstream
        };
        let projected_big = predictor.project(1.02, &big_delta);
        assert!(predictor.is_predicted_critical(1.02, &big_delta) || projected_big < 1.0);
    }
}
