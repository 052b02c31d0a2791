//! `MissReason` classification and JSONL row logging for observed
//! liquidations.
//!
//! The ordered-rule-evaluation shape mirrors [`crate::risk::RiskManager`]'s
//! gate ladder and the former `liquidator.rs::execute_with_retry`'s
//! string-match-then-branch error classification, upgraded to a typed
//! enum per the idiomatic-Rust convention rather than string matching.

use alloy::primitives::Address;
use serde::Serialize;
use tracing::error;

use crate::decision_trace::{DecisionAction, DecisionTrace, DecisionTraceStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    NotInWatchSet,
    Raced,
    LateDetection,
    LateSend,
    HfTransient,
    InsufficientProfit,
    ExecutionFiltered,
    Revert,
    GasOutbid,
    OracleJitter,
    Unknown,
}

/// Context passed to the classifier for one observed on-chain liquidation.
pub struct MissContext<'a> {
    pub user: Address,
    pub liquidator: Address,
    pub our_address: Address,
    pub event_ts: u64,
    pub in_watch_set: bool,
    pub decision: Option<&'a DecisionTrace>,
    pub blocks_since_first_seen: Option<u64>,
    pub transient_blocks: u64,
}

#[derive(Debug, Clone)]
pub struct MissClassification {
    pub reason: MissReason,
    pub blocks_since_first_seen: Option<u64>,
    pub annotated_transient: bool,
}

fn is_gas_related(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    lower.contains("gas")
}

fn is_profit_related(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    lower.contains("profit") || lower.contains("unprofitable")
}

/// Applies an ordered rule set: liquidator match, watch-set membership,
/// decision presence, then decision outcome.
pub struct MissClassifier;

impl MissClassifier {
    pub fn classify(ctx: &MissContext) -> MissClassification {
        if ctx.liquidator == ctx.our_address {
            return MissClassification {
                reason: MissReason::Raced,
                blocks_since_first_seen: ctx.blocks_since_first_seen,
                annotated_transient: false,
            };
        }

        if !ctx.in_watch_set {
            return MissClassification {
                reason: MissReason::NotInWatchSet,
                blocks_since_first_seen: None,
                annotated_transient: false,
            };
        }

        let decision = match ctx.decision {
            None => {
                let has_prior = ctx.blocks_since_first_seen.is_some();
                return if !has_prior {
                    MissClassification {
                        reason: MissReason::LateDetection,
                        blocks_since_first_seen: None,
                        annotated_transient: false,
                    }
                } else {
                    let blocks = ctx.blocks_since_first_seen.unwrap_or(0);
                    MissClassification {
                        reason: MissReason::LateSend,
                        blocks_since_first_seen: Some(blocks),
                        annotated_transient: blocks <= ctx.transient_blocks,
                    }
                };
            }
            Some(d) => d,
        };

        match decision.action {
            DecisionAction::Revert => MissClassification {
                reason: MissReason::Revert,
                blocks_since_first_seen: ctx.blocks_since_first_seen,
                annotated_transient: false,
            },
            DecisionAction::Skip => {
                let reason = if is_gas_related(&decision.reason)
                    && decision.gas_price_gwei < decision.gas_threshold_gwei
                {
                    MissReason::GasOutbid
                } else if is_profit_related(&decision.reason) {
                    MissReason::InsufficientProfit
                } else {
                    MissReason::ExecutionFiltered
                };
                MissClassification {
                    reason,
                    blocks_since_first_seen: ctx.blocks_since_first_seen,
                    annotated_transient: false,
                }
            }
            DecisionAction::Attempt => {
                let reason = if decision.gas_price_gwei < decision.gas_threshold_gwei {
                    MissReason::GasOutbid
                } else {
                    MissReason::Raced
                };
                MissClassification {
                    reason,
                    blocks_since_first_seen: ctx.blocks_since_first_seen,
                    annotated_transient: false,
                }
            }
        }
    }

    /// Convenience wrapper over a `DecisionTraceStore` lookup.
    pub fn classify_from_store(
        store: &DecisionTraceStore,
        user: Address,
        liquidator: Address,
        our_address: Address,
        event_ts: u64,
        in_watch_set: bool,
        blocks_since_first_seen: Option<u64>,
        transient_blocks: u64,
    ) -> MissClassification {
        let decision = store.find_decision(user, event_ts, 10);
        Self::classify(&MissContext {
            user,
            liquidator,
            our_address,
            event_ts,
            in_watch_set,
            decision: decision.as_ref(),
            blocks_since_first_seen,
            transient_blocks,
        })
    }
}

/// A single structured JSON line describing one observed liquidation.
#[derive(Debug, Clone, Serialize)]
pub struct MissRow {
    pub user: String,
    pub liquidator: String,
    pub tx_hash: String,
    pub event_ts: u64,
    pub reason: MissReason,
    pub blocks_since_first_seen: Option<u64>,
    pub hf_threshold_bps: u32,
    pub gas_threshold_gwei: f64,
    pub competitor_gas_price_gwei: Option<f64>,
    pub detection_to_event_latency_ms: Option<i64>,
}

/// Writes one JSON line per observed liquidation.
pub struct MissRowLogger;

impl MissRowLogger {
    pub fn log(row: &MissRow) {
        match serde_json::to_string(row) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(error = %e, "failed to serialize miss row"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_trace::now_unix;

    fn decision(action: DecisionAction, reason: &str, gas: f64, threshold: f64) -> DecisionTrace {
        DecisionTrace {
            user: Address::repeat_byte(1),
            ts: now_unix(),
            action,
            reason: reason.to_string(),
            hf_at_decision: 0.97,
            hf_prev_block: 0.97,
            est_debt_usd: 1000.0,
            est_profit_usd: 10.0,
            gas_price_gwei: gas,
            head_lag_blocks: 0,
            gas_threshold_gwei: threshold,
            attempt_meta: None,
        }
    }

    #[test]
    fn classifies_late_send_with_transient_annotation() {
        let ctx = MissContext {
            user: Address::repeat_byte(1),
            liquidator: Address::repeat_byte(2),
            our_address: Address::repeat_byte(9),
            event_ts: 100,
            in_watch_set: true,
            decision: None,
            blocks_since_first_seen: Some(2),
            transient_blocks: 3,
        };
        let result = MissClassifier::classify(&ctx);
        assert_eq!(result.reason, MissReason::LateSend);
        assert_eq!(result.blocks_since_first_seen, Some(2));
        assert!(result.annotated_transient);
    }

    #[test]
    fn classifies_gas_outbid_from_skip_decision() {
        let d = decision(DecisionAction::Skip, "gas_price too low", 0.5, 2.0);
        let ctx = MissContext {
            user: Address::repeat_byte(1),
            liquidator: Address::repeat_byte(2),
            our_address: Address::repeat_byte(9),
            event_ts: 100,
            in_watch_set: true,
            decision: Some(&d),
            blocks_since_first_seen: Some(1),
            transient_blocks: 3,
        };
        let result = MissClassifier::classify(&ctx);
        assert_eq!(result.reason, MissReason::GasOutbid);
    }

    #[test]
    fn liquidator_match_is_raced() {
        let us = Address::repeat_byte(9);
        let ctx = MissContext {
            user: Address::repeat_byte(1),
            liquidator: us,
            our_address: us,
            event_ts: 100,
            in_watch_set: true,
            decision: None,
            blocks_since_first_seen: None,
            transient_blocks: 3,
        };
        assert_eq!(MissClassifier::classify(&ctx).reason, MissReason::Raced);
    }

    #[test]
    fn not_in_watch_set_short_circuits() {
        let ctx = MissContext {
            user: Address::repeat_byte(1),
            liquidator: Address::repeat_byte(2),
            our_address: Address::repeat_byte(9),
            event_ts: 100,
            in_watch_set: false,
            decision: None,
            blocks_since_first_seen: None,
            transient_blocks: 3,
        };
        assert_eq!(MissClassifier::classify(&ctx).reason, MissReason::NotInWatchSet);
    }
}
