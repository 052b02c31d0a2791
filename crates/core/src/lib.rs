//! Core liquidation engine logic for an Aave-v3-style lending protocol.
//!
//! This crate provides:
//! - Decimal/WAD/RAY math and health-factor calculation
//! - Token metadata and active-borrower indexing
//! - Reserve-index tracking and health-factor projection
//! - The active candidate universe and near-threshold hotlist
//! - Pre-simulation and micro-verification caching
//! - Periodic priority-sweep re-scoring of the full borrower universe
//! - Profitability and risk-gate evaluation
//! - Per-trigger scan admission control
//! - Decision tracing and post-hoc miss classification
//! - Historical block-range replay against ground truth

pub mod borrowers_index;
pub mod candidate;
pub mod config;
pub mod decimal;
pub mod decision_trace;
pub mod error;
pub mod hf;
pub mod micro_verify_cache;
pub mod miss_classifier;
pub mod pre_sim_cache;
pub mod priority_sweep;
pub mod profit;
pub mod realtime_service;
pub mod replay;
pub mod reserve_index;
pub mod reserve_resolver;
pub mod risk;
pub mod scan_registry;
pub mod subgraph_poller;
pub mod token_metadata;
pub mod u256_math;

pub use borrowers_index::{BorrowersIndex, BorrowersIndexConfig, BorrowersIndexMode, SharedBorrowersIndex};
pub use candidate::{
    Candidate, CandidateSet, CandidateSetConfig, EntryReason, HotlistConfig, HotlistEntry,
    HotlistManager, HotlistWeights,
};
pub use config::{config, init_config, EngineConfig};
pub use decimal::DecimalError;
pub use decision_trace::{AttemptMeta, DecisionAction, DecisionTrace, DecisionTraceStore};
pub use error::EngineError;
pub use hf::{calculate_hf, calculate_hf_batch, project_hf, ReserveSnapshot, UserSnapshot};
pub use micro_verify_cache::{MicroVerifyCache, VerifiedHf};
pub use miss_classifier::{MissClassification, MissClassifier, MissContext, MissReason, MissRow, MissRowLogger};
pub use pre_sim_cache::{PreSimCache, PreSimCacheStats, PreSimFingerprint, PreSimPlan};
pub use priority_sweep::{PrioritySet, PrioritySweepConfig, PrioritySweepRunner, SweepWeights};
pub use profit::{ProfitEngine, ProfitEngineConfig, ProfitResult, ReserveRisk, UserRiskSnapshot};
pub use realtime_service::{RealTimeEvent, RealTimeHFService, RealTimeServiceConfig};
pub use reserve_index::{HFPredictor, IndexDelta, ReserveIndexTracker};
pub use reserve_resolver::{resolve_user_risk_snapshot, ReserveMeta};
pub use risk::{DenyReason, Opportunity, RiskDecision, RiskManager, RiskManagerConfig};
pub use scan_registry::{ScanKey, ScanRegistry, ScanRegistryConfig};
pub use subgraph_poller::{PollSnapshot, SubgraphPoller, SubgraphPollerConfig};
pub use token_metadata::{MetadataSource, TokenMetadata, TokenMetadataRegistry};
