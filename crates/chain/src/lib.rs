//! Chain interaction layer for an Aave-v3-style lending protocol on an EVM L2.
//!
//! This crate provides:
//! - Provider management for HTTP and WebSocket connections
//! - Contract bindings for the Pool and common (ERC-20/Chainlink) interfaces
//! - Event listeners for real-time reserve, oracle, and pool events
//! - Oracle price monitoring and caching
//! - Batched `getUserAccountData` micro-verification via Multicall3
//! - Gas ladder pricing and hedged dual-RPC reads
//! - Calldata templating and public/private/shadow transaction submission

pub mod contracts;
pub mod executor;
mod event_listener;
pub mod gas_ladder;
pub mod hedged;
pub mod multicall;
mod oracle_monitor;
mod provider;

pub use contracts::{event_signatures, IProtocolDataProvider, OracleAggregator, PoolContract};
pub use event_listener::{
    EventListener, OracleType, OracleUpdate, PendingTransmit, PoolEvent, PriceTransmission,
    ReserveUpdate,
};
pub use executor::{ExecutionOutcome, ExecutorConfig, FallbackMode, LiquidationExecutor, SubmissionMode};
pub use gas_ladder::{GasLadder, GasLadderConfig, GasPlan, GasTier};
pub use hedged::{HedgedError, HedgedProvider, HedgedProviderConfig};
pub use multicall::{MicroVerifier, MicroVerifierConfig, MicroVerifyError, TriggerKind, UserAccountData};
pub use oracle_monitor::{OracleMonitor, OraclePrice};
pub use provider::ProviderManager;
