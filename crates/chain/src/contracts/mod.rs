//! Contract bindings for an Aave-v3-style lending protocol.
//!
//! This module provides type definitions and ABI constants for the Pool,
//! Chainlink-compatible oracle aggregators, and ERC-20 tokens.

pub mod aave_v3;
pub mod common;

pub use aave_v3::IProtocolDataProvider;

use alloy::primitives::B256;

/// Event signature constants gathered from the pool and common modules.
pub mod event_signatures {
    pub use super::aave_v3::aave_v3_signatures::*;
    pub use super::common::common_signatures::ANSWER_UPDATED;

    use alloy::primitives::B256;

    /// Pool events the engine subscribes to directly (excludes
    /// `ReserveDataUpdated`, which is filtered for separately).
    pub fn pool_signatures() -> Vec<B256> {
        super::aave_v3::aave_v3_signatures::pool_signatures()
    }
}

/// Pool contract wrapper for event filtering.
pub struct PoolContract {
    pub address: alloy::primitives::Address,
}

impl PoolContract {
    pub fn new(address: alloy::primitives::Address) -> Self {
        Self { address }
    }

    /// Get event signatures for subscription.
    pub fn event_signatures() -> Vec<B256> {
        event_signatures::pool_signatures()
    }
}

/// Oracle aggregator utilities.
pub struct OracleAggregator;

impl OracleAggregator {
    /// Get event signature for AnswerUpdated.
    pub fn answer_updated_signature() -> B256 {
        event_signatures::ANSWER_UPDATED
    }

    /// Get event signature for NewTransmission (OCR2 aggregators).
    pub fn new_transmission_signature() -> B256 {
        common::common_signatures::new_transmission()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_signatures() {
        let sigs = PoolContract::event_signatures();
        assert_eq!(sigs.len(), 5);

        let answer_sig = OracleAggregator::answer_updated_signature();
        assert!(!answer_sig.is_zero());
    }
}
