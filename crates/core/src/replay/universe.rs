//! Seeds the replay's active-user universe from ground truth.

use alloy::primitives::Address;
use liquidator_api::LiquidationCallEvent;
use std::collections::HashSet;

use crate::candidate::{CandidateSet, EntryReason};

/// Seeds `candidate_set` with every user that appears in `events`,
/// tagged `ReplaySeed`.
pub struct UniverseBuilder;

impl UniverseBuilder {
    pub fn seed(candidate_set: &CandidateSet, events: &[LiquidationCallEvent], start_block: u64) {
        let mut seen: HashSet<Address> = HashSet::new();
        for event in events {
            if seen.insert(event.user) {
                candidate_set.upsert(event.user, 1.0, start_block, EntryReason::ReplaySeed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateSetConfig;
    use alloy::primitives::U256;

    fn event(user_byte: u8) -> LiquidationCallEvent {
        LiquidationCallEvent {
            block_number: 1,
            timestamp: 1,
            tx_hash: "0x0".to_string(),
            liquidator: Address::ZERO,
            user: Address::repeat_byte(user_byte),
            collateral_asset: Address::ZERO,
            debt_asset: Address::ZERO,
            debt_to_cover: U256::from(1u64),
            liquidated_collateral_amount: U256::from(1u64),
        }
    }

    #[test]
    fn seeds_unique_users_from_ground_truth() {
        let set = CandidateSet::new(CandidateSetConfig::default());
        UniverseBuilder::seed(&set, &[event(1), event(2), event(1)], 100);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Address::repeat_byte(1)));
        assert!(set.contains(Address::repeat_byte(2)));
    }
}
