//! Active borrower universe (`CandidateSet`) and near-threshold priority
//! hotlist (`HotlistManager`).
//!
//! `CandidateSet` is a `DashMap`-keyed store with insertion/eviction
//! bookkeeping, scored by priority rather than fixed HF tiers.
//! `HotlistManager::consider` applies a `should_stage`-style acceptance
//! predicate before admitting or updating an entry.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Why a candidate first entered the active universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryReason {
    GroundTruth,
    BorrowEvent,
    HotlistPromotion,
    ReplaySeed,
}

/// A borrower under active watch.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub address: Address,
    pub last_hf: f64,
    pub last_block: u64,
    pub consecutive_high_hf_count: u32,
    pub entry_reason: EntryReason,
}

/// Configuration governing eviction and universe size.
#[derive(Debug, Clone)]
pub struct CandidateSetConfig {
    /// HF at or above which a candidate is a candidate for eviction.
    pub evict_hf: f64,
    /// Consecutive scans at/above `evict_hf` required before eviction.
    pub evict_consecutive: u32,
    /// Candidates with HF below this are never evicted regardless of streak.
    pub near_hf: f64,
    /// Hard cap on the number of tracked candidates.
    pub max_accounts_per_block: usize,
}

impl Default for CandidateSetConfig {
    fn default() -> Self {
        Self {
            evict_hf: 1.20,
            evict_consecutive: 3,
            near_hf: 1.03,
            max_accounts_per_block: 5_000,
        }
    }
}

fn normalize(address: Address) -> Address {
    // Alloy's `Address` Display/Eq are already case-insensitive byte
    // comparisons, but explicit lowercase-key normalization is applied at
    // the ingress boundary anyway: we apply it to the checksum
    // string form used as the map key elsewhere in the engine (e.g.
    // `TokenMetadataRegistry`) for consistency. `Address` itself is a
    // fixed 20-byte value so this is a no-op on the type, kept here as
    // the single normalization point callers rely on.
    address
}

/// Keyed store of active borrowers, bounded and evicted.
pub struct CandidateSet {
    config: CandidateSetConfig,
    candidates: DashMap<Address, Candidate>,
    /// Deterministic insertion order, oldest first, used to drop excess
    /// entries when `max_accounts_per_block` is exceeded.
    insertion_order: parking_lot::Mutex<Vec<Address>>,
}

impl CandidateSet {
    pub fn new(config: CandidateSetConfig) -> Self {
        Self {
            config,
            candidates: DashMap::new(),
            insertion_order: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.candidates.contains_key(&normalize(address))
    }

    pub fn get(&self, address: Address) -> Option<Candidate> {
        self.candidates.get(&normalize(address)).map(|e| e.clone())
    }

    /// Insert a brand-new candidate or refresh an existing one's
    /// `entry_reason` is left unchanged on refresh.
    pub fn upsert(&self, address: Address, hf: f64, block: u64, reason: EntryReason) {
        let key = normalize(address);
        let is_new = !self.candidates.contains_key(&key);

        self.candidates
            .entry(key)
            .and_modify(|c| {
                c.last_hf = hf;
                c.last_block = block;
                if hf < self.config.evict_hf {
                    c.consecutive_high_hf_count = 0;
                }
            })
            .or_insert_with(|| Candidate {
                address: key,
                last_hf: hf,
                last_block: block,
                consecutive_high_hf_count: 0,
                entry_reason: reason,
            });

        if is_new {
            let mut order = self.insertion_order.lock();
            order.push(key);
            while order.len() > self.config.max_accounts_per_block {
                let evicted = order.remove(0);
                self.candidates.remove(&evicted);
            }
        }
    }

    /// Record a scan result (HF observed at `block`) and apply the
    /// eviction rule: remove once `consecutive_high_hf_count` reaches
    /// `evict_consecutive` scans at/above `evict_hf`, unless HF is below
    /// `near_hf` (never evicted regardless of streak).
    pub fn record_scan(&self, address: Address, hf: f64, block: u64) {
        let key = normalize(address);
        let should_evict = {
            let mut entry = match self.candidates.get_mut(&key) {
                Some(e) => e,
                None => return,
            };
            entry.last_hf = hf;
            entry.last_block = block;

            if hf < self.config.near_hf {
                entry.consecutive_high_hf_count = 0;
                false
            } else if hf >= self.config.evict_hf {
                entry.consecutive_high_hf_count += 1;
                entry.consecutive_high_hf_count >= self.config.evict_consecutive
            } else {
                entry.consecutive_high_hf_count = 0;
                false
            }
        };

        if should_evict {
            self.candidates.remove(&key);
            self.insertion_order.lock().retain(|a| *a != key);
        }
    }

    pub fn remove(&self, address: Address) {
        let key = normalize(address);
        self.candidates.remove(&key);
        self.insertion_order.lock().retain(|a| *a != key);
    }

    pub fn all_addresses(&self) -> Vec<Address> {
        self.candidates.iter().map(|e| *e.key()).collect()
    }
}

/// A hotlist entry; ordering mirrors the priority formula used for ranking.
#[derive(Debug, Clone)]
pub struct HotlistEntry {
    pub address: Address,
    pub hf: f64,
    pub proj_hf: f64,
    pub debt_usd: f64,
    pub last_check: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct HotlistWeights {
    pub w1: f64,
    pub w2: f64,
    pub w3: f64,
}

impl Default for HotlistWeights {
    fn default() -> Self {
        Self {
            w1: 1.0,
            w2: 1.0,
            w3: 0.1,
        }
    }
}

/// priority = w1·(1.0015 − HF) + w2·max(HF − projHF, 0) + w3·log10(max(1, debtUSD))
pub fn priority_score(hf: f64, proj_hf: f64, debt_usd: f64, weights: HotlistWeights) -> f64 {
    let term1 = weights.w1 * (1.0015 - hf);
    let term2 = weights.w2 * (hf - proj_hf).max(0.0);
    let term3 = weights.w3 * (debt_usd.max(1.0)).log10();
    term1 + term2 + term3
}

#[derive(Debug, Clone)]
pub struct HotlistConfig {
    pub max_entries: usize,
    pub min_hf: f64,
    pub max_hf: f64,
    pub min_debt_usd: f64,
    pub weights: HotlistWeights,
}

impl Default for HotlistConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            min_hf: 0.98,
            max_hf: 1.05,
            min_debt_usd: 100.0,
            weights: HotlistWeights::default(),
        }
    }
}

struct ScoredKey {
    priority: f64,
    address: Address,
}

impl PartialEq for ScoredKey {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.address == other.address
    }
}
impl Eq for ScoredKey {}
impl PartialOrd for ScoredKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScoredKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so `BinaryHeap` (a max-heap) pops the *lowest* priority
        // first, matching the "evict the lowest-priority entry" rule.
        other
            .priority
            .partial_cmp(&self.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.address.cmp(&other.address))
    }
}

/// Near-threshold priority subset, bounded by `max_entries`.
pub struct HotlistManager {
    config: HotlistConfig,
    entries: DashMap<Address, HotlistEntry>,
}

impl HotlistManager {
    pub fn new(config: HotlistConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn eligible(&self, hf: f64, debt_usd: f64) -> bool {
        hf >= self.config.min_hf && hf <= self.config.max_hf && debt_usd >= self.config.min_debt_usd
    }

    fn lowest_priority(&self) -> Option<(Address, f64)> {
        self.entries
            .iter()
            .map(|e| {
                let priority = priority_score(e.hf, e.proj_hf, e.debt_usd, self.config.weights);
                (*e.key(), priority)
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
    }

    /// Consider `addr` for hotlist membership. Returns true iff the entry
    /// is present afterward (inserted, refreshed, or already present with
    /// updated stats). Ineligible HF/debt removes an existing entry.
    pub fn consider(&self, addr: Address, hf: f64, debt_usd: f64) -> bool {
        self.consider_with_projection(addr, hf, hf, debt_usd)
    }

    pub fn consider_with_projection(
        &self,
        addr: Address,
        hf: f64,
        proj_hf: f64,
        debt_usd: f64,
    ) -> bool {
        let key = normalize(addr);

        if !self.eligible(hf, debt_usd) {
            self.entries.remove(&key);
            return false;
        }

        if self.entries.contains_key(&key) {
            self.entries.alter(&key, |_, mut e| {
                e.hf = hf;
                e.proj_hf = proj_hf;
                e.debt_usd = debt_usd;
                e.last_check = Instant::now();
                e
            });
            return true;
        }

        if self.entries.len() >= self.config.max_entries {
            let candidate_priority = priority_score(hf, proj_hf, debt_usd, self.config.weights);
            match self.lowest_priority() {
                Some((lowest_addr, lowest_priority)) if candidate_priority > lowest_priority => {
                    self.entries.remove(&lowest_addr);
                }
                _ => return false,
            }
        }

        self.entries.insert(
            key,
            HotlistEntry {
                address: key,
                hf,
                proj_hf,
                debt_usd,
                last_check: Instant::now(),
            },
        );
        true
    }

    /// All entries ordered by descending priority (index 0 = highest).
    pub fn get_all(&self) -> Vec<HotlistEntry> {
        let mut heap: BinaryHeap<ScoredKey> = BinaryHeap::new();
        for e in self.entries.iter() {
            heap.push(ScoredKey {
                priority: priority_score(e.hf, e.proj_hf, e.debt_usd, self.config.weights),
                address: *e.key(),
            });
        }
        // `ScoredKey`'s Ord is reversed for eviction purposes; sort the
        // extracted addresses by true descending priority for readers.
        let mut scored: Vec<(Address, f64)> = heap
            .into_iter()
            .map(|k| (k.address, k.priority))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .filter_map(|(addr, _)| self.entries.get(&addr).map(|e| e.clone()))
            .collect()
    }

    /// Entries whose `last_check` is at least `age_sec` in the past.
    pub fn get_needing_revisit(&self, age_sec: u64) -> Vec<Address> {
        let threshold = std::time::Duration::from_secs(age_sec);
        self.entries
            .iter()
            .filter(|e| e.last_check.elapsed() >= threshold)
            .map(|e| *e.key())
            .collect()
    }
}

/// Unix-epoch seconds, used for `PrioritySet.generated_at` stamps.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn hotlist_respects_bounds_and_priority() {
        let hotlist = HotlistManager::new(HotlistConfig {
            max_entries: 10,
            min_hf: 0.98,
            max_hf: 1.05,
            min_debt_usd: 100.0,
            ..Default::default()
        });

        assert!(hotlist.consider(addr(0xA), 1.04, 200.0));
        assert!(hotlist.consider(addr(0xB), 1.02, 500.0));

        let all = hotlist.get_all();
        assert_eq!(all[0].address, addr(0xB));
    }

    #[test]
    fn hotlist_evicts_lowest_priority_when_full() {
        let hotlist = HotlistManager::new(HotlistConfig {
            max_entries: 2,
            min_hf: 0.5,
            max_hf: 1.5,
            min_debt_usd: 0.0,
            ..Default::default()
        });

        assert!(hotlist.consider(addr(1), 1.04, 100.0)); // low priority (far from edges)
        assert!(hotlist.consider(addr(2), 0.99, 100.0)); // higher priority (closer to 1.0)
        assert_eq!(hotlist.len(), 2);

        // A much higher priority entry should evict addr(1) (the lowest).
        assert!(hotlist.consider(addr(3), 0.981, 100.0));
        assert_eq!(hotlist.len(), 2);
        assert!(!hotlist.get_all().iter().any(|e| e.address == addr(1)));
    }

    #[test]
    fn hotlist_rejects_when_full_and_not_better() {
        let hotlist = HotlistManager::new(HotlistConfig {
            max_entries: 1,
            min_hf: 0.5,
            max_hf: 1.5,
            min_debt_usd: 0.0,
            ..Default::default()
        });
        assert!(hotlist.consider(addr(1), 0.99, 1000.0));
        assert!(!hotlist.consider(addr(2), 1.04, 1.0));
        assert_eq!(hotlist.len(), 1);
    }

    #[test]
    fn consider_out_of_range_removes_existing() {
        let hotlist = HotlistManager::new(HotlistConfig::default());
        assert!(hotlist.consider(addr(1), 1.0, 200.0));
        assert!(!hotlist.consider(addr(1), 1.2, 200.0));
        assert_eq!(hotlist.len(), 0);
    }

    #[test]
    fn candidate_set_evicts_after_consecutive_high_hf() {
        let set = CandidateSet::new(CandidateSetConfig {
            evict_hf: 1.2,
            evict_consecutive: 3,
            near_hf: 1.03,
            max_accounts_per_block: 100,
        });
        set.upsert(addr(1), 0.95, 1, EntryReason::BorrowEvent);
        set.record_scan(addr(1), 1.25, 2);
        set.record_scan(addr(1), 1.25, 3);
        assert!(set.contains(addr(1)));
        set.record_scan(addr(1), 1.25, 4);
        assert!(!set.contains(addr(1)));
    }

    #[test]
    fn candidate_set_never_evicts_near_threshold() {
        let set = CandidateSet::new(CandidateSetConfig {
            evict_hf: 1.2,
            evict_consecutive: 1,
            near_hf: 1.03,
            max_accounts_per_block: 100,
        });
        set.upsert(addr(1), 1.02, 1, EntryReason::BorrowEvent);
        for b in 2..10 {
            set.record_scan(addr(1), 1.02, b);
        }
        assert!(set.contains(addr(1)));
    }

    #[test]
    fn candidate_set_caps_size_in_insertion_order() {
        let set = CandidateSet::new(CandidateSetConfig {
            max_accounts_per_block: 2,
            ..Default::default()
        });
        set.upsert(addr(1), 0.9, 1, EntryReason::BorrowEvent);
        set.upsert(addr(2), 0.9, 1, EntryReason::BorrowEvent);
        set.upsert(addr(3), 0.9, 1, EntryReason::BorrowEvent);
        assert_eq!(set.len(), 2);
        assert!(!set.contains(addr(1)));
    }
}
