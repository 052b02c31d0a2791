//! Historical block-range replay against ground-truth liquidations.

pub mod controller;
pub mod ground_truth;
pub mod range;
pub mod reporter;
pub mod universe;

pub use controller::{ReplayController, ReplayControllerConfig};
pub use ground_truth::{index_by_user, GroundTruthConfig, GroundTruthLoader, GroundTruthResult};
pub use range::{parse_block_range, BlockRange, BlockRangeError, MAX_SPAN};
pub use reporter::{BlockRow, CandidateClassification, CandidateRow, Reporter, SummaryRow};
pub use universe::UniverseBuilder;
