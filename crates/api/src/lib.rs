//! External HTTP/GraphQL client contracts for the liquidation engine.
//!
//! This crate provides:
//! - `SubgraphClient`: the GraphQL contract for ground-truth liquidation
//!   events and borrower summaries, plus an in-memory fixture for tests
//! - `RelayClient`: a thin client for private-relay transaction submission

mod relay;
mod subgraph;

pub use relay::{RelayClient, RelayError, RelayFailureKind, RelayOutcome};
pub use subgraph::{
    BorrowerSummary, InMemorySubgraphClient, LiquidationCallEvent, LiquidationCallFilter,
    PagedResult, SubgraphClient, UserFilter, MAX_PAGE_SIZE,
};
