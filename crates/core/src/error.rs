//! Typed error taxonomy carried at library seams.
//!
//! One `thiserror`-derived variant per failure kind, matching the style
//! already used for `DecimalError`; `anyhow::Result` still wraps this at
//! the scheduler/CLI boundary, keeping the split between this crate's
//! internals and `main.rs`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("transient network error: {0}")]
    NetworkTransient(String),

    #[error("permanent network error: {0}")]
    NetworkPermanent(String),

    #[error("authentication error: {0}")]
    AuthError(String),

    #[error("rate limited, retry after {retry_after_ms}ms: {0}", retry_after_ms = .retry_after_ms.unwrap_or(0))]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("operation timed out after {elapsed_ms}ms: {context}")]
    Timeout { context: String, elapsed_ms: u64 },

    #[error("rpc error ({code:?}): {message}")]
    RpcError {
        code: Option<i64>,
        message: String,
    },

    #[error("simulation reverted: {0}")]
    SimulationRevert(String),

    #[error("filtered by guard: {0}")]
    GuardFilter(String),

    #[error("cache miss")]
    CacheMiss,

    #[error("feature disabled: {0}")]
    Disabled(String),
}

impl EngineError {
    /// Whether the caller should retry the operation that produced this
    /// error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::NetworkTransient(_)
                | EngineError::RateLimited { .. }
                | EngineError::Timeout { .. }
        )
    }

    /// Whether this error should abort the whole run rather than being
    /// recovered locally or merely surfaced on a snapshot.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::ConfigInvalid(_) | EngineError::NetworkPermanent(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_are_limited_to_transient_classes() {
        assert!(EngineError::NetworkTransient("x".into()).is_retryable());
        assert!(EngineError::Timeout { context: "x".into(), elapsed_ms: 10 }.is_retryable());
        assert!(!EngineError::ConfigInvalid("x".into()).is_retryable());
        assert!(!EngineError::CacheMiss.is_retryable());
    }

    #[test]
    fn fatal_kinds_abort_startup() {
        assert!(EngineError::ConfigInvalid("LT out of range".into()).is_fatal());
        assert!(!EngineError::GuardFilter("unprofitable".into()).is_fatal());
    }
}
