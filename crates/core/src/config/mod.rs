//! Runtime configuration for the liquidation engine.
//!
//! A single [`EngineConfig`] tree, one sub-struct per env-var group,
//! loaded from the environment with typed defaults for every field.

mod engine;

pub use engine::{
    config, init_config, AmbientConfig, CacheConfig, DetectionConfig, EngineConfig,
    ExecutionConfig, PrivateTxMode, RelayConfig, ReplayConfigValues, SweepConfig, TriggerConfig,
    VerifierConfig,
};
