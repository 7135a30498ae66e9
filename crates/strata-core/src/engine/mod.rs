//! Engine facade and classification workers.

mod pool;
mod stats;
mod tiering;

pub use stats::{integration_score, EngineStats, HealthFlags, HealthReport, JobHealth, TierStats};
pub use tiering::{
    FlushReport, ReinforceOutcome, RoutingOutcome, TieringEngine, TieringEngineBuilder, RECURRING_PATTERN_TYPE,
};
