//! strata-core - memory tiering and adaptive routing for personal agents.
//!
//! Incoming items are scored along independent signals, routed by a learned
//! per-agent weight vector into one of four tiers (focus, fresh, long_term,
//! archival), and decay along a reinforcement-modulated forgetting curve once
//! persisted. Agents share generalized patterns under k-anonymity and noise,
//! and shared patterns drive calibrated outcome predictions.
//!
//! # Example
//!
//! ```ignore
//! use strata_core::{EngineConfig, ItemDraft, SignalVector, TieringEngine};
//!
//! let engine = TieringEngine::builder(EngineConfig::default()).build()?;
//!
//! // Queue an item for classification
//! let id = engine.ingest(ItemDraft::new("Booked flights for June", chrono::Utc::now(), "agent-1")).await?;
//!
//! // Reinforce it and read back the highest-priority items
//! engine.reinforce(&id).await?;
//! let items = engine.recall(&SignalVector::zero(), None).await?;
//! ```

pub mod buffers;
pub mod clock;
pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod events;
pub mod prediction;
pub mod router;
pub mod runtime;
pub mod sharing;
pub mod signals;
pub mod store;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{EngineStats, FlushReport, ReinforceOutcome, RoutingOutcome, TieringEngine};
pub use error::{ErrorCode, StrataError, StrataResult};
pub use events::{EventBus, TierEvent};
pub use prediction::PredictionContext;
pub use runtime::{BackgroundRuntime, MaintenanceJob};
pub use store::{InMemoryStore, SqliteMemoryStore};
pub use traits::{ContentClassifier, MemoryStore, SharedStore};
pub use types::{
    ItemDraft, MemoryItem, ObservedOutcome, Pattern, PatternProposal, PatternState, Prediction, PredictionStatus,
    SharedPattern, Signal, SignalHints, SignalVector, Tier,
};
