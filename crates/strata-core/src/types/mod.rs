//! Core types for strata.

mod memory_item;
mod pattern;
mod prediction;
mod signals;
mod weights;

pub use memory_item::{ItemDraft, MemoryItem, Tier};
pub use pattern::{
    BlockReason, Pattern, PatternProposal, PatternState, ProposeOutcome, SharedPattern, MAX_LEAD_TIME_SECS,
};
pub use prediction::{
    ObservedOutcome, Prediction, PredictionStatus, TimeWindow, VerificationReport,
};
pub use signals::{Signal, SignalHints, SignalVector};
pub use weights::RouterWeights;
