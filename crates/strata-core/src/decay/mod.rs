//! Decay engine: forgetting curve, reinforcement and purge of persisted items.

pub mod curve;
mod engine;

pub use engine::{DecayEngine, SweepReport};
