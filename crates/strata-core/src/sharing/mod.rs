//! Cross-agent pattern sharing.
//!
//! Patterns accumulate occurrences from many agents and cross the sharing
//! boundary only once k-anonymity holds and the sensitive-content scan passes.
//! What crosses is a [`crate::types::SharedPattern`]: no contributor ids and
//! noise-perturbed counts.

pub mod anonymize;
mod registry;
pub mod sensitive;

pub use registry::{similarity_key, PatternRegistry};
