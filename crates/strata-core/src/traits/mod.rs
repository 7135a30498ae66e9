//! Collaborator traits.

mod classifier;
mod store;

pub use classifier::{ContentClassifier, SharedClassifier};
pub use store::{MemoryStore, SharedStore, SimilarItem, TierSummary};

#[cfg(test)]
pub use classifier::MockContentClassifier;
