//! Optional upstream content-classification hook.

use std::sync::Arc;

use crate::types::SignalHints;

/// Pre-populates signal fields from an upstream text-understanding step.
///
/// Implementations must return quickly: model inference happens upstream and
/// only its already-computed results are handed in here.
#[cfg_attr(test, mockall::automock)]
pub trait ContentClassifier: Send + Sync {
    /// Hints for `content`; fields left `None` fall back to lexical heuristics.
    fn classify(&self, content: &str) -> SignalHints;
}

/// Shared classifier handle.
pub type SharedClassifier = Arc<dyn ContentClassifier>;
