//! Router: tier assignment from weighted signals, plus the learning loop
//! that tunes the weights from feedback.

mod classifier;
mod learning;
mod weights;

pub use classifier::{RouteDecision, Router};
pub use learning::{apply_gradient, FeedbackQueue, FeedbackSample, LearnerStatus, LearningReport, WeightLearner};
pub use weights::{WeightRegistry, WeightStore};
