//! Outcome prediction from shared patterns, with calibration feedback.

mod predictor;

pub use predictor::{accuracy_score, OutcomePredictor, PredictionContext};
