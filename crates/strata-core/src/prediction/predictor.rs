//! Outcome predictor.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::PredictionConfig;
use crate::error::{StrataError, StrataResult};
use crate::events::{EventBus, TierEvent};
use crate::sharing::PatternRegistry;
use crate::types::{
    ObservedOutcome, Pattern, Prediction, PredictionStatus, SignalVector, TimeWindow, VerificationReport,
};

/// Signal context predictions are matched against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionContext {
    pub signals: SignalVector,
    /// Memory item the context was taken from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_item_id: Option<String>,
}

/// Accuracy of `prediction` against what actually happened.
///
/// Wrong event scores 0. Right event inside the window scores 1. Right event
/// outside the window earns `near_miss_credit`, falling linearly to 0 at
/// `near_miss_tolerance_secs` from the nearest edge.
pub fn accuracy_score(prediction: &Prediction, outcome: &ObservedOutcome, config: &PredictionConfig) -> f32 {
    if !same_event(&prediction.predicted_event, &outcome.event) {
        return 0.0;
    }
    let distance = prediction.predicted_time_window.distance_secs(outcome.occurred_at);
    if distance == 0 {
        return 1.0;
    }
    if config.near_miss_tolerance_secs <= 0 {
        return 0.0;
    }
    let closeness = 1.0 - distance as f32 / config.near_miss_tolerance_secs as f32;
    (config.near_miss_credit * closeness.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

fn same_event(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Generates predictions from shareable patterns and reconciles them.
pub struct OutcomePredictor {
    config: PredictionConfig,
    predictions: RwLock<HashMap<String, Prediction>>,
    clock: SharedClock,
    events: EventBus,
}

impl OutcomePredictor {
    pub fn new(config: PredictionConfig, clock: SharedClock, events: EventBus) -> Self {
        Self {
            config,
            predictions: RwLock::new(HashMap::new()),
            clock,
            events,
        }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Match `patterns` against `context` and record a prediction for every
    /// pattern whose event falls within `horizon`.
    ///
    /// Patterns without a signature or predicted event, patterns that already
    /// have a pending prediction, and matches below `min_match` are skipped.
    pub fn generate(
        &self,
        patterns: &[Pattern],
        context: &PredictionContext,
        horizon: Duration,
        cancel: &CancellationToken,
    ) -> StrataResult<Vec<Prediction>> {
        if horizon <= Duration::zero() {
            return Err(StrataError::invalid_field("time_horizon", "time_horizon must be positive"));
        }
        let tolerance = seconds("window_tolerance_secs", self.config.window_tolerance_secs.max(0))?;
        if !context.signals.is_well_formed() {
            return Err(StrataError::invalid_field("context", "context signals must be in [0, 1]"));
        }

        let now = self.clock.now();
        let mut predictions = self.predictions.write().unwrap_or_else(|e| e.into_inner());
        let pending: HashSet<String> = predictions
            .values()
            .filter(|p| p.status == PredictionStatus::Pending)
            .flat_map(|p| p.based_on_pattern_ids.iter().cloned())
            .collect();

        let mut created = Vec::new();
        for pattern in patterns {
            if cancel.is_cancelled() {
                info!(created = created.len(), "Prediction run cancelled");
                break;
            }
            if pattern.predicted_event.trim().is_empty() || pending.contains(&pattern.id) {
                continue;
            }
            let Some(signature) = &pattern.signature else {
                continue;
            };
            let Some(lead) = Duration::try_seconds(pattern.lead_time_secs.max(0)) else {
                continue;
            };
            if lead > horizon {
                continue;
            }

            let match_score = signature.match_score(&context.signals);
            if match_score < self.config.min_match {
                debug!(pattern_id = %pattern.id, match_score, "Context match below threshold");
                continue;
            }

            let Some(window) = window_around(now, lead, tolerance) else {
                debug!(pattern_id = %pattern.id, "Predicted window out of range");
                continue;
            };
            let prediction = Prediction {
                id: Uuid::new_v4().to_string(),
                based_on_pattern_ids: vec![pattern.id.clone()],
                predicted_event: pattern.predicted_event.clone(),
                predicted_time_window: window,
                confidence: (pattern.confidence * match_score).clamp(0.0, 1.0),
                created_at: now,
                status: PredictionStatus::Pending,
                verified_at: None,
                actual_outcome: None,
                accuracy_score: None,
                context_item_id: context.context_item_id.clone(),
            };
            predictions.insert(prediction.id.clone(), prediction.clone());
            created.push(prediction);
        }

        created.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        info!(created = created.len(), candidates = patterns.len(), "Predictions generated");
        Ok(created)
    }

    /// Reconcile a pending prediction with the observed outcome and update
    /// the confidence of every pattern it was based on.
    pub fn verify(
        &self,
        registry: &PatternRegistry,
        prediction_id: &str,
        outcome: ObservedOutcome,
    ) -> StrataResult<VerificationReport> {
        if outcome.event.trim().is_empty() {
            return Err(StrataError::missing_field("actual_outcome.event"));
        }
        let now = self.clock.now();
        let resolved = {
            let mut predictions = self.predictions.write().unwrap_or_else(|e| e.into_inner());
            let prediction = predictions
                .get_mut(prediction_id)
                .ok_or_else(|| StrataError::prediction_not_found(prediction_id))?;
            if prediction.status != PredictionStatus::Pending {
                return Err(StrataError::invalid_field(
                    "prediction_id",
                    format!("prediction {} is already {}", prediction_id, prediction.status),
                ));
            }

            let accuracy = accuracy_score(prediction, &outcome, &self.config);
            prediction.status = PredictionStatus::Verified;
            prediction.verified_at = Some(now);
            prediction.actual_outcome = Some(outcome);
            prediction.accuracy_score = Some(accuracy);
            prediction.clone()
        };

        self.calibrate(registry, &resolved, now)
    }

    /// Mark pending predictions whose window (plus the near-miss grace) has
    /// passed as expired with accuracy 0.
    pub fn expire_overdue(
        &self,
        registry: &PatternRegistry,
        cancel: &CancellationToken,
    ) -> StrataResult<Vec<VerificationReport>> {
        let now = self.clock.now();
        let grace = seconds("near_miss_tolerance_secs", self.config.near_miss_tolerance_secs.max(0))?;

        let expired: Vec<Prediction> = {
            let mut predictions = self.predictions.write().unwrap_or_else(|e| e.into_inner());
            let mut out = Vec::new();
            for prediction in predictions.values_mut() {
                if cancel.is_cancelled() {
                    break;
                }
                let overdue = prediction
                    .predicted_time_window
                    .end
                    .checked_add_signed(grace)
                    .is_some_and(|deadline| deadline <= now);
                if prediction.status == PredictionStatus::Pending && overdue {
                    prediction.status = PredictionStatus::Expired;
                    prediction.verified_at = Some(now);
                    prediction.accuracy_score = Some(0.0);
                    out.push(prediction.clone());
                }
            }
            out
        };

        let mut reports = Vec::with_capacity(expired.len());
        for prediction in &expired {
            reports.push(self.calibrate(registry, prediction, now)?);
        }
        if !reports.is_empty() {
            info!(expired = reports.len(), "Expired overdue predictions");
        }
        Ok(reports)
    }

    fn calibrate(
        &self,
        registry: &PatternRegistry,
        prediction: &Prediction,
        now: DateTime<Utc>,
    ) -> StrataResult<VerificationReport> {
        let accuracy = prediction.accuracy_score.unwrap_or(0.0);
        let mut pattern_confidence = Vec::with_capacity(prediction.based_on_pattern_ids.len());
        for pattern_id in &prediction.based_on_pattern_ids {
            match registry.apply_calibration(pattern_id, accuracy, self.config.alpha) {
                Ok(confidence) => pattern_confidence.push((pattern_id.clone(), confidence)),
                Err(StrataError::NotFound { .. }) => {
                    debug!(pattern_id = %pattern_id, "Pattern gone before calibration");
                }
                Err(e) => return Err(e),
            }
        }

        self.events.emit(TierEvent::PredictionResolved {
            prediction_id: prediction.id.clone(),
            status: prediction.status,
            accuracy_score: accuracy,
            timestamp: now,
        });

        Ok(VerificationReport {
            prediction_id: prediction.id.clone(),
            status: prediction.status,
            accuracy_score: accuracy,
            pattern_confidence,
        })
    }

    /// Drop verified and expired predictions resolved more than
    /// `retention_secs` ago. Returns how many were removed.
    pub fn prune_resolved(&self) -> usize {
        let now = self.clock.now();
        let Some(cutoff) = Duration::try_seconds(self.config.retention_secs.max(0))
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return 0;
        };

        let mut predictions = self.predictions.write().unwrap_or_else(|e| e.into_inner());
        let before = predictions.len();
        predictions.retain(|_, p| {
            p.status == PredictionStatus::Pending || p.verified_at.map_or(true, |at| at > cutoff)
        });
        let removed = before - predictions.len();
        if removed > 0 {
            debug!(removed, "Pruned resolved predictions");
        }
        removed
    }

    pub fn get(&self, prediction_id: &str) -> Option<Prediction> {
        let predictions = self.predictions.read().unwrap_or_else(|e| e.into_inner());
        predictions.get(prediction_id).cloned()
    }

    /// Prediction count per status.
    pub fn counts_by_status(&self) -> HashMap<PredictionStatus, usize> {
        let predictions = self.predictions.read().unwrap_or_else(|e| e.into_inner());
        let mut counts = HashMap::new();
        for p in predictions.values() {
            *counts.entry(p.status).or_insert(0) += 1;
        }
        counts
    }

    /// Mean accuracy over resolved predictions.
    pub fn mean_accuracy(&self) -> Option<f32> {
        let predictions = self.predictions.read().unwrap_or_else(|e| e.into_inner());
        let scores: Vec<f32> = predictions.values().filter_map(|p| p.accuracy_score).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f32>() / scores.len() as f32)
        }
    }
}

fn seconds(field: &str, secs: i64) -> StrataResult<Duration> {
    Duration::try_seconds(secs).ok_or_else(|| StrataError::invalid_field(field, "duration out of range"))
}

fn window_around(now: DateTime<Utc>, lead: Duration, tolerance: Duration) -> Option<TimeWindow> {
    let center = now.checked_add_signed(lead)?;
    Some(TimeWindow::new(
        center.checked_sub_signed(tolerance)?,
        center.checked_add_signed(tolerance)?,
    ))
}
