//! Feedback-driven weight learning.
//!
//! Feedback accumulates in a queue and is applied in periodic batches, one
//! compare-and-swap per agent per cycle. The learner tracks rolling accuracy
//! and halves its learning rate when accuracy keeps degrading.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::weights::WeightStore;
use crate::config::{RetryPolicy, RouterConfig};
use crate::error::StrataResult;
use crate::store::retry_on_conflict;
use crate::types::{RouterWeights, Signal, SignalVector};

/// One routing judgement reported back by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSample {
    pub item_id: String,
    pub agent_id: String,
    /// Whether the caller considered the routing decision correct.
    pub was_correct: bool,
    /// Importance the caller actually observed, in [0, 1].
    pub observed_importance: f32,
    /// Signals the item was routed with.
    pub signals: SignalVector,
    /// Priority the router assigned.
    pub predicted_priority: f32,
    pub recorded_at: DateTime<Utc>,
}

/// Pending feedback awaiting the next learning cycle.
#[derive(Default)]
pub struct FeedbackQueue {
    samples: Mutex<VecDeque<FeedbackSample>>,
}

impl FeedbackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: FeedbackSample) {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).push_back(sample);
    }

    /// Remove up to `max` samples, oldest first.
    pub fn drain(&self, max: usize) -> Vec<FeedbackSample> {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let n = max.min(samples.len());
        samples.drain(..n).collect()
    }

    /// Put samples back at the front of the queue, keeping their order.
    pub fn requeue(&self, batch: Vec<FeedbackSample>) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        for sample in batch.into_iter().rev() {
            samples.push_front(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply one batch gradient step to `weights`.
///
/// `w[s] += clamp(lr * mean((observed - predicted) * signal[s]), ±max_step)`,
/// then the vector is rescaled to its original L1 norm. A vector that
/// collapses to zero is reset to `defaults`.
pub fn apply_gradient(
    weights: &RouterWeights,
    batch: &[FeedbackSample],
    learning_rate: f32,
    max_step: f32,
    defaults: &BTreeMap<Signal, f32>,
    now: DateTime<Utc>,
) -> RouterWeights {
    let mut next = weights.clone();
    next.updated_at = now;
    if batch.is_empty() {
        return next;
    }

    let n = batch.len() as f32;
    for signal in Signal::all() {
        let gradient: f32 = batch
            .iter()
            .map(|sample| {
                let predicted = weights.weighted_sum(&sample.signals).clamp(0.0, 1.0);
                (sample.observed_importance.clamp(0.0, 1.0) - predicted) * sample.signals.get(signal)
            })
            .sum::<f32>()
            / n;
        let step = (learning_rate * gradient).clamp(-max_step, max_step);
        if let Some(w) = next.weights.get_mut(&signal) {
            *w += step;
        }
    }

    if !next.renormalize() {
        tracing::warn!(agent_id = %weights.agent_id, "Weight vector collapsed, resetting to defaults");
        let mut reset = RouterWeights::new(weights.agent_id.clone(), defaults.clone(), now);
        reset.version = weights.version;
        return reset;
    }
    next
}

#[derive(Debug, Clone)]
struct LearnerState {
    learning_rate: f32,
    history: VecDeque<f32>,
    degrading_streak: usize,
    cycles: u64,
}

/// Snapshot of learner health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerStatus {
    pub learning_rate: f32,
    /// Mean accuracy over the recent window; `None` before any feedback.
    pub rolling_accuracy: Option<f32>,
    pub cycles: u64,
    pub degrading_streak: usize,
}

/// Result of one learning cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningReport {
    pub samples: usize,
    /// Weight records written this cycle.
    pub updated: Vec<RouterWeights>,
    pub cycle_accuracy: Option<f32>,
    pub learning_rate: f32,
    pub learning_rate_halved: bool,
}

/// Batch learner over a [`WeightStore`].
pub struct WeightLearner {
    config: RouterConfig,
    retry: RetryPolicy,
    state: Mutex<LearnerState>,
}

impl WeightLearner {
    pub fn new(config: RouterConfig, retry: RetryPolicy) -> Self {
        let state = LearnerState {
            learning_rate: config.learning_rate,
            history: VecDeque::new(),
            degrading_streak: 0,
            cycles: 0,
        };
        Self {
            config,
            retry,
            state: Mutex::new(state),
        }
    }

    pub fn status(&self) -> LearnerStatus {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        LearnerStatus {
            learning_rate: state.learning_rate,
            rolling_accuracy: mean(&state.history),
            cycles: state.cycles,
            degrading_streak: state.degrading_streak,
        }
    }

    /// Drain one batch of feedback and update every affected agent.
    ///
    /// If an agent's update fails, its samples and those of every agent not
    /// yet updated go back on the queue for the next cycle.
    pub async fn run_cycle<W: WeightStore + ?Sized>(
        &self,
        registry: &W,
        queue: &FeedbackQueue,
        now: DateTime<Utc>,
    ) -> StrataResult<LearningReport> {
        let batch = queue.drain(self.config.feedback_batch_size.max(1));
        let learning_rate = self.status().learning_rate;
        if batch.is_empty() {
            return Ok(LearningReport {
                learning_rate,
                ..Default::default()
            });
        }

        let mut by_agent: HashMap<&str, Vec<FeedbackSample>> = HashMap::new();
        for sample in &batch {
            by_agent.entry(sample.agent_id.as_str()).or_default().push(sample.clone());
        }

        let mut agents: Vec<&str> = by_agent.keys().copied().collect();
        agents.sort_unstable();

        let mut updated = Vec::with_capacity(agents.len());
        for (idx, agent_id) in agents.iter().copied().enumerate() {
            let samples = &by_agent[agent_id];
            let result = retry_on_conflict(&self.retry, agent_id, || async {
                let current = registry.snapshot(agent_id, now);
                let next = apply_gradient(
                    &current,
                    samples,
                    learning_rate,
                    self.config.max_step,
                    registry.defaults(),
                    now,
                );
                registry.compare_and_swap(next, current.version)
            })
            .await;
            let stored = match result {
                Ok(stored) => stored,
                Err(e) => {
                    let pending: HashSet<&str> = agents[idx..].iter().copied().collect();
                    let requeued: Vec<FeedbackSample> = batch
                        .iter()
                        .filter(|s| pending.contains(s.agent_id.as_str()))
                        .cloned()
                        .collect();
                    tracing::warn!(
                        agent_id = %agent_id,
                        requeued = requeued.len(),
                        error = %e,
                        "Weight update failed, feedback requeued"
                    );
                    queue.requeue(requeued);
                    return Err(e);
                }
            };
            tracing::debug!(agent_id = %agent_id, version = stored.version, samples = samples.len(), "Router weights updated");
            updated.push(stored);
        }

        let correct = batch.iter().filter(|s| s.was_correct).count();
        let cycle_accuracy = correct as f32 / batch.len() as f32;
        let (learning_rate, halved) = self.record_accuracy(cycle_accuracy);

        tracing::info!(
            samples = batch.len(),
            agents = updated.len(),
            accuracy = cycle_accuracy,
            learning_rate,
            "Learning cycle complete"
        );

        Ok(LearningReport {
            samples: batch.len(),
            updated,
            cycle_accuracy: Some(cycle_accuracy),
            learning_rate,
            learning_rate_halved: halved,
        })
    }

    /// Fold one cycle's accuracy into the rolling window; returns the
    /// (possibly halved) learning rate.
    fn record_accuracy(&self, accuracy: f32) -> (f32, bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cycles += 1;

        let degraded = mean(&state.history).is_some_and(|rolling| accuracy < rolling);
        state.degrading_streak = if degraded { state.degrading_streak + 1 } else { 0 };

        state.history.push_back(accuracy);
        while state.history.len() > self.config.accuracy_window.max(1) {
            state.history.pop_front();
        }

        let mut halved = false;
        if self.config.degradation_cycles > 0 && state.degrading_streak >= self.config.degradation_cycles {
            let next = (state.learning_rate / 2.0).max(self.config.min_learning_rate);
            halved = next < state.learning_rate;
            if halved {
                tracing::warn!(from = state.learning_rate, to = next, "Accuracy degrading, halving learning rate");
            }
            state.learning_rate = next;
            state.degrading_streak = 0;
        }
        (state.learning_rate, halved)
    }
}

fn mean(values: &VecDeque<f32>) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrataError;
    use crate::router::weights::MockWeightStore;
    use crate::router::WeightRegistry;

    fn sample(agent: &str, signals: SignalVector, observed: f32, correct: bool) -> FeedbackSample {
        FeedbackSample {
            item_id: "m1".to_string(),
            agent_id: agent.to_string(),
            was_correct: correct,
            observed_importance: observed,
            signals,
            predicted_priority: 0.5,
            recorded_at: Utc::now(),
        }
    }

    fn weights() -> RouterWeights {
        RouterWeights::new("agent-a", RouterConfig::builtin_weights(), Utc::now())
    }

    #[test]
    fn test_gradient_preserves_l1_norm() {
        let w = weights();
        let l1 = w.current_l1();
        let batch = vec![
            sample("agent-a", SignalVector::zero().with(Signal::Intensity, 0.9), 1.0, false),
            sample("agent-a", SignalVector::zero().with(Signal::Recency, 0.8), 0.0, false),
        ];
        let next = apply_gradient(&w, &batch, 0.5, 0.1, &RouterConfig::builtin_weights(), Utc::now());
        assert!((next.current_l1() - l1).abs() < 1e-4);
    }

    #[test]
    fn test_gradient_moves_toward_observed_importance() {
        let w = weights();
        let signals = SignalVector::zero().with(Signal::Intensity, 1.0);
        // Predicted 0.3 but observed 1.0: intensity weight should grow relative to others.
        let batch = vec![sample("agent-a", signals, 1.0, false)];
        let next = apply_gradient(&w, &batch, 0.5, 0.1, &RouterConfig::builtin_weights(), Utc::now());
        let before = w.weight(Signal::Intensity) / w.current_l1();
        let after = next.weight(Signal::Intensity) / next.current_l1();
        assert!(after > before);
    }

    #[test]
    fn test_step_is_capped() {
        let w = weights();
        let signals = SignalVector::zero().with(Signal::Novelty, 1.0);
        let batch = vec![sample("agent-a", signals, 1.0, false)];
        let mut uncapped = w.clone();
        uncapped.weights.insert(Signal::Novelty, w.weight(Signal::Novelty) + 0.01);
        uncapped.renormalize();
        let next = apply_gradient(&w, &batch, 100.0, 0.01, &RouterConfig::builtin_weights(), Utc::now());
        assert!((next.weight(Signal::Novelty) - uncapped.weight(Signal::Novelty)).abs() < 1e-5);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let w = weights();
        let next = apply_gradient(&w, &[], 0.5, 0.1, &RouterConfig::builtin_weights(), Utc::now());
        assert_eq!(next.weights, w.weights);
    }

    #[tokio::test]
    async fn test_cycle_writes_per_agent_and_drains_queue() {
        let registry = WeightRegistry::new(RouterConfig::builtin_weights());
        let queue = FeedbackQueue::new();
        let learner = WeightLearner::new(RouterConfig::default(), RetryPolicy::default());

        queue.push(sample("agent-a", SignalVector::zero().with(Signal::Intensity, 1.0), 1.0, true));
        queue.push(sample("agent-b", SignalVector::zero().with(Signal::Recency, 1.0), 0.0, false));

        let report = learner.run_cycle(&registry, &queue, Utc::now()).await.unwrap();
        assert_eq!(report.samples, 2);
        assert_eq!(report.updated.len(), 2);
        assert_eq!(report.cycle_accuracy, Some(0.5));
        assert!(queue.is_empty());
        assert_eq!(registry.snapshot("agent-a", Utc::now()).version, 1);
        assert_eq!(registry.snapshot("agent-b", Utc::now()).version, 1);
    }

    #[tokio::test]
    async fn test_contended_agent_feedback_is_requeued() {
        let mut store = MockWeightStore::new();
        store.expect_defaults().return_const(RouterConfig::builtin_weights());
        store
            .expect_snapshot()
            .returning(|agent, now| RouterWeights::new(agent, RouterConfig::builtin_weights(), now));
        store.expect_compare_and_swap().returning(|mut next, expected| {
            if next.agent_id == "agent-b" {
                Err(StrataError::conflict("weights:agent-b", expected, Some(expected + 1)))
            } else {
                next.version = expected + 1;
                Ok(next)
            }
        });

        let queue = FeedbackQueue::new();
        let retry = RetryPolicy {
            max_retries: 1,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        };
        let learner = WeightLearner::new(RouterConfig::default(), retry);
        queue.push(sample("agent-a", SignalVector::zero().with(Signal::Intensity, 1.0), 1.0, true));
        queue.push(sample("agent-b", SignalVector::zero().with(Signal::Recency, 1.0), 0.0, false));
        queue.push(sample("agent-b", SignalVector::zero().with(Signal::Novelty, 1.0), 0.2, true));

        let err = learner.run_cycle(&store, &queue, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StrataError::PersistenceContention { .. }));

        // agent-a was written; only agent-b's samples wait for the next cycle.
        let pending = queue.drain(10);
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|s| s.agent_id == "agent-b"));
        assert_eq!(pending[0].signals.recency, 1.0);
        assert_eq!(learner.status().cycles, 0);
    }

    #[tokio::test]
    async fn test_sustained_degradation_halves_learning_rate() {
        let registry = WeightRegistry::new(RouterConfig::builtin_weights());
        let queue = FeedbackQueue::new();
        let config = RouterConfig {
            degradation_cycles: 2,
            ..RouterConfig::default()
        };
        let initial = config.learning_rate;
        let learner = WeightLearner::new(config, RetryPolicy::default());
        let signals = SignalVector::zero().with(Signal::Intensity, 0.5);

        // Cycle 1: perfect. Cycles 2 and 3: all wrong, each below the rolling mean.
        for correct in [true, false, false] {
            queue.push(sample("agent-a", signals, 0.5, correct));
            learner.run_cycle(&registry, &queue, Utc::now()).await.unwrap();
        }

        let status = learner.status();
        assert!((status.learning_rate - initial / 2.0).abs() < 1e-6);
        assert_eq!(status.degrading_streak, 0);
        assert_eq!(status.cycles, 3);
    }

    #[tokio::test]
    async fn test_learning_rate_floor() {
        let registry = WeightRegistry::new(RouterConfig::builtin_weights());
        let queue = FeedbackQueue::new();
        let config = RouterConfig {
            learning_rate: 0.002,
            min_learning_rate: 0.0015,
            degradation_cycles: 1,
            ..RouterConfig::default()
        };
        let learner = WeightLearner::new(config, RetryPolicy::default());
        let signals = SignalVector::zero().with(Signal::Novelty, 0.5);
        for correct in [true, false, false, false] {
            queue.push(sample("agent-a", signals, 0.5, correct));
            learner.run_cycle(&registry, &queue, Utc::now()).await.unwrap();
        }
        assert!((learner.status().learning_rate - 0.0015).abs() < 1e-7);
    }
}
