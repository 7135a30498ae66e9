//! Per-agent router weights.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signals::{Signal, SignalVector};

/// Learned weight vector for one agent.
///
/// Written only by the learning loop through compare-and-swap on `version`;
/// routing reads a snapshot and may see a vector one cycle stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterWeights {
    /// Owning agent.
    pub agent_id: String,
    /// Weight per signal; may be negative after learning.
    pub weights: BTreeMap<Signal, f32>,
    /// L1 norm held constant across updates.
    pub l1_norm: f32,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
    /// Monotonic write counter.
    pub version: u64,
}

impl RouterWeights {
    /// Create a weight record from a signal -> weight table.
    pub fn new(agent_id: impl Into<String>, weights: BTreeMap<Signal, f32>, now: DateTime<Utc>) -> Self {
        let mut full = BTreeMap::new();
        for s in Signal::all() {
            full.insert(s, weights.get(&s).copied().unwrap_or(0.0));
        }
        let l1_norm = full.values().map(|w| w.abs()).sum();
        Self {
            agent_id: agent_id.into(),
            weights: full,
            l1_norm,
            updated_at: now,
            version: 0,
        }
    }

    /// Weight for one signal.
    pub fn weight(&self, signal: Signal) -> f32 {
        self.weights.get(&signal).copied().unwrap_or(0.0)
    }

    /// Raw weighted sum of a signal vector (not clipped).
    pub fn weighted_sum(&self, signals: &SignalVector) -> f32 {
        signals.iter().map(|(s, v)| self.weight(s) * v).sum()
    }

    /// Current sum of absolute weights.
    pub fn current_l1(&self) -> f32 {
        self.weights.values().map(|w| w.abs()).sum()
    }

    /// Rescale so that the sum of absolute weights equals `l1_norm`.
    ///
    /// A vector that collapsed to zero is left untouched; callers reset it.
    pub fn renormalize(&mut self) -> bool {
        let current = self.current_l1();
        if current <= f32::EPSILON || !current.is_finite() {
            return false;
        }
        let scale = self.l1_norm / current;
        for w in self.weights.values_mut() {
            *w *= scale;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BTreeMap<Signal, f32> {
        BTreeMap::from([
            (Signal::Recency, 0.4),
            (Signal::Intensity, 0.3),
            (Signal::ExplicitFlag, 1.0),
        ])
    }

    #[test]
    fn test_new_fills_missing_signals() {
        let w = RouterWeights::new("a", table(), Utc::now());
        assert_eq!(w.weights.len(), Signal::COUNT);
        assert_eq!(w.weight(Signal::Novelty), 0.0);
        assert!((w.l1_norm - 1.7).abs() < 1e-6);
    }

    #[test]
    fn test_renormalize_restores_l1() {
        let mut w = RouterWeights::new("a", table(), Utc::now());
        w.weights.insert(Signal::Recency, -0.9);
        w.weights.insert(Signal::Novelty, 0.25);
        assert!(w.renormalize());
        assert!((w.current_l1() - w.l1_norm).abs() < 1e-5);
    }

    #[test]
    fn test_weighted_sum() {
        let w = RouterWeights::new("a", table(), Utc::now());
        let s = SignalVector::zero()
            .with(Signal::Recency, 1.0)
            .with(Signal::Intensity, 0.5);
        assert!((w.weighted_sum(&s) - 0.55).abs() < 1e-6);
    }
}
