//! Signal vectors scored for every routing decision.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// One independent scoring dimension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Signal {
    /// Bounded decay of the time elapsed since the event.
    Recency,
    /// Emotional intensity of the content.
    Intensity,
    /// How unlike recent items the content is.
    Novelty,
    /// Overlap with the agent's active goals.
    GoalRelevance,
    /// References to people and relationships.
    SocialSignificance,
    /// How often near-identical content has been seen.
    Repetition,
    /// Caller marked the item as important (0 or 1).
    ExplicitFlag,
}

impl Signal {
    /// Number of signal dimensions.
    pub const COUNT: usize = 7;

    /// All signals in declaration order.
    pub fn all() -> impl Iterator<Item = Signal> {
        Signal::iter()
    }
}

/// Named scores along every [`Signal`] dimension, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalVector {
    pub recency: f32,
    pub intensity: f32,
    pub novelty: f32,
    pub goal_relevance: f32,
    pub social_significance: f32,
    pub repetition: f32,
    pub explicit_flag: f32,
}

impl SignalVector {
    /// Vector with every dimension at zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Read one dimension.
    pub fn get(&self, signal: Signal) -> f32 {
        match signal {
            Signal::Recency => self.recency,
            Signal::Intensity => self.intensity,
            Signal::Novelty => self.novelty,
            Signal::GoalRelevance => self.goal_relevance,
            Signal::SocialSignificance => self.social_significance,
            Signal::Repetition => self.repetition,
            Signal::ExplicitFlag => self.explicit_flag,
        }
    }

    /// Write one dimension, clamped to [0, 1].
    pub fn set(&mut self, signal: Signal, value: f32) {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        match signal {
            Signal::Recency => self.recency = value,
            Signal::Intensity => self.intensity = value,
            Signal::Novelty => self.novelty = value,
            Signal::GoalRelevance => self.goal_relevance = value,
            Signal::SocialSignificance => self.social_significance = value,
            Signal::Repetition => self.repetition = value,
            Signal::ExplicitFlag => self.explicit_flag = if value >= 0.5 { 1.0 } else { 0.0 },
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, signal: Signal, value: f32) -> Self {
        self.set(signal, value);
        self
    }

    /// Iterate `(signal, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Signal, f32)> + '_ {
        Signal::all().map(move |s| (s, self.get(s)))
    }

    /// Whether every dimension is a finite value inside [0, 1].
    pub fn is_well_formed(&self) -> bool {
        self.iter().all(|(_, v)| v.is_finite() && (0.0..=1.0).contains(&v))
    }

    /// Similarity in [0, 1]: one minus the mean absolute difference.
    pub fn match_score(&self, other: &SignalVector) -> f32 {
        let total: f32 = Signal::all()
            .map(|s| (self.get(s) - other.get(s)).abs())
            .sum();
        (1.0 - total / Signal::COUNT as f32).clamp(0.0, 1.0)
    }

    /// Component-wise mean of a set of vectors.
    pub fn mean<'a>(vectors: impl IntoIterator<Item = &'a SignalVector>) -> Option<SignalVector> {
        let mut sum = [0.0f32; Signal::COUNT];
        let mut n = 0usize;
        for v in vectors {
            for (i, s) in Signal::all().enumerate() {
                sum[i] += v.get(s);
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }
        let mut out = SignalVector::zero();
        for (i, s) in Signal::all().enumerate() {
            out.set(s, sum[i] / n as f32);
        }
        Some(out)
    }
}

/// Pre-populated signal fields supplied by an upstream classifier.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_significance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_relevance: Option<f32>,
}

impl SignalHints {
    /// Merge two hint sets, preferring values already present in `self`.
    pub fn or(self, other: SignalHints) -> SignalHints {
        SignalHints {
            intensity: self.intensity.or(other.intensity),
            social_significance: self.social_significance.or(other.social_significance),
            goal_relevance: self.goal_relevance.or(other.goal_relevance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clamps_and_binarises_flag() {
        let mut v = SignalVector::zero();
        v.set(Signal::Intensity, 3.0);
        v.set(Signal::Novelty, -1.0);
        v.set(Signal::ExplicitFlag, 0.7);
        v.set(Signal::Recency, f32::NAN);

        assert_eq!(v.intensity, 1.0);
        assert_eq!(v.novelty, 0.0);
        assert_eq!(v.explicit_flag, 1.0);
        assert_eq!(v.recency, 0.0);
        assert!(v.is_well_formed());
    }

    #[test]
    fn test_match_score_bounds() {
        let a = SignalVector::zero();
        let b = SignalVector {
            recency: 1.0,
            intensity: 1.0,
            novelty: 1.0,
            goal_relevance: 1.0,
            social_significance: 1.0,
            repetition: 1.0,
            explicit_flag: 1.0,
        };
        assert_eq!(a.match_score(&a), 1.0);
        assert_eq!(a.match_score(&b), 0.0);
    }

    #[test]
    fn test_signal_names_round_trip() {
        assert_eq!(Signal::GoalRelevance.to_string(), "goal_relevance");
        assert_eq!("explicit_flag".parse::<Signal>().unwrap(), Signal::ExplicitFlag);
        assert_eq!(Signal::all().count(), Signal::COUNT);
    }

    #[test]
    fn test_mean_of_vectors() {
        let a = SignalVector::zero().with(Signal::Intensity, 1.0);
        let b = SignalVector::zero();
        let m = SignalVector::mean([&a, &b]).unwrap();
        assert!((m.intensity - 0.5).abs() < 1e-6);
        assert!(SignalVector::mean(std::iter::empty::<&SignalVector>()).is_none());
    }
}
