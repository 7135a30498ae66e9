//! Priority scoring and tier assignment.

use serde::{Deserialize, Serialize};

use crate::config::TierThresholds;
use crate::types::{RouterWeights, SignalVector, Tier};

/// Outcome of one router pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Clipped weighted sum in [0, 1].
    pub priority: f32,
    /// Destination tier; `None` means discard.
    pub tier: Option<Tier>,
}

/// Stateless router: combines signals with an agent's weights.
#[derive(Debug, Clone)]
pub struct Router {
    thresholds: TierThresholds,
}

impl Router {
    pub fn new(thresholds: TierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.thresholds
    }

    /// Clipped weighted sum of `signals`.
    pub fn priority(&self, signals: &SignalVector, weights: &RouterWeights) -> f32 {
        let raw = weights.weighted_sum(signals);
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Tier for a priority, or `None` below the archival threshold.
    pub fn tier_for(&self, priority: f32) -> Option<Tier> {
        let t = &self.thresholds;
        if priority >= t.focus {
            Some(Tier::Focus)
        } else if priority >= t.fresh {
            Some(Tier::Fresh)
        } else if priority >= t.long_term {
            Some(Tier::LongTerm)
        } else if priority >= t.archival {
            Some(Tier::Archival)
        } else {
            None
        }
    }

    /// Route a newly ingested item.
    pub fn route(&self, signals: &SignalVector, weights: &RouterWeights) -> RouteDecision {
        let priority = self.priority(signals, weights);
        RouteDecision {
            priority,
            tier: self.tier_for(priority),
        }
    }

    /// Route an item whose fresh window elapsed.
    ///
    /// The item can only move on: to long_term, archival or discard.
    pub fn route_expired(&self, signals: &SignalVector, weights: &RouterWeights) -> RouteDecision {
        let mut decision = self.route(signals, weights);
        decision.tier = decision.tier.map(|tier| match tier {
            Tier::Focus | Tier::Fresh => Tier::LongTerm,
            other => other,
        });
        decision
    }

    /// Route a reinforced item currently held in `current`.
    ///
    /// Moves at most one tier toward focus and never demotes or discards.
    pub fn route_promotion(&self, current: Tier, signals: &SignalVector, weights: &RouterWeights) -> RouteDecision {
        let priority = self.priority(signals, weights);
        let earned = self.tier_for(priority).unwrap_or(Tier::Archival);
        let tier = if earned.rank() < current.rank() {
            current.one_step_up().unwrap_or(current)
        } else {
            current
        };
        RouteDecision {
            priority,
            tier: Some(tier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::types::Signal;
    use chrono::Utc;

    fn router() -> Router {
        Router::new(TierThresholds::default())
    }

    fn weights() -> RouterWeights {
        RouterWeights::new("agent-a", RouterConfig::builtin_weights(), Utc::now())
    }

    #[test]
    fn test_thresholds_map_to_tiers() {
        let r = router();
        assert_eq!(r.tier_for(0.9), Some(Tier::Focus));
        assert_eq!(r.tier_for(0.85), Some(Tier::Focus));
        assert_eq!(r.tier_for(0.7), Some(Tier::Fresh));
        assert_eq!(r.tier_for(0.3), Some(Tier::LongTerm));
        assert_eq!(r.tier_for(0.1), Some(Tier::Archival));
        assert_eq!(r.tier_for(0.0), Some(Tier::Archival));
    }

    #[test]
    fn test_discard_below_archival_threshold() {
        let r = Router::new(TierThresholds {
            archival: 0.1,
            ..TierThresholds::default()
        });
        assert_eq!(r.tier_for(0.05), None);
        assert!(r.route(&SignalVector::zero(), &weights()).tier.is_none());
    }

    #[test]
    fn test_priority_is_clipped() {
        let signals = SignalVector::zero()
            .with(Signal::ExplicitFlag, 1.0)
            .with(Signal::Intensity, 1.0)
            .with(Signal::Recency, 1.0);
        let decision = router().route(&signals, &weights());
        assert_eq!(decision.priority, 1.0);
        assert_eq!(decision.tier, Some(Tier::Focus));
    }

    #[test]
    fn test_negative_weights_clip_at_zero() {
        let mut w = weights();
        for v in w.weights.values_mut() {
            *v = -*v;
        }
        let signals = SignalVector::zero().with(Signal::Recency, 1.0);
        assert_eq!(router().priority(&signals, &w), 0.0);
    }

    #[test]
    fn test_expired_items_never_return_to_buffers() {
        let signals = SignalVector::zero().with(Signal::ExplicitFlag, 1.0);
        let decision = router().route_expired(&signals, &weights());
        assert_eq!(decision.tier, Some(Tier::LongTerm));
    }

    #[test]
    fn test_promotion_moves_one_step() {
        let r = router();
        let hot = SignalVector::zero().with(Signal::ExplicitFlag, 1.0);
        let cold = SignalVector::zero();

        assert_eq!(r.route_promotion(Tier::Archival, &hot, &weights()).tier, Some(Tier::LongTerm));
        assert_eq!(r.route_promotion(Tier::LongTerm, &hot, &weights()).tier, Some(Tier::Fresh));
        assert_eq!(r.route_promotion(Tier::Fresh, &hot, &weights()).tier, Some(Tier::Focus));
        assert_eq!(r.route_promotion(Tier::Focus, &hot, &weights()).tier, Some(Tier::Focus));
        // Low priority never demotes.
        assert_eq!(r.route_promotion(Tier::LongTerm, &cold, &weights()).tier, Some(Tier::LongTerm));
    }
}
