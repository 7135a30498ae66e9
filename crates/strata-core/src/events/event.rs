//! Tier lifecycle events.
//!
//! Emitted whenever an item, pattern, prediction or weight vector changes
//! state, so observers can follow the engine without polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PatternState, PredictionStatus, SignalVector, Tier};

/// Engine lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TierEvent {
    /// Router placed an item.
    Routed {
        item_id: String,
        tier: Tier,
        priority: f32,
        timestamp: DateTime<Utc>,
    },
    /// Focus buffer pushed its lowest resident down to fresh.
    Evicted {
        item_id: String,
        priority: f32,
        timestamp: DateTime<Utc>,
    },
    /// Fresh window elapsed; the item is being re-routed.
    Expired {
        item_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Priority fell below every threshold; the item was dropped.
    Discarded {
        item_id: String,
        priority: f32,
        signals: SignalVector,
        timestamp: DateTime<Utc>,
    },
    /// An item moved one tier toward focus.
    Promoted {
        item_id: String,
        from: Tier,
        to: Tier,
        timestamp: DateTime<Utc>,
    },
    /// A weakened long_term item moved to archival.
    Archived {
        item_id: String,
        strength: f32,
        timestamp: DateTime<Utc>,
    },
    /// Strength fell below the floor; the item was removed.
    Purged {
        item_id: String,
        tier: Tier,
        strength: f32,
        signals: SignalVector,
        timestamp: DateTime<Utc>,
    },
    PatternStateChanged {
        pattern_id: String,
        from: PatternState,
        to: PatternState,
        timestamp: DateTime<Utc>,
    },
    PredictionResolved {
        prediction_id: String,
        status: PredictionStatus,
        accuracy_score: f32,
        timestamp: DateTime<Utc>,
    },
    WeightsUpdated {
        agent_id: String,
        version: u64,
        learning_rate: f32,
        timestamp: DateTime<Utc>,
    },
}

impl TierEvent {
    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Routed { .. } => "item.routed",
            Self::Evicted { .. } => "item.evicted",
            Self::Expired { .. } => "item.expired",
            Self::Discarded { .. } => "item.discarded",
            Self::Promoted { .. } => "item.promoted",
            Self::Archived { .. } => "item.archived",
            Self::Purged { .. } => "item.purged",
            Self::PatternStateChanged { .. } => "pattern.state_changed",
            Self::PredictionResolved { .. } => "prediction.resolved",
            Self::WeightsUpdated { .. } => "weights.updated",
        }
    }

    /// Id of the item, pattern, prediction or agent the event concerns.
    pub fn subject_id(&self) -> &str {
        match self {
            Self::Routed { item_id, .. }
            | Self::Evicted { item_id, .. }
            | Self::Expired { item_id, .. }
            | Self::Discarded { item_id, .. }
            | Self::Promoted { item_id, .. }
            | Self::Archived { item_id, .. }
            | Self::Purged { item_id, .. } => item_id,
            Self::PatternStateChanged { pattern_id, .. } => pattern_id,
            Self::PredictionResolved { prediction_id, .. } => prediction_id,
            Self::WeightsUpdated { agent_id, .. } => agent_id,
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Routed { timestamp, .. }
            | Self::Evicted { timestamp, .. }
            | Self::Expired { timestamp, .. }
            | Self::Discarded { timestamp, .. }
            | Self::Promoted { timestamp, .. }
            | Self::Archived { timestamp, .. }
            | Self::Purged { timestamp, .. }
            | Self::PatternStateChanged { timestamp, .. }
            | Self::PredictionResolved { timestamp, .. }
            | Self::WeightsUpdated { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = TierEvent::Promoted {
            item_id: "m1".to_string(),
            from: Tier::Archival,
            to: Tier::LongTerm,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "promoted");
        assert_eq!(json["from"], "archival");
        assert_eq!(event.event_type(), "item.promoted");
        assert_eq!(event.subject_id(), "m1");
    }
}
