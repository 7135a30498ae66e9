//! Memory item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::signals::{SignalHints, SignalVector};

/// Retention tier, ordered from most to least active.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    Focus,
    Fresh,
    LongTerm,
    Archival,
}

impl Tier {
    /// Position in the forward order (focus = 0).
    pub fn rank(self) -> u8 {
        match self {
            Tier::Focus => 0,
            Tier::Fresh => 1,
            Tier::LongTerm => 2,
            Tier::Archival => 3,
        }
    }

    /// Whether items in this tier live in the persistence layer.
    pub fn is_persisted(self) -> bool {
        matches!(self, Tier::LongTerm | Tier::Archival)
    }

    /// The next tier toward focus, if any.
    pub fn one_step_up(self) -> Option<Tier> {
        match self {
            Tier::Focus => None,
            Tier::Fresh => Some(Tier::Focus),
            Tier::LongTerm => Some(Tier::Fresh),
            Tier::Archival => Some(Tier::LongTerm),
        }
    }

    /// The two persisted tiers.
    pub fn persisted() -> [Tier; 2] {
        [Tier::LongTerm, Tier::Archival]
    }
}

/// A unit of experience held by exactly one tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique identifier.
    pub id: String,
    /// Opaque payload; the engine only reads it for lexical heuristics.
    pub content: String,
    /// When the underlying event happened.
    pub event_time: DateTime<Utc>,
    /// When the item entered the engine.
    pub created_at: DateTime<Utc>,
    /// Current retention tier.
    pub tier: Tier,
    /// Retention likelihood in [0, 1].
    pub strength: f32,
    /// Strength at the last reinforcement (or creation); decay is measured from here.
    pub anchor_strength: f32,
    /// Number of reinforcements received.
    pub reinforcement_count: u32,
    /// Start of the current decay clock.
    pub last_reinforced_at: DateTime<Utc>,
    /// Signals computed when the item was routed.
    pub signals: SignalVector,
    /// Priority assigned by the router.
    pub priority: f32,
    /// Agent the item came from.
    pub source_agent_id: String,
    /// Optimistic-concurrency version; bumped on every persisted write.
    #[serde(default)]
    pub version: u64,
}

impl MemoryItem {
    /// Create a fresh item at full strength.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        source_agent_id: impl Into<String>,
        event_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            event_time,
            created_at: now,
            tier: Tier::Fresh,
            strength: 1.0,
            anchor_strength: 1.0,
            reinforcement_count: 0,
            last_reinforced_at: now,
            signals: SignalVector::zero(),
            priority: 0.0,
            source_agent_id: source_agent_id.into(),
            version: 0,
        }
    }

    /// Set the routing outcome.
    pub fn with_route(mut self, tier: Tier, priority: f32, signals: SignalVector) -> Self {
        self.tier = tier;
        self.priority = priority.clamp(0.0, 1.0);
        self.signals = signals;
        self
    }

    /// Hours elapsed on the decay clock.
    pub fn hours_since_reinforcement(&self, now: DateTime<Utc>) -> f64 {
        let secs = now.signed_duration_since(self.last_reinforced_at).num_milliseconds() as f64 / 1000.0;
        (secs / 3600.0).max(0.0)
    }
}

/// Raw input handed to `ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDraft {
    /// Opaque payload.
    pub content: String,
    /// When the event happened.
    pub event_time: DateTime<Utc>,
    /// Originating agent.
    pub source_agent_id: String,
    /// Optional caller importance in [0, 1]; at or above 0.5 sets the explicit flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_importance: Option<f32>,
    /// Active goals of the agent used for goal relevance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,
    /// Signal fields pre-populated upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<SignalHints>,
}

impl ItemDraft {
    /// Create a draft with no importance, goals or hints.
    pub fn new(content: impl Into<String>, event_time: DateTime<Utc>, source_agent_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            event_time,
            source_agent_id: source_agent_id.into(),
            explicit_importance: None,
            goals: Vec::new(),
            hints: None,
        }
    }

    /// Set the explicit importance.
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.explicit_importance = Some(importance);
        self
    }

    /// Set the active goals.
    pub fn with_goals(mut self, goals: Vec<String>) -> Self {
        self.goals = goals;
        self
    }

    /// Set upstream hints.
    pub fn with_hints(mut self, hints: SignalHints) -> Self {
        self.hints = Some(hints);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_tier_order_and_steps() {
        assert!(Tier::Focus < Tier::Fresh);
        assert!(Tier::LongTerm < Tier::Archival);
        assert_eq!(Tier::Archival.one_step_up(), Some(Tier::LongTerm));
        assert_eq!(Tier::Focus.one_step_up(), None);
        assert!(Tier::LongTerm.is_persisted());
        assert!(!Tier::Fresh.is_persisted());
    }

    #[test]
    fn test_tier_names() {
        assert_eq!(Tier::LongTerm.to_string(), "long_term");
        assert_eq!("archival".parse::<Tier>().unwrap(), Tier::Archival);
        let json = serde_json::to_string(&Tier::LongTerm).unwrap();
        assert_eq!(json, "\"long_term\"");
    }

    #[test]
    fn test_hours_since_reinforcement() {
        let now = Utc::now();
        let item = MemoryItem::new("m1", "hello", "agent-a", now, now);
        assert_eq!(item.hours_since_reinforcement(now), 0.0);
        let later = now + Duration::minutes(90);
        assert!((item.hours_since_reinforcement(later) - 1.5).abs() < 1e-9);
        // Clock skew never produces negative elapsed time.
        assert_eq!(item.hours_since_reinforcement(now - Duration::hours(1)), 0.0);
    }
}
