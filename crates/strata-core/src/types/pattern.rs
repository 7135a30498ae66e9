//! Cross-agent pattern types.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::signals::SignalVector;

/// Lifecycle state of a pattern.
///
/// `Proposed -> Accumulating (count < k) -> Eligible (count >= k) -> Shared -> Reinforced | Deprecated`.
/// `Blocked` is reached from the eligibility check when the content scan flags the payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatternState {
    Proposed,
    Accumulating,
    Eligible,
    Shared,
    Reinforced,
    Deprecated,
    Blocked,
}

impl PatternState {
    /// States whose aggregates may cross the sharing boundary.
    pub fn is_exposable(self) -> bool {
        matches!(self, PatternState::Eligible | PatternState::Shared | PatternState::Reinforced)
    }
}

/// Why the sensitive-content scan blocked a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReason {
    /// Names of the rules that matched.
    pub rules: Vec<String>,
    /// When the block was applied.
    pub blocked_at: DateTime<Utc>,
}

/// A generalized observation, possibly contributed by several agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub pattern_type: String,
    /// Opaque payload describing the pattern.
    pub description_payload: serde_json::Value,
    /// De-duplication key; equivalent proposals share it.
    pub similarity_key: String,
    /// Calibrated confidence in [0, 1].
    pub confidence: f32,
    pub contributor_agent_ids: BTreeSet<String>,
    /// Net helpful minus unhelpful votes.
    pub vote_tally: i64,
    /// Latest vote per agent.
    pub votes: HashMap<String, bool>,
    pub occurrence_count: u64,
    pub k_anon_satisfied: bool,
    pub state: PatternState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_parent_id: Option<String>,
    /// Signal context in which the pattern applies; used for prediction matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignalVector>,
    /// Event the pattern anticipates.
    pub predicted_event: String,
    /// Typical delay between the matching context and the event.
    pub lead_time_secs: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,
    /// Set when an administrator cleared a block.
    #[serde(default)]
    pub override_applied: bool,
}

/// Longest accepted lead time between a matching context and its event.
pub const MAX_LEAD_TIME_SECS: i64 = 366 * 24 * 3600;

/// Input to `propose_pattern`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternProposal {
    pub agent_id: String,
    pub pattern_type: String,
    pub description_payload: serde_json::Value,
    /// Explicit de-duplication key; derived from type and payload when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignalVector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_time_secs: Option<i64>,
}

impl PatternProposal {
    /// Create a proposal with only the required fields.
    pub fn new(
        agent_id: impl Into<String>,
        pattern_type: impl Into<String>,
        description_payload: serde_json::Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            pattern_type: pattern_type.into(),
            description_payload,
            similarity_key: None,
            confidence: None,
            lineage_parent_id: None,
            signature: None,
            predicted_event: None,
            lead_time_secs: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_signature(mut self, signature: SignalVector) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_prediction(mut self, event: impl Into<String>, lead_time_secs: i64) -> Self {
        self.predicted_event = Some(event.into());
        self.lead_time_secs = Some(lead_time_secs);
        self
    }
}

/// Result of `propose_pattern`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeOutcome {
    pub pattern_id: String,
    /// True when the proposal merged into an existing pattern.
    pub merged: bool,
    pub occurrence_count: u64,
    pub state: PatternState,
}

/// A pattern as exposed across agents.
///
/// Carries no contributor identities and only noise-perturbed aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedPattern {
    pub id: String,
    pub pattern_type: String,
    pub description_payload: serde_json::Value,
    pub confidence: f32,
    pub occurrence_count: u64,
    pub contributor_count: u64,
    pub vote_tally: i64,
    pub state: PatternState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_parent_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposable_states() {
        assert!(PatternState::Eligible.is_exposable());
        assert!(PatternState::Shared.is_exposable());
        assert!(PatternState::Reinforced.is_exposable());
        assert!(!PatternState::Accumulating.is_exposable());
        assert!(!PatternState::Deprecated.is_exposable());
        assert!(!PatternState::Blocked.is_exposable());
    }

    #[test]
    fn test_proposal_builder() {
        let p = PatternProposal::new("a1", "sleep", serde_json::json!({"text": "late nights"}))
            .with_confidence(0.7)
            .with_prediction("low_energy", 3600);
        assert_eq!(p.confidence, Some(0.7));
        assert_eq!(p.predicted_event.as_deref(), Some("low_energy"));
        assert_eq!(p.lead_time_secs, Some(3600));
    }
}
