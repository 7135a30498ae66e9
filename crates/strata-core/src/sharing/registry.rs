//! Pattern registry: de-duplication, voting and the sharing state machine.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::{anonymize, sensitive};
use crate::clock::SharedClock;
use crate::config::SharingConfig;
use crate::error::{StrataError, StrataResult};
use crate::events::{EventBus, TierEvent};
use crate::store::similarity;
use crate::types::{
    BlockReason, Pattern, PatternProposal, PatternState, ProposeOutcome, SharedPattern, MAX_LEAD_TIME_SECS,
};

/// Confidence given to proposals that do not state one.
const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Default)]
struct RegistryInner {
    patterns: HashMap<String, Pattern>,
    by_key: HashMap<String, String>,
}

/// Multi-agent pattern registry.
///
/// All mutation happens under one write lock, so merges and vote tallies are
/// atomic across concurrent agents.
pub struct PatternRegistry {
    config: SharingConfig,
    inner: RwLock<RegistryInner>,
    clock: SharedClock,
    events: EventBus,
}

impl PatternRegistry {
    pub fn new(config: SharingConfig, clock: SharedClock, events: EventBus) -> Self {
        Self {
            config,
            inner: RwLock::new(RegistryInner::default()),
            clock,
            events,
        }
    }

    pub fn config(&self) -> &SharingConfig {
        &self.config
    }

    /// Record a proposal, merging into an equivalent pattern when one exists.
    pub fn propose(&self, proposal: PatternProposal) -> StrataResult<ProposeOutcome> {
        validate_proposal(&proposal)?;
        let now = self.clock.now();
        let key = match &proposal.similarity_key {
            Some(key) => key.clone(),
            None => similarity_key(&proposal.pattern_type, &proposal.description_payload),
        };

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if let Some(existing_id) = inner.by_key.get(&key).cloned() {
            let pattern = inner
                .patterns
                .get_mut(&existing_id)
                .ok_or_else(|| StrataError::Internal(format!("dangling similarity key for {}", existing_id)))?;

            let n = pattern.occurrence_count as f32;
            if let Some(c) = proposal.confidence {
                pattern.confidence = ((pattern.confidence * n + c) / (n + 1.0)).clamp(0.0, 1.0);
            }
            pattern.occurrence_count += 1;
            pattern.contributor_agent_ids.insert(proposal.agent_id.clone());
            if pattern.signature.is_none() {
                pattern.signature = proposal.signature;
            }
            if pattern.predicted_event.is_empty() {
                if let Some(event) = &proposal.predicted_event {
                    pattern.predicted_event = event.clone();
                    pattern.lead_time_secs = proposal.lead_time_secs.unwrap_or(0);
                }
            }
            pattern.updated_at = now;

            self.evaluate(pattern, now);
            return Ok(ProposeOutcome {
                pattern_id: pattern.id.clone(),
                merged: true,
                occurrence_count: pattern.occurrence_count,
                state: pattern.state,
            });
        }

        let mut pattern = Pattern {
            id: Uuid::new_v4().to_string(),
            pattern_type: proposal.pattern_type,
            description_payload: proposal.description_payload,
            similarity_key: key.clone(),
            confidence: proposal.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            contributor_agent_ids: BTreeSet::from([proposal.agent_id]),
            vote_tally: 0,
            votes: HashMap::new(),
            occurrence_count: 1,
            k_anon_satisfied: false,
            state: PatternState::Proposed,
            created_at: now,
            updated_at: now,
            lineage_parent_id: proposal.lineage_parent_id,
            signature: proposal.signature,
            predicted_event: proposal.predicted_event.unwrap_or_default(),
            lead_time_secs: proposal.lead_time_secs.unwrap_or(0),
            block_reason: None,
            override_applied: false,
        };
        self.evaluate(&mut pattern, now);

        let outcome = ProposeOutcome {
            pattern_id: pattern.id.clone(),
            merged: false,
            occurrence_count: pattern.occurrence_count,
            state: pattern.state,
        };
        inner.by_key.insert(key, pattern.id.clone());
        inner.patterns.insert(pattern.id.clone(), pattern);
        Ok(outcome)
    }

    /// Cast or replace `agent_id`'s vote on a pattern; returns the new tally.
    pub fn vote(&self, agent_id: &str, pattern_id: &str, helpful: bool) -> StrataResult<i64> {
        if agent_id.trim().is_empty() {
            return Err(StrataError::missing_field("agent_id"));
        }
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let pattern = inner
            .patterns
            .get_mut(pattern_id)
            .ok_or_else(|| StrataError::pattern_not_found(pattern_id))?;

        let previous = pattern.votes.insert(agent_id.to_string(), helpful);
        pattern.vote_tally -= previous.map(vote_value).unwrap_or(0);
        pattern.vote_tally += vote_value(helpful);
        pattern.updated_at = now;

        match pattern.state {
            PatternState::Shared if pattern.vote_tally >= self.config.reinforce_votes => {
                self.transition(pattern, PatternState::Reinforced, now);
            }
            PatternState::Shared | PatternState::Reinforced
                if pattern.vote_tally <= -self.config.deprecate_votes =>
            {
                self.transition(pattern, PatternState::Deprecated, now);
            }
            _ => {}
        }
        Ok(pattern.vote_tally)
    }

    /// Exposable patterns with noised aggregates, highest confidence first.
    ///
    /// Eligible patterns become `Shared` on their first exposure.
    pub fn get_shareable(&self) -> Vec<SharedPattern> {
        let mut rng = rand::thread_rng();
        self.get_shareable_with_rng(&mut rng)
    }

    /// [`PatternRegistry::get_shareable`] with a provided RNG.
    pub fn get_shareable_with_rng<R: Rng>(&self, rng: &mut R) -> Vec<SharedPattern> {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        let mut shared = Vec::new();
        for pattern in inner.patterns.values_mut() {
            if !self.is_shareable(pattern) {
                continue;
            }
            if pattern.state == PatternState::Eligible {
                self.transition(pattern, PatternState::Shared, now);
            }
            shared.push(anonymize::to_shared_with_rng(rng, pattern, &self.config));
        }
        shared.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then_with(|| a.id.cmp(&b.id)));
        shared
    }

    /// Internal copies of every currently shareable pattern.
    pub fn shareable_patterns(&self) -> Vec<Pattern> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<Pattern> = inner
            .patterns
            .values()
            .filter(|p| self.is_shareable(p))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    fn is_shareable(&self, pattern: &Pattern) -> bool {
        pattern.state.is_exposable()
            && pattern.k_anon_satisfied
            && anonymize::satisfies_k_anonymity(
                pattern.occurrence_count,
                pattern.contributor_agent_ids.len() as u64,
                &self.config,
            )
    }

    /// Clear a sensitive-content block after administrative review.
    pub fn override_block(&self, pattern_id: &str, admin_id: &str) -> StrataResult<Pattern> {
        if admin_id.trim().is_empty() {
            return Err(StrataError::missing_field("admin_id"));
        }
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let pattern = inner
            .patterns
            .get_mut(pattern_id)
            .ok_or_else(|| StrataError::pattern_not_found(pattern_id))?;

        if pattern.state != PatternState::Blocked {
            return Err(StrataError::invalid_field(
                "pattern_id",
                format!("pattern {} is {}, not blocked", pattern_id, pattern.state),
            ));
        }

        info!(pattern_id = %pattern_id, admin_id = %admin_id, rules = ?pattern.block_reason.as_ref().map(|r| &r.rules), "Sensitive-content block overridden");
        pattern.override_applied = true;
        pattern.block_reason = None;
        pattern.updated_at = now;
        let next = if pattern.k_anon_satisfied {
            PatternState::Eligible
        } else {
            PatternState::Accumulating
        };
        self.transition(pattern, next, now);
        Ok(pattern.clone())
    }

    /// Fold an accuracy score into a pattern's confidence by EMA; returns the
    /// new confidence.
    pub fn apply_calibration(&self, pattern_id: &str, accuracy: f32, alpha: f32) -> StrataResult<f32> {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let pattern = inner
            .patterns
            .get_mut(pattern_id)
            .ok_or_else(|| StrataError::pattern_not_found(pattern_id))?;

        let accuracy = accuracy.clamp(0.0, 1.0);
        pattern.confidence = (pattern.confidence * (1.0 - alpha) + accuracy * alpha).clamp(0.0, 1.0);
        pattern.updated_at = now;

        if matches!(pattern.state, PatternState::Shared | PatternState::Reinforced)
            && pattern.confidence < self.config.deprecate_confidence
        {
            self.transition(pattern, PatternState::Deprecated, now);
        }
        Ok(pattern.confidence)
    }

    pub fn get(&self, pattern_id: &str) -> Option<Pattern> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.patterns.get(pattern_id).cloned()
    }

    /// Pattern count per state.
    pub fn counts_by_state(&self) -> HashMap<PatternState, usize> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut counts = HashMap::new();
        for pattern in inner.patterns.values() {
            *counts.entry(pattern.state).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.patterns.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance `pattern` through the accumulation and eligibility states.
    fn evaluate(&self, pattern: &mut Pattern, now: DateTime<Utc>) {
        pattern.k_anon_satisfied = anonymize::satisfies_k_anonymity(
            pattern.occurrence_count,
            pattern.contributor_agent_ids.len() as u64,
            &self.config,
        );

        match pattern.state {
            PatternState::Proposed | PatternState::Accumulating => {
                if pattern.k_anon_satisfied {
                    self.check_eligibility(pattern, now);
                } else if pattern.state == PatternState::Proposed && pattern.occurrence_count > 1 {
                    self.transition(pattern, PatternState::Accumulating, now);
                }
            }
            _ => {}
        }
    }

    /// Run the sensitive-content scan and either admit or block the pattern.
    fn check_eligibility(&self, pattern: &mut Pattern, now: DateTime<Utc>) {
        let rules = if pattern.override_applied {
            Vec::new()
        } else {
            sensitive::scan(&pattern.description_payload)
        };

        if rules.is_empty() {
            self.transition(pattern, PatternState::Eligible, now);
        } else {
            warn!(pattern_id = %pattern.id, rules = ?rules, "Pattern blocked by sensitive-content scan");
            pattern.block_reason = Some(BlockReason { rules, blocked_at: now });
            self.transition(pattern, PatternState::Blocked, now);
        }
    }

    fn transition(&self, pattern: &mut Pattern, to: PatternState, now: DateTime<Utc>) {
        let from = pattern.state;
        if from == to {
            return;
        }
        pattern.state = to;
        pattern.updated_at = now;
        info!(pattern_id = %pattern.id, from = %from, to = %to, "Pattern state changed");
        self.events.emit(TierEvent::PatternStateChanged {
            pattern_id: pattern.id.clone(),
            from,
            to,
            timestamp: now,
        });
    }
}

fn vote_value(helpful: bool) -> i64 {
    if helpful {
        1
    } else {
        -1
    }
}

fn validate_proposal(proposal: &PatternProposal) -> StrataResult<()> {
    if proposal.agent_id.trim().is_empty() {
        return Err(StrataError::missing_field("agent_id"));
    }
    if proposal.pattern_type.trim().is_empty() {
        return Err(StrataError::missing_field("pattern_type"));
    }
    if let Some(c) = proposal.confidence {
        if !c.is_finite() || !(0.0..=1.0).contains(&c) {
            return Err(StrataError::invalid_field("confidence", "confidence must be in [0, 1]"));
        }
    }
    if let Some(signature) = &proposal.signature {
        if !signature.is_well_formed() {
            return Err(StrataError::invalid_field("signature", "signature values must be in [0, 1]"));
        }
    }
    if let Some(lead) = proposal.lead_time_secs {
        if !(0..=MAX_LEAD_TIME_SECS).contains(&lead) {
            return Err(StrataError::invalid_field(
                "lead_time_secs",
                format!("lead_time_secs must be in [0, {}]", MAX_LEAD_TIME_SECS),
            ));
        }
    }
    Ok(())
}

/// De-duplication key: SHA-256 over the pattern type and the sorted content
/// tokens of every string in the payload.
pub fn similarity_key(pattern_type: &str, payload: &serde_json::Value) -> String {
    let mut text = String::new();
    flatten(payload, &mut text);
    let tokens = similarity::tokens(&text);

    let mut hasher = Sha256::new();
    hasher.update(pattern_type.trim().to_lowercase().as_bytes());
    for token in tokens {
        hasher.update(b"\x1f");
        hasher.update(token.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn flatten(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push(' ');
            out.push_str(s);
        }
        serde_json::Value::Number(n) => {
            out.push(' ');
            out.push_str(&n.to_string());
        }
        serde_json::Value::Bool(b) => {
            out.push(' ');
            out.push_str(if *b { "true" } else { "false" });
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| flatten(v, out)),
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                out.push(' ');
                out.push_str(k);
                flatten(v, out);
            }
        }
        serde_json::Value::Null => {}
    }
}
