//! The tiering engine: ingestion, routing, reinforcement and recall over the
//! four tiers, plus the pattern and prediction services.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::pool::{ClassificationPool, ClassifyJob};
use super::stats::{integration_score, EngineStats, HealthFlags, HealthReport, TierStats};
use crate::buffers::{FocusBuffer, FreshBuffer};
use crate::clock::{SharedClock, SystemClock};
use crate::config::EngineConfig;
use crate::decay::{curve, DecayEngine, SweepReport};
use crate::error::{StrataError, StrataResult};
use crate::events::{EventBus, EventSubscriber, TierEvent};
use crate::prediction::{OutcomePredictor, PredictionContext};
use crate::router::{
    FeedbackQueue, FeedbackSample, LearningReport, Router, WeightLearner, WeightRegistry, WeightStore,
};
use crate::sharing::PatternRegistry;
use crate::signals::SignalExtractor;
use crate::store::{open_store, retry_on_conflict, similarity};
use crate::traits::{SharedClassifier, SharedStore, TierSummary};
use crate::types::{
    ItemDraft, MemoryItem, ObservedOutcome, Pattern, PatternProposal, Prediction, ProposeOutcome, RouterWeights,
    SharedPattern, Signal, SignalVector, Tier, VerificationReport,
};

/// Pattern type proposed for items reinforced often enough.
pub const RECURRING_PATTERN_TYPE: &str = "recurring_item";

/// Result of routing one ingested item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingOutcome {
    pub item_id: String,
    /// `None` when the item was discarded.
    pub tier: Option<Tier>,
    pub priority: f32,
    pub signals: SignalVector,
    /// Focus resident pushed down to fresh to make room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evicted: Option<String>,
    pub routed_at: DateTime<Utc>,
}

/// What one fresh-buffer flush did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlushReport {
    pub expired: usize,
    pub persisted: usize,
    pub discarded: usize,
    /// Items put back into fresh after a failed write.
    pub requeued: usize,
}

/// Result of reinforcing one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinforceOutcome {
    pub item_id: String,
    pub from: Tier,
    pub tier: Tier,
    pub strength: f32,
    pub priority: f32,
    pub reinforcement_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_pattern_id: Option<String>,
}

impl ReinforceOutcome {
    fn new(item: &MemoryItem, from: Tier) -> Self {
        Self {
            item_id: item.id.clone(),
            from,
            tier: item.tier,
            strength: item.strength,
            priority: item.priority,
            reinforcement_count: item.reinforcement_count,
            proposed_pattern_id: None,
        }
    }

    pub fn promoted(&self) -> bool {
        self.tier.rank() < self.from.rank()
    }
}

/// Builder for [`TieringEngine`].
pub struct TieringEngineBuilder {
    config: EngineConfig,
    store: Option<SharedStore>,
    clock: Option<SharedClock>,
    classifier: Option<SharedClassifier>,
    events: Option<EventBus>,
}

impl TieringEngineBuilder {
    /// Use `store` instead of opening the configured backend.
    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Upstream content-classification hook.
    pub fn classifier(mut self, classifier: SharedClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration and start the classification workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> StrataResult<Arc<TieringEngine>> {
        let config = self.config;
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => open_store(&config.store)?,
        };
        let clock: SharedClock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self.events.unwrap_or_default();

        let mut extractor = SignalExtractor::new(config.signals.clone());
        if let Some(classifier) = self.classifier {
            extractor = extractor.with_classifier(classifier);
        }

        info!(
            focus_capacity = config.focus.capacity,
            fresh_window_secs = config.fresh.window_secs,
            workers = config.runtime.workers,
            "Starting tiering engine"
        );

        Ok(Arc::new_cyclic(|engine| TieringEngine {
            focus: Mutex::new(FocusBuffer::new(config.focus.capacity)),
            fresh: Mutex::new(FreshBuffer::new(config.fresh.window_secs)),
            extractor,
            router: Router::new(config.router.thresholds),
            weights: WeightRegistry::new(config.router.default_weights.clone()),
            feedback: FeedbackQueue::new(),
            learner: WeightLearner::new(config.router.clone(), config.retry.clone()),
            decay: DecayEngine::new(
                store.clone(),
                config.decay.clone(),
                config.retry.clone(),
                clock.clone(),
                events.clone(),
            ),
            patterns: PatternRegistry::new(config.sharing.clone(), clock.clone(), events.clone()),
            predictor: OutcomePredictor::new(config.prediction.clone(), clock.clone(), events.clone()),
            pool: ClassificationPool::start(
                engine.clone(),
                config.runtime.workers,
                config.runtime.queue_capacity,
            ),
            health: HealthFlags::new(),
            shutdown: CancellationToken::new(),
            store,
            clock,
            events,
            config,
        }))
    }
}

/// Memory tiering engine.
///
/// Focus and fresh are in-process buffers behind their own locks; long_term
/// and archival live in the [`crate::traits::MemoryStore`]. An item is resident
/// in exactly one of the four at any time.
pub struct TieringEngine {
    config: EngineConfig,
    store: SharedStore,
    focus: Mutex<FocusBuffer>,
    fresh: Mutex<FreshBuffer>,
    extractor: SignalExtractor,
    router: Router,
    weights: WeightRegistry,
    feedback: FeedbackQueue,
    learner: WeightLearner,
    decay: DecayEngine,
    patterns: PatternRegistry,
    predictor: OutcomePredictor,
    events: EventBus,
    clock: SharedClock,
    health: HealthFlags,
    shutdown: CancellationToken,
    pool: ClassificationPool,
}

impl TieringEngine {
    pub fn builder(config: EngineConfig) -> TieringEngineBuilder {
        TieringEngineBuilder {
            config,
            store: None,
            clock: None,
            classifier: None,
            events: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.events.subscribe()
    }

    pub fn health(&self) -> &HealthFlags {
        &self.health
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Token cancelled by [`TieringEngine::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Jobs waiting for a classification worker.
    pub fn queued_jobs(&self) -> usize {
        self.pool.queued()
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Validate `draft` and queue it for classification.
    ///
    /// Malformed drafts fail here; routing happens on a worker.
    pub async fn ingest(&self, draft: ItemDraft) -> StrataResult<String> {
        SignalExtractor::validate(&draft)?;
        let id = Uuid::new_v4().to_string();
        self.pool
            .submit(ClassifyJob {
                id: id.clone(),
                draft,
                ack: None,
            })
            .await?;
        Ok(id)
    }

    /// Like [`TieringEngine::ingest`] but waits for the routing outcome.
    pub async fn ingest_and_wait(&self, draft: ItemDraft) -> StrataResult<RoutingOutcome> {
        SignalExtractor::validate(&draft)?;
        let (tx, rx) = oneshot::channel();
        self.pool
            .submit(ClassifyJob {
                id: Uuid::new_v4().to_string(),
                draft,
                ack: Some(tx),
            })
            .await?;
        rx.await
            .map_err(|_| StrataError::Internal("classification worker dropped the job".to_string()))?
    }

    /// Extract signals, route, and place the item. Runs on a pool worker.
    pub(crate) async fn classify(&self, id: &str, draft: ItemDraft) -> StrataResult<RoutingOutcome> {
        let now = self.clock.now();
        let comparisons = self.comparison_scores(&draft.content).await;
        let window = (!comparisons.is_empty()).then_some(comparisons.as_slice());
        let signals = self.extractor.extract(&draft, window, now)?;

        let weights = self.weights.snapshot(&draft.source_agent_id, now);
        let decision = self.router.route(&signals, &weights);
        let mut outcome = RoutingOutcome {
            item_id: id.to_string(),
            tier: decision.tier,
            priority: decision.priority,
            signals,
            evicted: None,
            routed_at: now,
        };

        let Some(tier) = decision.tier else {
            self.discard(id, decision.priority, signals, now);
            return Ok(outcome);
        };

        let item = MemoryItem::new(id, draft.content, draft.source_agent_id, draft.event_time, now).with_route(
            tier,
            decision.priority,
            signals,
        );
        outcome.evicted = match tier {
            Tier::Focus => self.offer_focus(item, now)?,
            Tier::Fresh => {
                self.offer_fresh(item, now);
                None
            }
            Tier::LongTerm | Tier::Archival => {
                self.store.upsert(item, None).await?;
                None
            }
        };

        debug!(item_id = %id, tier = %tier, priority = decision.priority, "Item routed");
        self.events.emit(TierEvent::Routed {
            item_id: id.to_string(),
            tier,
            priority: decision.priority,
            timestamp: now,
        });
        Ok(outcome)
    }

    /// Similarity of `content` to stored and buffered items.
    ///
    /// A failed store lookup degrades to buffer-only comparisons.
    async fn comparison_scores(&self, content: &str) -> Vec<f32> {
        let window = self.config.signals.comparison_window;
        if window == 0 {
            return Vec::new();
        }

        let mut scores: Vec<f32> = match self.store.find_similar(content, window).await {
            Ok(similar) => similar.into_iter().map(|s| s.score).collect(),
            Err(e) => {
                warn!(error = %e, "Similarity lookup failed, scoring novelty against buffers only");
                Vec::new()
            }
        };

        let resident: Vec<String> = {
            let focus = self.focus.lock().unwrap_or_else(|e| e.into_inner());
            let fresh = self.fresh.lock().unwrap_or_else(|e| e.into_inner());
            focus
                .peek_all()
                .into_iter()
                .chain(fresh.peek_all())
                .map(|item| item.content)
                .collect()
        };
        scores.extend(resident.iter().map(|other| similarity::similarity(content, other)));
        scores
    }

    /// Offer to focus; the evicted resident moves down to fresh.
    fn offer_focus(&self, item: MemoryItem, now: DateTime<Utc>) -> StrataResult<Option<String>> {
        let item_id = item.id.clone();
        let evicted = {
            let mut focus = self.focus.lock().unwrap_or_else(|e| e.into_inner());
            focus.offer(item)
        };
        let evicted = match evicted {
            Ok(evicted) => evicted,
            Err(e) => {
                error!(item_id = %item_id, error = %e, "Focus buffer rejected item, dropping it");
                return Err(e);
            }
        };

        let Some(evicted) = evicted else {
            return Ok(None);
        };
        let evicted_id = evicted.id.clone();
        debug!(item_id = %evicted_id, priority = evicted.priority, "Focus full, evicting to fresh");
        self.events.emit(TierEvent::Evicted {
            item_id: evicted_id.clone(),
            priority: evicted.priority,
            timestamp: now,
        });
        self.offer_fresh(evicted, now);
        Ok(Some(evicted_id))
    }

    fn offer_fresh(&self, item: MemoryItem, now: DateTime<Utc>) {
        let mut fresh = self.fresh.lock().unwrap_or_else(|e| e.into_inner());
        fresh.offer(item, now);
    }

    fn discard(&self, item_id: &str, priority: f32, signals: SignalVector, now: DateTime<Utc>) {
        warn!(item_id = %item_id, priority, signals = ?signals, "Priority below every threshold, discarding item");
        self.events.emit(TierEvent::Discarded {
            item_id: item_id.to_string(),
            priority,
            signals,
            timestamp: now,
        });
    }

    /// Re-route every fresh item whose window has elapsed.
    ///
    /// Expired items go to long_term, archival or an explicit discard. An item
    /// whose write fails is put back into fresh and the error is returned
    /// after the rest of the batch is processed.
    pub async fn flush_fresh(&self) -> StrataResult<FlushReport> {
        let now = self.clock.now();
        let expired = {
            let mut fresh = self.fresh.lock().unwrap_or_else(|e| e.into_inner());
            fresh.take_expired(now)
        };

        let mut report = FlushReport {
            expired: expired.len(),
            ..Default::default()
        };
        let mut failure = None;

        for mut item in expired {
            self.events.emit(TierEvent::Expired {
                item_id: item.id.clone(),
                timestamp: now,
            });

            let weights = self.weights.snapshot(&item.source_agent_id, now);
            let decision = self.router.route_expired(&item.signals, &weights);
            let Some(tier) = decision.tier else {
                self.discard(&item.id, decision.priority, item.signals, now);
                report.discarded += 1;
                continue;
            };

            item.priority = decision.priority;
            curve::rebase_to_tier(&mut item, tier, &self.config.decay, now);
            match self.store.upsert(item.clone(), None).await {
                Ok(stored) => {
                    report.persisted += 1;
                    self.events.emit(TierEvent::Routed {
                        item_id: stored.id,
                        tier,
                        priority: stored.priority,
                        timestamp: now,
                    });
                }
                Err(e) => {
                    error!(item_id = %item.id, error = %e, "Failed to persist expired item, keeping it in fresh");
                    self.offer_fresh(item, now);
                    report.requeued += 1;
                    failure = Some(e);
                }
            }
        }

        if report.expired > 0 {
            info!(
                expired = report.expired,
                persisted = report.persisted,
                discarded = report.discarded,
                requeued = report.requeued,
                "Fresh buffer flushed"
            );
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    // ------------------------------------------------------------------
    // Reinforcement and recall
    // ------------------------------------------------------------------

    /// Reinforce an item wherever it lives.
    ///
    /// Restores strength, restarts the decay clock and re-runs the router,
    /// which may lift the item one tier toward focus. Reaching
    /// `promotion_candidate_after` reinforcements proposes a recurring-item
    /// pattern on behalf of the source agent.
    pub async fn reinforce(&self, item_id: &str) -> StrataResult<ReinforceOutcome> {
        if item_id.trim().is_empty() {
            return Err(StrataError::missing_field("item_id"));
        }
        let now = self.clock.now();

        let (mut outcome, item) = match self.reinforce_buffered(item_id, now)? {
            Some(found) => found,
            None => self.reinforce_persisted(item_id, now).await?,
        };

        if outcome.promoted() {
            info!(item_id = %item_id, from = %outcome.from, to = %outcome.tier, "Item promoted");
            self.events.emit(TierEvent::Promoted {
                item_id: item_id.to_string(),
                from: outcome.from,
                to: outcome.tier,
                timestamp: now,
            });
        }

        let threshold = self.config.decay.promotion_candidate_after;
        if threshold > 0 && outcome.reinforcement_count == threshold {
            outcome.proposed_pattern_id = self.propose_recurring(&item);
        }
        Ok(outcome)
    }

    fn reinforce_buffered(
        &self,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> StrataResult<Option<(ReinforceOutcome, MemoryItem)>> {
        {
            let mut focus = self.focus.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(mut item) = focus.take(item_id) {
                self.strengthen(&mut item, now);
                let weights = self.weights.snapshot(&item.source_agent_id, now);
                item.priority = self.router.route_promotion(Tier::Focus, &item.signals, &weights).priority;
                let snapshot = item.clone();
                focus.offer(item)?;
                return Ok(Some((ReinforceOutcome::new(&snapshot, Tier::Focus), snapshot)));
            }
        }

        let taken = {
            let mut fresh = self.fresh.lock().unwrap_or_else(|e| e.into_inner());
            fresh.take(item_id)
        };
        let Some(mut item) = taken else {
            return Ok(None);
        };

        self.strengthen(&mut item, now);
        let weights = self.weights.snapshot(&item.source_agent_id, now);
        let decision = self.router.route_promotion(Tier::Fresh, &item.signals, &weights);
        item.priority = decision.priority;

        let mut snapshot = item.clone();
        if decision.tier == Some(Tier::Focus) {
            snapshot.tier = Tier::Focus;
            self.offer_focus(item, now)?;
        } else {
            self.offer_fresh(item, now);
        }
        Ok(Some((ReinforceOutcome::new(&snapshot, Tier::Fresh), snapshot)))
    }

    async fn reinforce_persisted(&self, item_id: &str, now: DateTime<Utc>) -> StrataResult<(ReinforceOutcome, MemoryItem)> {
        let (item, from) = retry_on_conflict(&self.config.retry, item_id, || async {
            let mut item = self
                .store
                .get(item_id)
                .await?
                .ok_or_else(|| StrataError::item_not_found(item_id))?;
            let from = item.tier;
            let version = item.version;

            self.strengthen(&mut item, now);
            let weights = self.weights.snapshot(&item.source_agent_id, now);
            let decision = self.router.route_promotion(from, &item.signals, &weights);
            item.priority = decision.priority;

            match decision.tier.unwrap_or(from) {
                Tier::Focus | Tier::Fresh => {
                    if !self.store.remove(item_id, version).await? {
                        return Err(StrataError::item_not_found(item_id));
                    }
                    item.tier = Tier::Fresh;
                    Ok((item, from))
                }
                tier => {
                    item.tier = tier;
                    let stored = self.store.upsert(item, Some(version)).await?;
                    Ok((stored, from))
                }
            }
        })
        .await?;

        if item.tier == Tier::Fresh {
            self.offer_fresh(item.clone(), now);
        }
        Ok((ReinforceOutcome::new(&item, from), item))
    }

    fn strengthen(&self, item: &mut MemoryItem, now: DateTime<Utc>) {
        curve::reinforce(item, &self.config.decay, now);
        let step = 1.0 / self.config.signals.repetition_saturation.max(1) as f32;
        let repetition = (item.signals.get(Signal::Repetition) + step).min(1.0);
        item.signals.set(Signal::Repetition, repetition);
    }

    fn propose_recurring(&self, item: &MemoryItem) -> Option<String> {
        let payload = serde_json::json!({ "tokens": similarity::tokens(&item.content) });
        let proposal = PatternProposal::new(item.source_agent_id.as_str(), RECURRING_PATTERN_TYPE, payload)
            .with_signature(item.signals)
            .with_confidence(item.priority);
        match self.patterns.propose(proposal) {
            Ok(outcome) => {
                debug!(item_id = %item.id, pattern_id = %outcome.pattern_id, "Proposed recurring-item pattern");
                Some(outcome.pattern_id)
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Failed to propose recurring-item pattern");
                None
            }
        }
    }

    /// Look an item up in whichever tier holds it.
    pub async fn get_item(&self, item_id: &str) -> StrataResult<Option<MemoryItem>> {
        {
            let focus = self.focus.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(item) = focus.get(item_id) {
                return Ok(Some(item.clone()));
            }
        }
        {
            let fresh = self.fresh.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(item) = fresh.get(item_id) {
                return Ok(Some(item.clone()));
            }
        }
        self.store.get(item_id).await
    }

    /// Items across tiers, highest priority first, at most
    /// `recall.max_results`.
    ///
    /// Equal priorities are ordered by how closely the item's signals match
    /// `query_signals`. Persisted items report their current decayed strength.
    pub async fn recall(&self, query_signals: &SignalVector, tier_filter: Option<Tier>) -> StrataResult<Vec<MemoryItem>> {
        if !query_signals.is_well_formed() {
            return Err(StrataError::invalid_field("query_signals", "query signals must be in [0, 1]"));
        }
        let now = self.clock.now();
        let tiers: Vec<Tier> = match tier_filter {
            Some(tier) => vec![tier],
            None => Tier::iter().collect(),
        };

        let mut items = Vec::new();
        for tier in tiers {
            match tier {
                Tier::Focus => {
                    let focus = self.focus.lock().unwrap_or_else(|e| e.into_inner());
                    items.extend(focus.peek_all());
                }
                Tier::Fresh => {
                    let fresh = self.fresh.lock().unwrap_or_else(|e| e.into_inner());
                    items.extend(fresh.peek_all());
                }
                Tier::LongTerm | Tier::Archival => {
                    let stored = self.store.scan_tier(tier, Some(self.config.recall.scan_limit)).await?;
                    items.extend(stored.into_iter().map(|mut item| {
                        item.strength = curve::current_strength(&item, &self.config.decay, now);
                        item
                    }));
                }
            }
        }

        let mut scored: Vec<(f32, MemoryItem)> = items
            .into_iter()
            .map(|item| (query_signals.match_score(&item.signals), item))
            .collect();
        scored.sort_by(|a, b| b.1.priority.total_cmp(&a.1.priority).then(b.0.total_cmp(&a.0)));
        scored.truncate(self.config.recall.max_results);
        Ok(scored.into_iter().map(|(_, item)| item).collect())
    }

    // ------------------------------------------------------------------
    // Router learning
    // ------------------------------------------------------------------

    /// Queue a routing judgement for the next learning cycle.
    pub async fn submit_feedback(&self, item_id: &str, was_correct: bool, observed_importance: f32) -> StrataResult<()> {
        if !observed_importance.is_finite() || !(0.0..=1.0).contains(&observed_importance) {
            return Err(StrataError::invalid_field(
                "observed_importance",
                format!("observed_importance must be in [0, 1], got {}", observed_importance),
            ));
        }
        let item = self
            .get_item(item_id)
            .await?
            .ok_or_else(|| StrataError::item_not_found(item_id))?;
        self.feedback.push(FeedbackSample {
            item_id: item.id,
            agent_id: item.source_agent_id,
            was_correct,
            observed_importance,
            signals: item.signals,
            predicted_priority: item.priority,
            recorded_at: self.clock.now(),
        });
        Ok(())
    }

    pub fn pending_feedback(&self) -> usize {
        self.feedback.len()
    }

    /// Current weights for `agent_id` (defaults before any learning).
    pub fn router_weights(&self, agent_id: &str) -> RouterWeights {
        self.weights.snapshot(agent_id, self.clock.now())
    }

    /// Apply one batch of queued feedback to the router weights.
    pub async fn run_learning_cycle(&self) -> StrataResult<LearningReport> {
        let now = self.clock.now();
        let report = self.learner.run_cycle(&self.weights, &self.feedback, now).await?;
        for weights in &report.updated {
            self.events.emit(TierEvent::WeightsUpdated {
                agent_id: weights.agent_id.clone(),
                version: weights.version,
                learning_rate: report.learning_rate,
                timestamp: now,
            });
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Decay
    // ------------------------------------------------------------------

    /// Decay one persisted tier.
    pub async fn decay_sweep(&self, tier: Tier, cancel: &CancellationToken) -> StrataResult<SweepReport> {
        self.decay.decay_sweep(tier, cancel).await
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    pub fn propose_pattern(&self, proposal: PatternProposal) -> StrataResult<ProposeOutcome> {
        self.patterns.propose(proposal)
    }

    /// Record an agent's vote; returns the new tally.
    pub fn vote(&self, agent_id: &str, pattern_id: &str, helpful: bool) -> StrataResult<i64> {
        self.patterns.vote(agent_id, pattern_id, helpful)
    }

    /// Anonymized view of every shareable pattern.
    pub fn get_shareable_patterns(&self) -> Vec<SharedPattern> {
        self.patterns.get_shareable()
    }

    pub fn override_block(&self, pattern_id: &str, admin_id: &str) -> StrataResult<Pattern> {
        self.patterns.override_block(pattern_id, admin_id)
    }

    pub fn get_pattern(&self, pattern_id: &str) -> Option<Pattern> {
        self.patterns.get(pattern_id)
    }

    // ------------------------------------------------------------------
    // Predictions
    // ------------------------------------------------------------------

    /// Predict events within `horizon` from the shareable patterns.
    ///
    /// Without an explicit context the mean signal vector of the focus buffer
    /// is used (fresh when focus is empty), tied to its top item.
    pub fn generate_predictions(
        &self,
        horizon: Duration,
        context: Option<PredictionContext>,
    ) -> StrataResult<Vec<Prediction>> {
        let context = context.unwrap_or_else(|| self.attention_context());
        let patterns = self.patterns.shareable_patterns();
        self.predictor.generate(&patterns, &context, horizon, &self.shutdown)
    }

    fn attention_context(&self) -> PredictionContext {
        let focus = {
            let focus = self.focus.lock().unwrap_or_else(|e| e.into_inner());
            focus.peek_all()
        };
        let items = if focus.is_empty() {
            let fresh = self.fresh.lock().unwrap_or_else(|e| e.into_inner());
            fresh.peek_all()
        } else {
            focus
        };

        let top = items.iter().max_by(|a, b| a.priority.total_cmp(&b.priority));
        PredictionContext {
            signals: SignalVector::mean(items.iter().map(|i| &i.signals)).unwrap_or_default(),
            context_item_id: top.map(|i| i.id.clone()),
        }
    }

    /// Reconcile a prediction with what happened and calibrate its patterns.
    pub async fn verify(&self, prediction_id: &str, outcome: ObservedOutcome) -> StrataResult<VerificationReport> {
        let report = self.predictor.verify(&self.patterns, prediction_id, outcome)?;
        self.forward_prediction_feedback(&report).await;
        Ok(report)
    }

    /// Expire overdue predictions (accuracy 0) and calibrate their patterns.
    pub async fn expire_predictions(&self, cancel: &CancellationToken) -> StrataResult<Vec<VerificationReport>> {
        let reports = self.predictor.expire_overdue(&self.patterns, cancel)?;
        for report in &reports {
            self.forward_prediction_feedback(report).await;
        }
        self.predictor.prune_resolved();
        Ok(reports)
    }

    pub fn get_prediction(&self, prediction_id: &str) -> Option<Prediction> {
        self.predictor.get(prediction_id)
    }

    /// Feed a resolved prediction back to the router as a judgement on the
    /// item that provided its context.
    async fn forward_prediction_feedback(&self, report: &VerificationReport) {
        let Some(item_id) = self
            .predictor
            .get(&report.prediction_id)
            .and_then(|p| p.context_item_id)
        else {
            return;
        };

        match self.get_item(&item_id).await {
            Ok(Some(item)) => self.feedback.push(FeedbackSample {
                item_id: item.id,
                agent_id: item.source_agent_id,
                was_correct: report.accuracy_score >= 0.5,
                observed_importance: report.accuracy_score,
                signals: item.signals,
                predicted_priority: item.priority,
                recorded_at: self.clock.now(),
            }),
            Ok(None) => debug!(item_id = %item_id, "Context item gone, skipping router feedback"),
            Err(e) => warn!(item_id = %item_id, error = %e, "Failed to load context item for router feedback"),
        }
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    /// Snapshot of tier occupancy, learning, patterns, predictions and
    /// health. Never fails: a store error is reported as degraded health.
    pub async fn get_stats(&self) -> EngineStats {
        let now = self.clock.now();
        let summary = match self.store.tier_summary().await {
            Ok(summary) => {
                self.health.record_success("store", now);
                summary
            }
            Err(e) => {
                warn!(error = %e, "Tier summary unavailable");
                self.health.record_failure("store", &e, now);
                TierSummary::default()
            }
        };

        let mut tiers = BTreeMap::new();
        {
            let focus = self.focus.lock().unwrap_or_else(|e| e.into_inner());
            tiers.insert(Tier::Focus, buffer_stats(&focus.peek_all()));
        }
        {
            let fresh = self.fresh.lock().unwrap_or_else(|e| e.into_inner());
            tiers.insert(Tier::Fresh, buffer_stats(&fresh.peek_all()));
        }
        for tier in Tier::persisted() {
            tiers.insert(
                tier,
                TierStats {
                    count: summary.counts.get(&tier).copied().unwrap_or(0),
                    avg_strength: summary.avg_strength.get(&tier).copied().unwrap_or(0.0),
                },
            );
        }

        let learning = self.learner.status();
        let patterns_by_state: BTreeMap<_, _> = self.patterns.counts_by_state().into_iter().collect();
        let score = integration_score(&tiers, learning.rolling_accuracy, &patterns_by_state);

        EngineStats {
            tiers,
            pending_feedback: self.feedback.len(),
            patterns_by_state,
            predictions_by_status: self.predictor.counts_by_status(),
            mean_prediction_accuracy: self.predictor.mean_accuracy(),
            health: HealthReport {
                degraded: self.health.is_degraded(),
                jobs: self.health.snapshot(),
            },
            learning,
            integration_score: score,
            generated_at: now,
        }
    }

    /// Cancel running sweeps and prediction runs, then drain the
    /// classification queue.
    pub async fn shutdown(&self) {
        info!("Shutting down tiering engine");
        self.shutdown.cancel();
        self.pool.shutdown().await;
    }
}

fn buffer_stats(items: &[MemoryItem]) -> TierStats {
    let count = items.len();
    let avg_strength = if count == 0 {
        0.0
    } else {
        items.iter().map(|i| i.strength).sum::<f32>() / count as f32
    };
    TierStats { count, avg_strength }
}
