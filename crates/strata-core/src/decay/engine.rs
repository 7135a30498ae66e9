//! Decay sweeps over the persisted tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::curve;
use crate::clock::SharedClock;
use crate::config::{DecayConfig, RetryPolicy};
use crate::error::{StrataError, StrataResult};
use crate::events::{EventBus, TierEvent};
use crate::store::retry_on_conflict;
use crate::traits::SharedStore;
use crate::types::{MemoryItem, Tier};

/// What one sweep did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub tier: Option<Tier>,
    pub scanned: usize,
    pub updated: usize,
    pub archived: usize,
    pub purged: usize,
    /// True when the sweep stopped early on cancellation.
    pub cancelled: bool,
}

/// Per-item outcome of a sweep step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Unchanged,
    Updated,
    Archived,
    Purged,
    Gone,
}

/// Applies the forgetting curve to persisted items.
///
/// Every item update is an independent compare-and-set, so a cancelled or
/// failed sweep leaves each item either fully updated or untouched and can be
/// rerun from scratch.
pub struct DecayEngine {
    store: SharedStore,
    config: DecayConfig,
    retry: RetryPolicy,
    clock: SharedClock,
    events: EventBus,
}

impl DecayEngine {
    pub fn new(store: SharedStore, config: DecayConfig, retry: RetryPolicy, clock: SharedClock, events: EventBus) -> Self {
        Self {
            store,
            config,
            retry,
            clock,
            events,
        }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Decay every item in `tier`, archiving weakened long_term items and
    /// purging anything below the floor.
    pub async fn decay_sweep(&self, tier: Tier, cancel: &CancellationToken) -> StrataResult<SweepReport> {
        if !tier.is_persisted() {
            return Err(StrataError::invalid_field(
                "tier",
                format!("decay sweeps run on long_term or archival, not {}", tier),
            ));
        }

        let items = self.store.scan_tier(tier, None).await?;
        let mut report = SweepReport {
            tier: Some(tier),
            ..Default::default()
        };

        for (i, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                info!(tier = %tier, processed = report.scanned, "Decay sweep cancelled");
                break;
            }
            if i > 0 && self.config.batch_size > 0 && i % self.config.batch_size == 0 {
                tokio::task::yield_now().await;
            }

            report.scanned += 1;
            match self.sweep_item(&item.id).await? {
                ItemOutcome::Updated => report.updated += 1,
                ItemOutcome::Archived => report.archived += 1,
                ItemOutcome::Purged => report.purged += 1,
                ItemOutcome::Unchanged | ItemOutcome::Gone => {}
            }
        }

        info!(
            tier = %tier,
            scanned = report.scanned,
            updated = report.updated,
            archived = report.archived,
            purged = report.purged,
            "Decay sweep complete"
        );
        Ok(report)
    }

    async fn sweep_item(&self, id: &str) -> StrataResult<ItemOutcome> {
        retry_on_conflict(&self.retry, id, || async {
            let now = self.clock.now();
            let Some(mut item) = self.store.get(id).await? else {
                return Ok(ItemOutcome::Gone);
            };
            if !item.tier.is_persisted() {
                return Ok(ItemOutcome::Unchanged);
            }

            let strength = curve::current_strength(&item, &self.config, now);
            if strength < self.config.floor {
                let version = item.version;
                item.strength = strength;
                if self.store.remove(id, version).await? {
                    self.log_purge(&item, now);
                    return Ok(ItemOutcome::Purged);
                }
                return Ok(ItemOutcome::Gone);
            }

            let changed = (strength - item.strength).abs() > f32::EPSILON;
            item.strength = strength;

            let outcome = if curve::is_archival_candidate(&item, &self.config, now) {
                curve::rebase_to_tier(&mut item, Tier::Archival, &self.config, now);
                ItemOutcome::Archived
            } else if changed {
                ItemOutcome::Updated
            } else {
                return Ok(ItemOutcome::Unchanged);
            };

            let version = item.version;
            let stored = self.store.upsert(item, Some(version)).await?;
            if outcome == ItemOutcome::Archived {
                debug!(item_id = %stored.id, strength = stored.strength, "Moved long_term item to archival");
                self.events.emit(TierEvent::Archived {
                    item_id: stored.id.clone(),
                    strength: stored.strength,
                    timestamp: now,
                });
            }
            Ok(outcome)
        })
        .await
    }

    fn log_purge(&self, item: &MemoryItem, now: DateTime<Utc>) {
        info!(
            item_id = %item.id,
            tier = %item.tier,
            strength = item.strength,
            reinforcement_count = item.reinforcement_count,
            signals = ?item.signals,
            "Purged memory item below decay floor"
        );
        self.events.emit(TierEvent::Purged {
            item_id: item.id.clone(),
            tier: item.tier,
            strength: item.strength,
            signals: item.signals,
            timestamp: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::store::InMemoryStore;
    use crate::traits::MemoryStore;
    use chrono::Duration;
    use std::sync::Arc;

    struct Fixture {
        engine: DecayEngine,
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        events: EventBus,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let events = EventBus::new();
        let engine = DecayEngine::new(
            store.clone(),
            DecayConfig::default(),
            RetryPolicy::default(),
            clock.clone(),
            events.clone(),
        );
        Fixture {
            engine,
            store,
            clock,
            events,
        }
    }

    async fn seed(f: &Fixture, id: &str, tier: Tier) -> MemoryItem {
        let now = f.clock.now();
        let mut item = MemoryItem::new(id, id, "agent-a", now, now);
        item.tier = tier;
        f.store.upsert(item, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_sweep_decays_strength() {
        let f = fixture();
        seed(&f, "m1", Tier::LongTerm).await;
        f.clock.advance(Duration::hours(10));

        let report = f.engine.decay_sweep(Tier::LongTerm, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.updated, 1);
        let item = f.store.get("m1").await.unwrap().unwrap();
        assert!((item.strength - (-0.2f32).exp()).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let f = fixture();
        seed(&f, "m1", Tier::LongTerm).await;
        f.clock.advance(Duration::hours(10));
        let token = CancellationToken::new();

        f.engine.decay_sweep(Tier::LongTerm, &token).await.unwrap();
        let first = f.store.get("m1").await.unwrap().unwrap().strength;
        let again = f.engine.decay_sweep(Tier::LongTerm, &token).await.unwrap();
        assert_eq!(again.updated, 0);
        assert_eq!(f.store.get("m1").await.unwrap().unwrap().strength, first);
    }

    #[tokio::test]
    async fn test_purges_below_floor_with_event() {
        let f = fixture();
        let mut sub = f.events.subscribe();
        seed(&f, "m1", Tier::Archival).await;
        // exp(-0.005 * 800) ~ 0.018 < 0.05
        f.clock.advance(Duration::hours(800));

        let report = f.engine.decay_sweep(Tier::Archival, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.purged, 1);
        assert!(f.store.get("m1").await.unwrap().is_none());
        let events = sub.drain();
        assert!(events.iter().any(|e| matches!(e, TierEvent::Purged { item_id, .. } if item_id == "m1")));
    }

    #[tokio::test]
    async fn test_weak_long_term_items_move_to_archival() {
        let f = fixture();
        seed(&f, "m1", Tier::LongTerm).await;
        // exp(-0.02 * 70) ~ 0.25 < 0.3 and older than 24h
        f.clock.advance(Duration::hours(70));

        let report = f.engine.decay_sweep(Tier::LongTerm, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.archived, 1);
        let item = f.store.get("m1").await.unwrap().unwrap();
        assert_eq!(item.tier, Tier::Archival);

        // Later archival sweeps keep decaying from where long_term left off.
        let at_move = item.strength;
        f.clock.advance(Duration::hours(10));
        f.engine.decay_sweep(Tier::Archival, &CancellationToken::new()).await.unwrap();
        assert!(f.store.get("m1").await.unwrap().unwrap().strength < at_move);
    }

    #[tokio::test]
    async fn test_cancelled_sweep_leaves_items_untouched() {
        let f = fixture();
        seed(&f, "a", Tier::LongTerm).await;
        seed(&f, "b", Tier::LongTerm).await;
        f.clock.advance(Duration::hours(5));

        let token = CancellationToken::new();
        token.cancel();
        let report = f.engine.decay_sweep(Tier::LongTerm, &token).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.scanned, 0);
        for id in ["a", "b"] {
            let item = f.store.get(id).await.unwrap().unwrap();
            assert_eq!(item.strength, 1.0);
            assert_eq!(item.version, 1);
        }
    }

    #[tokio::test]
    async fn test_rejects_buffer_tiers() {
        let f = fixture();
        assert!(f.engine.decay_sweep(Tier::Focus, &CancellationToken::new()).await.is_err());
    }
}
