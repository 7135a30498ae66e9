//! In-process store backed by a hash map.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::similarity;
use crate::error::{StrataError, StrataResult};
use crate::traits::{MemoryStore, SimilarItem, TierSummary};
use crate::types::{MemoryItem, Tier};

/// Hash-map store with per-item versioning.
///
/// Used for tests and for deployments that accept losing persisted tiers on
/// restart.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<String, MemoryItem>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StrataError {
    StrataError::Internal(format!("store lock poisoned: {}", e))
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get(&self, id: &str) -> StrataResult<Option<MemoryItem>> {
        let items = self.items.read().map_err(poisoned)?;
        Ok(items.get(id).cloned())
    }

    async fn upsert(&self, mut item: MemoryItem, expected_version: Option<u64>) -> StrataResult<MemoryItem> {
        let mut items = self.items.write().map_err(poisoned)?;
        let current = items.get(&item.id).map(|i| i.version);

        match (expected_version, current) {
            (None, None) => item.version = 1,
            (None, Some(actual)) => {
                return Err(StrataError::conflict(&item.id, 0, Some(actual)));
            }
            (Some(expected), Some(actual)) if expected == actual => item.version = actual + 1,
            (Some(expected), actual) => {
                return Err(StrataError::conflict(&item.id, expected, actual));
            }
        }

        items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn remove(&self, id: &str, expected_version: u64) -> StrataResult<bool> {
        let mut items = self.items.write().map_err(poisoned)?;
        match items.get(id).map(|i| i.version) {
            None => Ok(false),
            Some(actual) if actual == expected_version => {
                items.remove(id);
                Ok(true)
            }
            Some(actual) => Err(StrataError::conflict(id, expected_version, Some(actual))),
        }
    }

    async fn scan_tier(&self, tier: Tier, limit: Option<usize>) -> StrataResult<Vec<MemoryItem>> {
        let items = self.items.read().map_err(poisoned)?;
        let mut out: Vec<MemoryItem> = items.values().filter(|i| i.tier == tier).cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn find_similar(&self, content: &str, limit: usize) -> StrataResult<Vec<SimilarItem>> {
        let probe = similarity::tokens(content);
        let items = self.items.read().map_err(poisoned)?;
        let mut scored: Vec<SimilarItem> = items
            .values()
            .map(|i| SimilarItem {
                id: i.id.clone(),
                score: similarity::jaccard(&probe, &similarity::tokens(&i.content)),
                tier: i.tier,
            })
            .filter(|s| s.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn tier_summary(&self) -> StrataResult<TierSummary> {
        let items = self.items.read().map_err(poisoned)?;
        let mut summary = TierSummary::default();
        let mut sums: HashMap<Tier, f32> = HashMap::new();
        for item in items.values() {
            *summary.counts.entry(item.tier).or_insert(0) += 1;
            *sums.entry(item.tier).or_insert(0.0) += item.strength;
        }
        for (tier, sum) in sums {
            let n = summary.counts.get(&tier).copied().unwrap_or(1).max(1);
            summary.avg_strength.insert(tier, sum / n as f32);
        }
        Ok(summary)
    }
}
