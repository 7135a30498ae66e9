//! Persistence trait for the long_term and archival tiers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StrataResult;
use crate::types::{MemoryItem, Tier};

/// A stored item similar to some probe content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarItem {
    pub id: String,
    /// Similarity in [0, 1].
    pub score: f32,
    pub tier: Tier,
}

/// Per-tier counts and average strength.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierSummary {
    pub counts: HashMap<Tier, usize>,
    pub avg_strength: HashMap<Tier, f32>,
}

/// Persistence layer with per-item optimistic concurrency.
///
/// Every successful write returns the stored item with `version` bumped by
/// one. Writers pass the version they read; a mismatch fails with
/// `StrataError::ConcurrentUpdateConflict` and nothing is written.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Fetch an item by id.
    async fn get(&self, id: &str) -> StrataResult<Option<MemoryItem>>;

    /// Insert (`expected_version = None`, item must not exist) or
    /// compare-and-set (`Some(v)`, stored version must equal `v`).
    async fn upsert(&self, item: MemoryItem, expected_version: Option<u64>) -> StrataResult<MemoryItem>;

    /// Remove an item if its stored version equals `expected_version`.
    ///
    /// Returns `false` when the item does not exist.
    async fn remove(&self, id: &str, expected_version: u64) -> StrataResult<bool>;

    /// Items in one tier, ordered by id, at most `limit`.
    async fn scan_tier(&self, tier: Tier, limit: Option<usize>) -> StrataResult<Vec<MemoryItem>>;

    /// Items whose content is similar to `content`, best first.
    async fn find_similar(&self, content: &str, limit: usize) -> StrataResult<Vec<SimilarItem>>;

    /// Counts and average strength per persisted tier.
    async fn tier_summary(&self) -> StrataResult<TierSummary>;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn MemoryStore>;
