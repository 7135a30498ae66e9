//! Versioned per-agent weight records.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::{StrataError, StrataResult};
use crate::types::{RouterWeights, Signal};

/// Versioned weight records the learning loop reads and writes.
#[cfg_attr(test, mockall::automock)]
pub trait WeightStore: Send + Sync {
    /// Default weight table for agents with nothing learned.
    fn defaults(&self) -> &BTreeMap<Signal, f32>;

    /// Current weights for `agent_id`; a version-0 default record when none exist.
    fn snapshot(&self, agent_id: &str, now: DateTime<Utc>) -> RouterWeights;

    /// Store `next` if the stored version still equals `expected_version`.
    ///
    /// Returns the stored record with its version bumped.
    fn compare_and_swap(&self, next: RouterWeights, expected_version: u64) -> StrataResult<RouterWeights>;
}

/// Holds one [`RouterWeights`] record per agent.
///
/// Reads return a snapshot; writes go through [`WeightStore::compare_and_swap`]
/// so concurrent writers for the same agent cannot overwrite each other.
pub struct WeightRegistry {
    defaults: BTreeMap<Signal, f32>,
    records: RwLock<HashMap<String, RouterWeights>>,
}

impl WeightRegistry {
    pub fn new(defaults: BTreeMap<Signal, f32>) -> Self {
        Self {
            defaults,
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl WeightStore for WeightRegistry {
    fn defaults(&self) -> &BTreeMap<Signal, f32> {
        &self.defaults
    }

    fn snapshot(&self, agent_id: &str, now: DateTime<Utc>) -> RouterWeights {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| RouterWeights::new(agent_id, self.defaults.clone(), now))
    }

    fn compare_and_swap(&self, mut next: RouterWeights, expected_version: u64) -> StrataResult<RouterWeights> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let actual = records.get(&next.agent_id).map(|r| r.version).unwrap_or(0);
        if actual != expected_version {
            return Err(StrataError::conflict(
                format!("weights:{}", next.agent_id),
                expected_version,
                Some(actual),
            ));
        }
        next.version = actual + 1;
        records.insert(next.agent_id.clone(), next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;

    fn registry() -> WeightRegistry {
        WeightRegistry::new(RouterConfig::builtin_weights())
    }

    #[test]
    fn test_snapshot_defaults() {
        let reg = registry();
        let w = reg.snapshot("agent-a", Utc::now());
        assert_eq!(w.version, 0);
        assert_eq!(w.weight(Signal::ExplicitFlag), 1.0);
    }

    #[test]
    fn test_cas_bumps_version() {
        let reg = registry();
        let mut w = reg.snapshot("agent-a", Utc::now());
        w.weights.insert(Signal::Novelty, 0.4);
        let stored = reg.compare_and_swap(w, 0).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(reg.snapshot("agent-a", Utc::now()).weight(Signal::Novelty), 0.4);
        assert_eq!(reg.snapshot("agent-b", Utc::now()).version, 0);
    }

    #[test]
    fn test_stale_cas_rejected() {
        let reg = registry();
        let base = reg.snapshot("agent-a", Utc::now());
        reg.compare_and_swap(base.clone(), 0).unwrap();
        let err = reg.compare_and_swap(base, 0).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(reg.snapshot("agent-a", Utc::now()).version, 1);
    }
}
