//! Engine statistics, health flags and the integration score.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StrataError;
use crate::router::LearnerStatus;
use crate::types::{PatternState, PredictionStatus, Tier};

/// Count and average strength of one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub count: usize,
    pub avg_strength: f32,
}

/// Last known state of one background job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobHealth {
    pub job: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Failures since the last success.
    pub consecutive_failures: u64,
}

impl JobHealth {
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures > 0
    }
}

/// Degraded-health flags raised by background work.
///
/// Failures in decay, learning or classification never reach `ingest` or
/// `recall`; they are recorded here and surfaced through `get_stats`.
#[derive(Debug, Default)]
pub struct HealthFlags {
    jobs: Mutex<BTreeMap<String, JobHealth>>,
}

impl HealthFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, job: &str, at: DateTime<Utc>) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let entry = jobs.entry(job.to_string()).or_insert_with(|| JobHealth {
            job: job.to_string(),
            ..Default::default()
        });
        entry.last_success_at = Some(at);
        entry.consecutive_failures = 0;
    }

    pub fn record_failure(&self, job: &str, error: &StrataError, at: DateTime<Utc>) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let entry = jobs.entry(job.to_string()).or_insert_with(|| JobHealth {
            job: job.to_string(),
            ..Default::default()
        });
        entry.last_failure_at = Some(at);
        entry.last_error = Some(error.to_string());
        entry.consecutive_failures += 1;
    }

    /// True when any job's most recent run failed.
    pub fn is_degraded(&self) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.values().any(JobHealth::is_degraded)
    }

    pub fn snapshot(&self) -> Vec<JobHealth> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.values().cloned().collect()
    }
}

/// Health section of [`EngineStats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub degraded: bool,
    pub jobs: Vec<JobHealth>,
}

/// Observability snapshot returned by `get_stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub tiers: BTreeMap<Tier, TierStats>,
    pub learning: LearnerStatus,
    pub pending_feedback: usize,
    pub patterns_by_state: BTreeMap<PatternState, usize>,
    pub predictions_by_status: HashMap<PredictionStatus, usize>,
    pub mean_prediction_accuracy: Option<f32>,
    pub health: HealthReport,
    /// Introspective aggregate in [0, 1]; nothing routes on it.
    pub integration_score: f32,
    pub generated_at: DateTime<Utc>,
}

const BALANCE_WEIGHT: f32 = 0.4;
const ACCURACY_WEIGHT: f32 = 0.4;
const SHARING_WEIGHT: f32 = 0.2;

/// Weighted aggregate of tier balance, learning accuracy and sharing volume.
///
/// Tier balance is the normalised Shannon entropy of the tier counts; sharing
/// volume is the fraction of patterns currently exposable. Missing accuracy
/// contributes nothing.
pub fn integration_score(
    tiers: &BTreeMap<Tier, TierStats>,
    rolling_accuracy: Option<f32>,
    patterns_by_state: &BTreeMap<PatternState, usize>,
) -> f32 {
    let balance = tier_balance(tiers);
    let accuracy = rolling_accuracy.unwrap_or(0.0).clamp(0.0, 1.0);

    let total_patterns: usize = patterns_by_state.values().sum();
    let sharing = if total_patterns == 0 {
        0.0
    } else {
        let exposable: usize = patterns_by_state
            .iter()
            .filter(|(state, _)| state.is_exposable())
            .map(|(_, n)| *n)
            .sum();
        exposable as f32 / total_patterns as f32
    };

    (BALANCE_WEIGHT * balance + ACCURACY_WEIGHT * accuracy + SHARING_WEIGHT * sharing).clamp(0.0, 1.0)
}

fn tier_balance(tiers: &BTreeMap<Tier, TierStats>) -> f32 {
    let total: usize = tiers.values().map(|t| t.count).sum();
    if total == 0 || tiers.len() < 2 {
        return 0.0;
    }
    let entropy: f64 = tiers
        .values()
        .filter(|t| t.count > 0)
        .map(|t| {
            let p = t.count as f64 / total as f64;
            -p * p.ln()
        })
        .sum();
    (entropy / (tiers.len() as f64).ln()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers(counts: [usize; 4]) -> BTreeMap<Tier, TierStats> {
        [Tier::Focus, Tier::Fresh, Tier::LongTerm, Tier::Archival]
            .into_iter()
            .zip(counts)
            .map(|(tier, count)| {
                (
                    tier,
                    TierStats {
                        count,
                        avg_strength: 1.0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_balance_bounds() {
        assert_eq!(tier_balance(&tiers([0, 0, 0, 0])), 0.0);
        assert_eq!(tier_balance(&tiers([0, 0, 9, 0])), 0.0);
        assert!((tier_balance(&tiers([3, 3, 3, 3])) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_integration_score_components() {
        let empty = BTreeMap::new();
        assert_eq!(integration_score(&tiers([0, 0, 0, 0]), None, &empty), 0.0);

        let patterns = BTreeMap::from([(PatternState::Shared, 1), (PatternState::Accumulating, 1)]);
        let score = integration_score(&tiers([2, 2, 2, 2]), Some(1.0), &patterns);
        assert!((score - (0.4 + 0.4 + 0.1)).abs() < 1e-5);
    }

    #[test]
    fn test_health_flags_clear_on_success() {
        let flags = HealthFlags::new();
        let now = Utc::now();
        assert!(!flags.is_degraded());

        flags.record_failure("decay.long_term", &StrataError::database("locked"), now);
        assert!(flags.is_degraded());
        let snapshot = flags.snapshot();
        assert_eq!(snapshot[0].consecutive_failures, 1);
        assert!(snapshot[0].last_error.as_deref().unwrap_or("").contains("locked"));

        flags.record_success("decay.long_term", now);
        assert!(!flags.is_degraded());
    }
}
