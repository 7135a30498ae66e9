//! Prediction types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Whether `t` lies inside the window.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    /// Seconds between `t` and the nearest window edge; zero inside.
    pub fn distance_secs(&self, t: DateTime<Utc>) -> i64 {
        if self.contains(t) {
            0
        } else if t < self.start {
            (self.start - t).num_seconds()
        } else {
            (t - self.end).num_seconds().max(0)
        }
    }
}

/// Prediction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictionStatus {
    Pending,
    Verified,
    Expired,
}

/// A confidence-scored forecast derived from shared patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub based_on_pattern_ids: Vec<String>,
    pub predicted_event: String,
    pub predicted_time_window: TimeWindow,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub status: PredictionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_outcome: Option<ObservedOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_score: Option<f32>,
    /// Memory item whose context produced the match, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_item_id: Option<String>,
}

/// What actually happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedOutcome {
    pub event: String,
    pub occurred_at: DateTime<Utc>,
}

impl ObservedOutcome {
    pub fn new(event: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event: event.into(),
            occurred_at,
        }
    }
}

/// Result of reconciling one prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub prediction_id: String,
    pub status: PredictionStatus,
    pub accuracy_score: f32,
    /// Pattern confidence after the update, per pattern id.
    pub pattern_confidence: Vec<(String, f32)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_window_contains_and_distance() {
        let now = Utc::now();
        let w = TimeWindow::new(now, now + Duration::hours(1));
        assert!(w.contains(now + Duration::minutes(30)));
        assert!(!w.contains(now + Duration::hours(1)));
        assert_eq!(w.distance_secs(now + Duration::minutes(10)), 0);
        assert_eq!(w.distance_secs(now - Duration::minutes(5)), 300);
        assert_eq!(w.distance_secs(now + Duration::minutes(70)), 600);
    }

    #[test]
    fn test_window_normalises_order() {
        let now = Utc::now();
        let w = TimeWindow::new(now + Duration::hours(1), now);
        assert!(w.start < w.end);
    }
}
