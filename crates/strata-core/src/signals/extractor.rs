//! Signal extraction for incoming drafts.

use chrono::{DateTime, Utc};

use super::lexical;
use crate::config::SignalConfig;
use crate::error::{StrataError, StrataResult};
use crate::traits::SharedClassifier;
use crate::types::{ItemDraft, Signal, SignalHints, SignalVector};

/// Scores a draft along every signal dimension.
///
/// Deterministic for a given draft, comparison window and `now`. Does no I/O;
/// the caller fetches similarity scores beforehand.
pub struct SignalExtractor {
    config: SignalConfig,
    classifier: Option<SharedClassifier>,
}

impl SignalExtractor {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            config,
            classifier: None,
        }
    }

    /// Install an upstream classifier whose hints take precedence over the
    /// lexical heuristics.
    pub fn with_classifier(mut self, classifier: SharedClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Reject drafts the engine cannot score.
    pub fn validate(draft: &ItemDraft) -> StrataResult<()> {
        if draft.content.trim().is_empty() {
            return Err(StrataError::missing_field("content"));
        }
        if draft.source_agent_id.trim().is_empty() {
            return Err(StrataError::missing_field("source_agent_id"));
        }
        if let Some(importance) = draft.explicit_importance {
            if !importance.is_finite() || !(0.0..=1.0).contains(&importance) {
                return Err(StrataError::invalid_field(
                    "explicit_importance",
                    format!("explicit_importance must be in [0, 1], got {}", importance),
                ));
            }
        }
        if let Some(hints) = &draft.hints {
            check_hint("hints.intensity", hints.intensity)?;
            check_hint("hints.social_significance", hints.social_significance)?;
            check_hint("hints.goal_relevance", hints.goal_relevance)?;
        }
        Ok(())
    }

    /// Compute the signal vector of `draft`.
    ///
    /// `comparisons` holds similarity scores in [0, 1] against recently seen
    /// items; `None` means no comparison window is available and novelty
    /// defaults to 1.0.
    pub fn extract(
        &self,
        draft: &ItemDraft,
        comparisons: Option<&[f32]>,
        now: DateTime<Utc>,
    ) -> StrataResult<SignalVector> {
        Self::validate(draft)?;

        let hints = self.hints_for(draft);
        let mut signals = SignalVector::zero();

        signals.set(Signal::Recency, self.recency(draft.event_time, now));
        signals.set(
            Signal::Intensity,
            hints.intensity.unwrap_or_else(|| lexical::intensity(&draft.content)),
        );
        signals.set(
            Signal::SocialSignificance,
            hints
                .social_significance
                .unwrap_or_else(|| lexical::social_significance(&draft.content)),
        );
        signals.set(
            Signal::GoalRelevance,
            hints
                .goal_relevance
                .unwrap_or_else(|| lexical::goal_relevance(&draft.content, &draft.goals)),
        );

        let (novelty, repetition) = match comparisons {
            None => (1.0, 0.0),
            Some(scores) => {
                let max = scores.iter().copied().filter(|s| s.is_finite()).fold(0.0f32, f32::max);
                let repeats = scores
                    .iter()
                    .filter(|s| **s >= self.config.similarity_threshold)
                    .count();
                let saturation = self.config.repetition_saturation.max(1) as f32;
                (1.0 - max.clamp(0.0, 1.0), (repeats as f32 / saturation).min(1.0))
            }
        };
        signals.set(Signal::Novelty, novelty);
        signals.set(Signal::Repetition, repetition);
        signals.set(Signal::ExplicitFlag, draft.explicit_importance.unwrap_or(0.0));

        Ok(signals)
    }

    /// `exp(-dt / tau)`; events stamped in the future count as happening now.
    fn recency(&self, event_time: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let dt = (now - event_time).num_milliseconds().max(0) as f64 / 1000.0;
        (-dt / self.config.recency_tau_secs).exp() as f32
    }

    fn hints_for(&self, draft: &ItemDraft) -> SignalHints {
        let supplied = draft.hints.unwrap_or_default();
        match &self.classifier {
            Some(classifier) => supplied.or(classifier.classify(&draft.content)),
            None => supplied,
        }
    }
}

fn check_hint(field: &str, value: Option<f32>) -> StrataResult<()> {
    match value {
        Some(v) if !v.is_finite() || !(0.0..=1.0).contains(&v) => Err(StrataError::invalid_field(
            field,
            format!("{} must be in [0, 1], got {}", field, v),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockContentClassifier;
    use chrono::Duration;
    use std::sync::Arc;

    fn extractor() -> SignalExtractor {
        SignalExtractor::new(SignalConfig::default())
    }

    #[test]
    fn test_deterministic_for_same_inputs() {
        let now = Utc::now();
        let draft = ItemDraft::new("argued with my brother!", now - Duration::minutes(5), "agent-a");
        let a = extractor().extract(&draft, Some(&[0.2, 0.7]), now).unwrap();
        let b = extractor().extract(&draft, Some(&[0.2, 0.7]), now).unwrap();
        assert_eq!(a, b);
        assert!(a.is_well_formed());
    }

    #[test]
    fn test_recency_is_bounded_decay() {
        let now = Utc::now();
        let e = extractor();
        let just_now = e.extract(&ItemDraft::new("x", now, "a"), None, now).unwrap();
        let hour_ago = e
            .extract(&ItemDraft::new("x", now - Duration::hours(1), "a"), None, now)
            .unwrap();
        let week_ago = e
            .extract(&ItemDraft::new("x", now - Duration::days(7), "a"), None, now)
            .unwrap();
        let future = e
            .extract(&ItemDraft::new("x", now + Duration::hours(2), "a"), None, now)
            .unwrap();

        assert!((just_now.recency - 1.0).abs() < 1e-6);
        assert!((hour_ago.recency - (-1.0f32).exp()).abs() < 1e-4);
        assert!(week_ago.recency < 1e-3);
        assert_eq!(future.recency, 1.0);
    }

    #[test]
    fn test_novelty_defaults_to_one_without_window() {
        let now = Utc::now();
        let draft = ItemDraft::new("first time at the observatory", now, "a");
        let signals = extractor().extract(&draft, None, now).unwrap();
        assert_eq!(signals.novelty, 1.0);
        assert_eq!(signals.repetition, 0.0);

        let empty_window = extractor().extract(&draft, Some(&[]), now).unwrap();
        assert_eq!(empty_window.novelty, 1.0);
    }

    #[test]
    fn test_novelty_and_repetition_from_window() {
        let now = Utc::now();
        let draft = ItemDraft::new("coffee again", now, "a");
        let signals = extractor().extract(&draft, Some(&[0.9, 0.8, 0.1]), now).unwrap();
        assert!((signals.novelty - 0.1).abs() < 1e-6);
        // Two of three are above the 0.6 threshold; saturation is 5.
        assert!((signals.repetition - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_explicit_flag_binarised() {
        let now = Utc::now();
        let high = ItemDraft::new("x", now, "a").with_importance(0.9);
        let low = ItemDraft::new("x", now, "a").with_importance(0.2);
        assert_eq!(extractor().extract(&high, None, now).unwrap().explicit_flag, 1.0);
        assert_eq!(extractor().extract(&low, None, now).unwrap().explicit_flag, 0.0);
    }

    #[test]
    fn test_malformed_drafts_rejected() {
        let now = Utc::now();
        let e = extractor();
        assert!(e.extract(&ItemDraft::new("  ", now, "a"), None, now).is_err());
        assert!(e.extract(&ItemDraft::new("x", now, ""), None, now).is_err());
        assert!(e
            .extract(&ItemDraft::new("x", now, "a").with_importance(1.5), None, now)
            .is_err());
        assert!(e
            .extract(&ItemDraft::new("x", now, "a").with_importance(f32::NAN), None, now)
            .is_err());
        let bad_hint = SignalHints {
            intensity: Some(2.0),
            ..Default::default()
        };
        assert!(e
            .extract(&ItemDraft::new("x", now, "a").with_hints(bad_hint), None, now)
            .is_err());
    }

    #[test]
    fn test_classifier_hints_override_heuristics() {
        let mut classifier = MockContentClassifier::new();
        classifier.expect_classify().returning(|_| SignalHints {
            intensity: Some(0.9),
            social_significance: None,
            goal_relevance: None,
        });
        let e = extractor().with_classifier(Arc::new(classifier));

        let now = Utc::now();
        let draft = ItemDraft::new("dinner with my sister", now, "a");
        let signals = e.extract(&draft, None, now).unwrap();
        assert!((signals.intensity - 0.9).abs() < 1e-6);
        // Social falls back to the lexical heuristic.
        assert!(signals.social_significance > 0.0);
    }

    #[test]
    fn test_draft_hints_win_over_classifier() {
        let mut classifier = MockContentClassifier::new();
        classifier.expect_classify().returning(|_| SignalHints {
            intensity: Some(0.9),
            ..Default::default()
        });
        let e = extractor().with_classifier(Arc::new(classifier));

        let now = Utc::now();
        let draft = ItemDraft::new("x", now, "a").with_hints(SignalHints {
            intensity: Some(0.1),
            ..Default::default()
        });
        assert!((e.extract(&draft, None, now).unwrap().intensity - 0.1).abs() < 1e-6);
    }
}
