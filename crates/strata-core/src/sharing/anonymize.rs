//! k-anonymity check and bounded noise injection.
//!
//! Both are pure functions of their inputs so they can be tested without a
//! registry. Exact internal counts never leave this module unperturbed.

use rand::Rng;

use crate::config::SharingConfig;
use crate::types::{Pattern, SharedPattern};

/// Whether a pattern's aggregates may be exposed outside its origin.
pub fn satisfies_k_anonymity(occurrence_count: u64, distinct_contributors: u64, config: &SharingConfig) -> bool {
    occurrence_count >= config.k && distinct_contributors >= config.min_distinct_contributors
}

/// Add uniform integer noise in `[-bound, bound]` to `count`, never
/// reporting less than `floor`.
pub fn perturb_count_with_rng<R: Rng>(rng: &mut R, count: u64, bound: u64, floor: u64) -> u64 {
    let bound = bound.min(i64::MAX as u64) as i64;
    let noise = if bound == 0 { 0 } else { rng.gen_range(-bound..=bound) };
    let noisy = (count.min(i64::MAX as u64) as i64).saturating_add(noise).max(0) as u64;
    noisy.max(floor)
}

/// Perturb a signed tally by up to `bound` in either direction.
pub fn perturb_tally_with_rng<R: Rng>(rng: &mut R, tally: i64, bound: u64) -> i64 {
    let bound = bound.min(i64::MAX as u64) as i64;
    if bound == 0 {
        tally
    } else {
        tally.saturating_add(rng.gen_range(-bound..=bound))
    }
}

/// Build the externally visible view of `pattern`.
///
/// Contributor ids are dropped; counts and tally are noised, and counts are
/// clamped so the exposed view never claims fewer than the k-anonymity
/// minimums.
pub fn to_shared_with_rng<R: Rng>(rng: &mut R, pattern: &Pattern, config: &SharingConfig) -> SharedPattern {
    SharedPattern {
        id: pattern.id.clone(),
        pattern_type: pattern.pattern_type.clone(),
        description_payload: pattern.description_payload.clone(),
        confidence: pattern.confidence,
        occurrence_count: perturb_count_with_rng(rng, pattern.occurrence_count, config.noise_bound, config.k),
        contributor_count: perturb_count_with_rng(
            rng,
            pattern.contributor_agent_ids.len() as u64,
            config.noise_bound,
            config.min_distinct_contributors,
        ),
        vote_tally: perturb_tally_with_rng(rng, pattern.vote_tally, config.noise_bound),
        state: pattern.state,
        created_at: pattern.created_at,
        lineage_parent_id: pattern.lineage_parent_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_k_anonymity_needs_both_counts() {
        let config = SharingConfig::default();
        assert!(!satisfies_k_anonymity(4, 5, &config));
        assert!(!satisfies_k_anonymity(9, 4, &config));
        assert!(satisfies_k_anonymity(5, 5, &config));
    }

    #[test]
    fn test_noise_is_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let noisy = perturb_count_with_rng(&mut rng, 20, 2, 0);
            assert!((18..=22).contains(&noisy));
        }
    }

    #[test]
    fn test_noise_never_reports_below_floor() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            assert!(perturb_count_with_rng(&mut rng, 5, 3, 5) >= 5);
        }
    }

    #[test]
    fn test_noise_actually_varies() {
        let mut rng = StdRng::seed_from_u64(3);
        let values: std::collections::HashSet<u64> =
            (0..200).map(|_| perturb_count_with_rng(&mut rng, 50, 2, 0)).collect();
        assert!(values.len() > 1);
    }

    #[test]
    fn test_zero_bound_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(perturb_count_with_rng(&mut rng, 42, 0, 0), 42);
        assert_eq!(perturb_tally_with_rng(&mut rng, -3, 0), -3);
    }
}
