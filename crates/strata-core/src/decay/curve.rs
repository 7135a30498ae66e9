//! Forgetting-curve arithmetic.
//!
//! Strength is a pure function of the anchor captured at the last
//! reinforcement and the hours elapsed since:
//! `strength = anchor * exp(-rate_eff * hours)`, with
//! `rate_eff = base / (1 + ln(1 + reinforcement_count))`.

use chrono::{DateTime, Duration, Utc};

use crate::config::DecayConfig;
use crate::types::{MemoryItem, Tier};

/// Decay rate after the spacing-effect discount.
pub fn effective_rate(base_rate: f64, reinforcement_count: u32) -> f64 {
    base_rate / (1.0 + (1.0 + reinforcement_count as f64).ln())
}

/// Strength after `hours` of decay from `anchor`.
pub fn decayed_strength(anchor: f32, base_rate: f64, reinforcement_count: u32, hours: f64) -> f32 {
    let rate = effective_rate(base_rate, reinforcement_count);
    let s = anchor as f64 * (-rate * hours.max(0.0)).exp();
    (s as f32).clamp(0.0, 1.0)
}

/// Base hourly rate for a tier; the in-process tiers do not decay.
pub fn base_rate(config: &DecayConfig, tier: Tier) -> f64 {
    match tier {
        Tier::LongTerm => config.long_term_base_rate,
        Tier::Archival => config.archival_base_rate,
        Tier::Focus | Tier::Fresh => 0.0,
    }
}

/// Strength of `item` at `now`. Never exceeds the stored strength.
pub fn current_strength(item: &MemoryItem, config: &DecayConfig, now: DateTime<Utc>) -> f32 {
    let computed = decayed_strength(
        item.anchor_strength,
        base_rate(config, item.tier),
        item.reinforcement_count,
        item.hours_since_reinforcement(now),
    );
    computed.min(item.strength)
}

/// Move `item` to `tier`, rebasing its anchor so the curve continues from the
/// current strength under the new tier's rate.
pub fn rebase_to_tier(item: &mut MemoryItem, tier: Tier, config: &DecayConfig, now: DateTime<Utc>) {
    let rate = effective_rate(base_rate(config, tier), item.reinforcement_count);
    let hours = item.hours_since_reinforcement(now);
    item.anchor_strength = (item.strength as f64 * (rate * hours).exp()) as f32;
    item.tier = tier;
}

/// Reinforce `item` at `now`: restore strength, restart the decay clock and
/// bump the reinforcement count.
pub fn reinforce(item: &mut MemoryItem, config: &DecayConfig, now: DateTime<Utc>) {
    let current = current_strength(item, config, now);
    let restored = (current + config.reinforcement_boost).clamp(0.0, 1.0);
    item.strength = restored;
    item.anchor_strength = restored;
    item.reinforcement_count = item.reinforcement_count.saturating_add(1);
    item.last_reinforced_at = now;
}

/// Whether a long_term item has weakened enough, for long enough, to archive.
pub fn is_archival_candidate(item: &MemoryItem, config: &DecayConfig, now: DateTime<Utc>) -> bool {
    if item.tier != Tier::LongTerm || item.strength >= config.archive_threshold {
        return false;
    }
    now.signed_duration_since(item.created_at) >= Duration::hours(config.min_archive_age_hours as i64)
}
