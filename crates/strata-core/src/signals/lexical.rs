//! Lexical fallback heuristics for signal dimensions.
//!
//! Used when no content classifier is installed, or when the classifier
//! leaves a field empty:
//! - Intensity: emotion vocabulary, exclamation density, shouting
//! - Social significance: people, relationships, group activity
//! - Goal relevance: token overlap with the agent's active goals

use once_cell::sync::Lazy;
use regex::Regex;

use crate::store::similarity;

// Emotion-laden vocabulary, strong and mild.
static STRONG_EMOTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(terrified|furious|devastated|ecstatic|heartbroken|panic(ked)?|horrified|thrilled|grief|rage|love[ds]?|hate[ds]?|emergency|disaster|amazing|awful)\b",
    )
    .unwrap()
});

static MILD_EMOTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(happy|sad|angry|afraid|worried|excited|upset|nervous|proud|ashamed|lonely|surprised|scared|glad|anxious|stressed)\b",
    )
    .unwrap()
});

static SOCIAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b(friend|friends|family|mother|father|mom|dad|sister|brother|wife|husband|partner|son|daughter|colleague|boss|team|neighbou?r)s?\b").unwrap(),
        Regex::new(r"(?i)\b(we|us|our|together|meeting|met|party|wedding|funeral|dinner with|call with|talked to|told)\b").unwrap(),
        Regex::new(r"@\w+").unwrap(),
    ]
});

static SHOUTED_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{3,}\b").unwrap());

/// Emotional intensity in [0, 1].
pub fn intensity(content: &str) -> f32 {
    let words = content.split_whitespace().count().max(1) as f32;

    let strong = STRONG_EMOTION.find_iter(content).count() as f32;
    let mild = MILD_EMOTION.find_iter(content).count() as f32;
    let exclamations = content.matches('!').count() as f32;
    let shouted = SHOUTED_WORD.find_iter(content).count() as f32;

    let lexical = (strong * 0.45 + mild * 0.25).min(0.8);
    let emphasis = ((exclamations + shouted) / words * 2.0).min(0.3);
    (lexical + emphasis).clamp(0.0, 1.0)
}

/// Social significance in [0, 1].
pub fn social_significance(content: &str) -> f32 {
    let hits: usize = SOCIAL.iter().map(|re| re.find_iter(content).count()).sum();
    (hits as f32 * 0.3).clamp(0.0, 1.0)
}

/// Fraction of goal tokens present in the content, best goal wins.
pub fn goal_relevance(content: &str, goals: &[String]) -> f32 {
    if goals.is_empty() {
        return 0.0;
    }
    let content_tokens = similarity::tokens(content);
    goals
        .iter()
        .map(|goal| {
            let goal_tokens = similarity::tokens(goal);
            if goal_tokens.is_empty() {
                return 0.0;
            }
            let overlap = goal_tokens.intersection(&content_tokens).count() as f32;
            overlap / goal_tokens.len() as f32
        })
        .fold(0.0f32, f32::max)
}
