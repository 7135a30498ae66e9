//! Lexical similarity used by the bundled stores.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}']+").unwrap());

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "i", "in", "is", "it", "me", "my", "of",
    "on", "or", "so", "that", "the", "this", "to", "was", "we", "with", "you",
];

/// Lower-cased content tokens with stopwords removed.
pub fn tokens(content: &str) -> BTreeSet<String> {
    TOKEN
        .find_iter(&content.to_lowercase())
        .map(|m| m.as_str().trim_matches('\'').to_string())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Jaccard index of two token sets.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    inter / union
}

/// Jaccard similarity of two strings.
pub fn similarity(a: &str, b: &str) -> f32 {
    jaccard(&tokens(a), &tokens(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_drop_stopwords_and_case() {
        let t = tokens("The Dog and THE cat!");
        assert_eq!(t, BTreeSet::from(["dog".to_string(), "cat".to_string()]));
    }

    #[test]
    fn test_similarity_range() {
        assert_eq!(similarity("walked the dog", "walked the dog"), 1.0);
        assert_eq!(similarity("walked the dog", "quantum physics"), 0.0);
        let partial = similarity("walked the dog today", "walked the dog yesterday");
        assert!(partial > 0.4 && partial < 1.0);
        assert_eq!(similarity("", ""), 0.0);
    }
}
