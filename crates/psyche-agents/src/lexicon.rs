//! Word-level text helpers shared by the keyword-scoring agents.

use std::sync::OnceLock;

use regex::Regex;

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\p{L}+(?:'\p{L}+)?").unwrap())
}

/// Lowercased word tokens. Apostrophe contractions stay one token.
pub fn tokenize(text: &str) -> Vec<String> {
    word_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Number of sentences, counting a trailing fragment without punctuation.
pub fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|s| s.chars().any(|c| c.is_alphanumeric()))
        .count()
}

/// Tokens that appear in `words`, in token order (duplicates kept).
pub fn matches<'a>(tokens: &'a [String], words: &[&str]) -> Vec<&'a str> {
    tokens
        .iter()
        .filter(|t| words.contains(&t.as_str()))
        .map(|t| t.as_str())
        .collect()
}

/// True if any multi-word phrase occurs in the lowercased text.
pub fn contains_phrase(text: &str, phrases: &[&str]) -> bool {
    let lower = text.to_lowercase();
    phrases.iter().any(|p| lower.contains(p))
}

/// Keyword hits per category, in category order.
pub fn category_hits(tokens: &[String], categories: &[(&str, &[&str])]) -> Vec<(String, usize)> {
    categories
        .iter()
        .map(|(name, words)| (name.to_string(), matches(tokens, words).len()))
        .collect()
}

/// Scale hit counts to [0, 1] relative to the strongest category.
pub fn relative_scores(hits: &[(String, usize)]) -> Vec<(String, f64)> {
    let max = hits.iter().map(|(_, n)| *n).max().unwrap_or(0);
    hits.iter()
        .map(|(name, n)| {
            let score = if max == 0 { 0.0 } else { *n as f64 / max as f64 };
            (name.clone(), round3(score))
        })
        .collect()
}

/// Confidence from the amount of keyword evidence: 0 hits → 0, saturating towards 1.
pub fn evidence_confidence(total_hits: usize) -> f64 {
    let n = total_hits as f64;
    round3(n / (n + 4.0))
}

/// First category with the highest score; `None` when every score is zero.
pub fn strongest(scores: &[(String, f64)]) -> Option<&str> {
    let mut best: Option<(&str, f64)> = None;
    for (name, score) in scores {
        if *score > 0.0 && best.map_or(true, |(_, b)| *score > b) {
            best = Some((name.as_str(), *score));
        }
    }
    best.map(|(name, _)| name)
}

pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// 64-bit FNV-1a, stable across runs and platforms.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_keeps_contractions() {
        assert_eq!(
            tokenize("I don't feel GREAT, really."),
            vec!["i", "don't", "feel", "great", "really"]
        );
        assert_eq!(tokenize("אני עצוב"), vec!["אני", "עצוב"]);
        assert!(tokenize("  ... 123").is_empty());
    }

    #[test]
    fn test_sentence_count() {
        assert_eq!(sentence_count("One. Two! Three?"), 3);
        assert_eq!(sentence_count("no punctuation"), 1);
        assert_eq!(sentence_count("..."), 0);
    }

    #[test]
    fn test_scores_and_strongest() {
        let tokens = tokenize("calm calm worry");
        let hits = category_hits(&tokens, &[("peace", &["calm"]), ("anxiety", &["worry"])]);
        assert_eq!(hits, vec![("peace".to_string(), 2), ("anxiety".to_string(), 1)]);
        let scores = relative_scores(&hits);
        assert_eq!(scores[0].1, 1.0);
        assert_eq!(scores[1].1, 0.5);
        assert_eq!(strongest(&scores), Some("peace"));
        assert_eq!(strongest(&relative_scores(&[("x".into(), 0)])), None);
    }

    #[test]
    fn test_evidence_confidence_is_bounded() {
        assert_eq!(evidence_confidence(0), 0.0);
        assert_eq!(evidence_confidence(4), 0.5);
        assert!(evidence_confidence(1000) < 1.0);
    }

    #[test]
    fn test_fnv1a_known_value() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
