//! Text similarity toolkit
//!
//! Pure scoring functions used to detect near-duplicate questions:
//! token Jaccard, character-bigram Dice, Levenshtein similarity over
//! normalized text, and cosine similarity over embeddings. Every function
//! is total: empty or malformed input yields a neutral value, never a panic.

use std::collections::{HashMap, HashSet};

/// Lowercase, map everything outside `[a-z0-9]` and whitespace to a space,
/// collapse whitespace runs and trim.
pub fn normalize_text(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized tokens; empty text yields no tokens.
pub fn tokens(text: &str) -> Vec<String> {
    normalize_text(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Overlapping character bigrams of the normalized text with whitespace removed.
///
/// A single remaining character is returned as the only gram.
pub fn bigrams(text: &str) -> Vec<String> {
    let compact: Vec<char> = normalize_text(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    match compact.len() {
        0 => Vec::new(),
        1 => vec![compact[0].to_string()],
        _ => compact.windows(2).map(|w| w.iter().collect()).collect(),
    }
}

/// Token-set Jaccard similarity.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = tokens(a).into_iter().collect();
    let set_b: HashSet<String> = tokens(b).into_iter().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Sørensen-Dice coefficient over bigram multisets.
///
/// Each bigram occurrence in `a` can be matched at most once.
pub fn dice(a: &str, b: &str) -> f64 {
    let grams_a = bigrams(a);
    let grams_b = bigrams(b);

    if grams_a.is_empty() && grams_b.is_empty() {
        return 1.0;
    }
    if grams_a.is_empty() || grams_b.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for gram in &grams_a {
        *counts.entry(gram.as_str()).or_insert(0) += 1;
    }

    let mut overlap = 0usize;
    for gram in &grams_b {
        if let Some(count) = counts.get_mut(gram.as_str()) {
            if *count > 0 {
                overlap += 1;
                *count -= 1;
            }
        }
    }

    (2 * overlap) as f64 / (grams_a.len() + grams_b.len()) as f64
}

/// Edit distance between the normalized forms of `a` and `b`.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let aa: Vec<char> = normalize_text(a).chars().collect();
    let bb: Vec<char> = normalize_text(b).chars().collect();
    edit_distance(&aa, &bb)
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rolling rows of the DP matrix
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - distance / max_len` over normalized text; two empty strings are identical.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let aa: Vec<char> = normalize_text(a).chars().collect();
    let bb: Vec<char> = normalize_text(b).chars().collect();
    let max_len = aa.len().max(bb.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&aa, &bb) as f64 / max_len as f64
}

/// Compute cosine similarity between two vectors
///
/// Returns 0.0 for empty or mismatched vectors and for zero magnitudes.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut mag_a = 0.0f64;
    let mut mag_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    if mag_a == 0.0 || mag_b == 0.0 || !dot.is_finite() {
        return 0.0;
    }

    dot / (mag_a.sqrt() * mag_b.sqrt())
}

/// All string scores for a pair, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SimilarityScores {
    pub jaccard: f64,
    pub dice: f64,
    pub levenshtein: f64,
}

impl SimilarityScores {
    pub fn between(a: &str, b: &str) -> Self {
        Self {
            jaccard: jaccard(a, b),
            dice: dice(a, b),
            levenshtein: levenshtein_similarity(a, b),
        }
    }

    pub fn max(&self) -> f64 {
        self.jaccard.max(self.dice).max(self.levenshtein)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  What's   NEXT?\n\tNow! "), "what s next now");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("¿¡!!"), "");
    }

    #[test]
    fn test_tokens_and_bigrams() {
        assert!(tokens("   ").is_empty());
        assert_eq!(tokens("Hello, world"), vec!["hello", "world"]);
        assert_eq!(bigrams("a"), vec!["a"]);
        assert_eq!(bigrams("ab c"), vec!["ab", "bc"]);
        assert!(bigrams("?!").is_empty());
    }

    #[test]
    fn test_identical_strings_score_one() {
        for s in ["", "Who helped you grow?", "x", "a b a b"] {
            assert_eq!(jaccard(s, s), 1.0);
            assert_eq!(dice(s, s), 1.0);
            assert_eq!(levenshtein_similarity(s, s), 1.0);
        }
    }

    #[test]
    fn test_jaccard_disjoint_and_partial() {
        assert_eq!(jaccard("red apple", "blue sky"), 0.0);
        assert_eq!(jaccard("", "blue sky"), 0.0);
        // {a, b} vs {b, c}: 1 / 3
        assert!((jaccard("a b", "b c") - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_dice_consumes_each_gram_once() {
        // "aaa" -> [aa, aa]; "aa" -> [aa]; one match: 2 * 1 / 3
        assert!((dice("aaa", "aa") - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(dice("", "abc"), 0.0);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert!((levenshtein_similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
        // Punctuation and case vanish under normalization
        assert_eq!(levenshtein_similarity("Why?", "why"), 1.0);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine(&a, &c).abs() < 0.001);

        let v = vec![0.3, -2.0, 5.5];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine(&[], &[]), 0.0);
        assert_eq!(cosine(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_similarity_scores_max() {
        let scores = SimilarityScores::between("What scares you?", "What scares you now?");
        assert!(scores.max() >= scores.jaccard);
        assert!(scores.max() <= 1.0);
    }
}
