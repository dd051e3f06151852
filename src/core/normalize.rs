//! Text helpers shared by the importer and the image enricher.

use regex::Regex;
use similar::{capture_diff_slices, Algorithm, DiffOp};
use std::sync::LazyLock;

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s*([0-9]+(?:\.[0-9]{1,2})?)").expect("price regex")
});

static PARENTHESES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("parentheses regex"));

static UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(?:[.,]\d+)?\s*(?:oz|fl\s*oz|lb|ct|ea|each|g|kg|ml|l|gal|pt)\b")
        .expect("unit regex")
});

static FILLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:organic|fresh|family\s*size|large|small|mini|original|single|individual|bag|pack|vp|no\s*salt)\b",
    )
    .expect("filler regex")
});

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s\-']").expect("non-word regex"));

static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([0-9]+(?:[.,][0-9]+)?)").expect("number regex"));

/// Deduplication key for a product name: trimmed, case-folded, inner
/// whitespace collapsed.
pub fn product_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Aggressive cleanup used only for image search queries and match scoring.
/// Drops sizes, parenthesised text and marketing words.
pub fn search_name(name: &str) -> String {
    let s = name
        .to_lowercase()
        .replace(['®', '™'], " ")
        .replace('’', "'");
    let s = PARENTHESES_RE.replace_all(&s, " ");
    let s = UNIT_RE.replace_all(&s, " ");
    let s = FILLER_RE.replace_all(&s, " ");
    let s = NON_WORD_RE.replace_all(&s, " ");
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Query strings to try against a search API, most specific first.
pub fn query_variants(name: &str) -> Vec<String> {
    let mut variants = vec![name.to_string()];
    let cleaned = search_name(name);
    if !cleaned.is_empty() && cleaned != name {
        variants.push(cleaned.clone());
    }
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() > 4 {
        variants.push(tokens[..4].join(" "));
    }
    variants
}

/// First `$` amount in a price cell, e.g. `"$2.49/lb est"` -> `2.49`.
pub fn parse_price(text: &str) -> Option<f64> {
    PRICE_RE
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Leading number of a quantity cell, e.g. `"2 ea"` -> `2.0`.
pub fn parse_quantity(text: &str) -> Option<f64> {
    LEADING_NUMBER_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
        .filter(|q| *q > 0.0)
}

/// Price text that marks an estimated or weighed item.
pub fn is_estimate(price_text: &str) -> bool {
    let lower = price_text.to_lowercase();
    ["est", "/lb", "variable"].iter().any(|m| lower.contains(m))
}

/// Case-insensitive match ratio `2 * M / T`, where `M` is the number of
/// characters in matching blocks and `T` the combined length. Two empty
/// strings are a perfect match.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let matched: usize = capture_diff_slices(Algorithm::Myers, &a, &b)
        .iter()
        .map(|op| match op {
            DiffOp::Equal { len, .. } => *len,
            _ => 0,
        })
        .sum();
    2.0 * matched as f64 / total as f64
}

/// Best of raw and search-normalised similarity between a product and a
/// candidate title.
pub fn match_score(product_name: &str, candidate_name: &str) -> f64 {
    similarity(product_name, candidate_name).max(similarity(
        &search_name(product_name),
        &search_name(candidate_name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_key_folds_case_and_whitespace() {
        assert_eq!(product_key("  Whole   MILK "), "whole milk");
        assert_eq!(product_key("whole milk"), product_key("WHOLE MILK"));
        assert_eq!(product_key("   "), "");
    }

    #[test]
    fn test_search_name_strips_units_and_fillers() {
        assert_eq!(
            search_name("Organic Bananas (Bunch) 2 lb"),
            "bananas"
        );
        assert_eq!(
            search_name("Simple Truth® Large Brown Eggs 12 ct"),
            "simple truth brown eggs"
        );
        assert_eq!(search_name("Kettle Chips, No Salt 8.5 oz"), "kettle chips");
    }

    #[test]
    fn test_query_variants() {
        let variants = query_variants("Private Selection Sharp White Cheddar Cheese 8 oz");
        assert_eq!(variants[0], "Private Selection Sharp White Cheddar Cheese 8 oz");
        assert_eq!(variants[1], "private selection sharp white cheddar cheese");
        assert_eq!(variants[2], "private selection sharp white");

        assert_eq!(query_variants("milk"), vec!["milk".to_string()]);
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$3.99"), Some(3.99));
        assert_eq!(parse_price(" $ 2.5/lb est"), Some(2.5));
        assert_eq!(parse_price("Was $4.29, now $3.00"), Some(4.29));
        assert_eq!(parse_price("3.99"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("2"), Some(2.0));
        assert_eq!(parse_quantity("1,5 kg"), Some(1.5));
        assert_eq!(parse_quantity("0"), None);
        assert_eq!(parse_quantity("dozen"), None);
    }

    #[test]
    fn test_is_estimate() {
        assert!(is_estimate("$1.99/lb"));
        assert!(is_estimate("$5.00 EST"));
        assert!(!is_estimate("$5.00"));
    }

    #[test]
    fn test_match_score_prefers_normalised_form() {
        let raw = similarity("Organic Bananas 2 lb", "Bananas");
        let best = match_score("Organic Bananas 2 lb", "Bananas");
        assert!(best > raw);
        assert_eq!(best, 1.0);
    }

    #[test]
    fn test_similarity_counts_matching_blocks() {
        // 10 shared characters out of 10 + 27
        let score = similarity("Whole Milk", "Kroger Whole Milk Vitamin D");
        assert!((score - 20.0 / 37.0).abs() < 1e-12);
        assert_eq!(match_score("Whole Milk", "Kroger Whole Milk Vitamin D"), score);

        assert_eq!(similarity("Strawberries", "fresh strawberries"), 0.8);
        assert_eq!(similarity("mango", "zzz qqq"), 0.0);
        assert_eq!(similarity("", ""), 1.0);
    }
}
