//! Text normalization shared by the language resolver and the intent matcher.
//!
//! Splits on whitespace, Unicode punctuation and symbols only. Combining marks
//! (Devanagari virama, Gujarati vowel signs, ...) stay inside their word.

use regex::Regex;
use std::sync::LazyLock;

// NOTE: expect() is acceptable here, the pattern is a compile-time constant
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\p{P}\p{S}]+").expect("Invalid regex: token separators"));

/// Lowercased tokens of `text`, in order, without empty fragments.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    SEPARATORS
        .split(&lowered)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalized form of a keyword or message: tokens joined by single spaces.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}
