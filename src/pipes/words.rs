//! Word splitting and text normalisation shared by the filter engine and the
//! collection controller

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

fn punctuation_regex() -> &'static Regex {
    static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
    PUNCTUATION.get_or_init(|| {
        Regex::new(r"[\s.,/#!$%\^&\*;:{}=\-_`~()]").expect("punctuation pattern is valid")
    })
}

/// Whether the text starts with whitespace or punctuation
pub fn starts_with_punctuation(text: &str) -> bool {
    punctuation_regex().find(text).is_some_and(|m| m.start() == 0)
}

/// Words of a search text, punctuation acting as a separator
///
/// ```
/// use entity_query::pipes::words::match_words;
///
/// assert_eq!(match_words("  ams, par-is "), vec!["ams", "par", "is"]);
/// ```
pub fn match_words(text: &str) -> Vec<String> {
    punctuation_regex()
        .replace_all(text, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Remove combining diacritical marks after canonical decomposition
pub fn strip_accents(text: &str) -> String {
    text.nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

/// Whether the text contains the word as a literal substring
pub fn word_matches(text: &str, word: &str, ignore_case: bool) -> bool {
    if word.is_empty() {
        false
    } else if ignore_case {
        text.to_lowercase().contains(&word.to_lowercase())
    } else {
        text.contains(word)
    }
}
