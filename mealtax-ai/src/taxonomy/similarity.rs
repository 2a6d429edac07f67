//! Weighted fuzzy string similarity (0-100)
//!
//! Combines plain, partial-window and token-based comparisons the way
//! general-purpose fuzzy matchers do: strings of similar length are
//! compared whole and by token order/set, strings of very different length
//! are compared by best-matching window with a scale-down so a short query
//! inside a long label never beats an exact label match.

use std::collections::BTreeSet;

/// Scale applied to token-based scores
const TOKEN_SCALE: f64 = 0.95;

/// Length ratio at which partial (window) matching takes over
const PARTIAL_THRESHOLD: f64 = 1.5;

/// Length ratio above which partial matches are scaled down harder
const LONG_PARTIAL_THRESHOLD: f64 = 8.0;

/// Normalized text: lowercased, punctuation folded to spaces, single-spaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedText {
    text: String,
    char_len: usize,
}

impl ProcessedText {
    pub fn new(raw: &str) -> Self {
        let folded: String = raw
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .to_lowercase();
        let text = folded.split_whitespace().collect::<Vec<_>>().join(" ");
        let char_len = text.chars().count();
        Self { text, char_len }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Score two raw strings
pub fn score(a: &str, b: &str) -> u8 {
    weighted_ratio(&ProcessedText::new(a), &ProcessedText::new(b))
}

/// Weighted similarity of two preprocessed strings, 0-100
pub fn weighted_ratio(a: &ProcessedText, b: &ProcessedText) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    if a.text == b.text {
        return 100;
    }

    let (short, long) = if a.char_len <= b.char_len { (a, b) } else { (b, a) };
    let len_ratio = long.char_len as f64 / short.char_len as f64;

    let base = ratio(&a.text, &b.text);

    let best = if len_ratio < PARTIAL_THRESHOLD {
        base.max(token_sort_ratio(&a.text, &b.text) * TOKEN_SCALE)
            .max(token_set_ratio(&a.text, &b.text) * TOKEN_SCALE)
    } else {
        let partial_scale = if len_ratio < LONG_PARTIAL_THRESHOLD { 0.9 } else { 0.6 };
        base.max(partial_ratio(&short.text, &long.text) * partial_scale)
            .max(partial_token_sort_ratio(&a.text, &b.text) * TOKEN_SCALE * partial_scale)
            .max(partial_token_set_ratio(&a.text, &b.text) * TOKEN_SCALE * partial_scale)
    };

    (best * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Whole-string similarity in [0, 1]
fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Best similarity of the shorter string against every same-length window
/// of the longer one
fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if short.is_empty() {
        return 0.0;
    }
    if short.len() == long.len() {
        return ratio(a, b);
    }

    let needle: String = short.iter().collect();
    let mut best = 0.0_f64;
    for window in long.windows(short.len()) {
        let candidate: String = window.iter().collect();
        let r = ratio(&needle, &candidate);
        if r > best {
            best = r;
            if best >= 1.0 {
                break;
            }
        }
    }
    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn partial_token_sort_ratio(a: &str, b: &str) -> f64 {
    partial_ratio(&sorted_tokens(a), &sorted_tokens(b))
}

struct TokenSets<'a> {
    common: Vec<&'a str>,
    only_a: Vec<&'a str>,
    only_b: Vec<&'a str>,
}

fn token_sets<'a>(a: &'a str, b: &'a str) -> TokenSets<'a> {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    TokenSets {
        common: set_a.intersection(&set_b).copied().collect(),
        only_a: set_a.difference(&set_b).copied().collect(),
        only_b: set_b.difference(&set_a).copied().collect(),
    }
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{} {}", head, tail),
    }
}

fn token_set_ratio(a: &str, b: &str) -> f64 {
    let sets = token_sets(a, b);
    if !sets.common.is_empty() && (sets.only_a.is_empty() || sets.only_b.is_empty()) {
        return 1.0;
    }

    let common = sets.common.join(" ");
    let combined_a = join_nonempty(&common, &sets.only_a.join(" "));
    let combined_b = join_nonempty(&common, &sets.only_b.join(" "));

    let mut best = ratio(&combined_a, &combined_b);
    if !common.is_empty() {
        best = best
            .max(ratio(&common, &combined_a))
            .max(ratio(&common, &combined_b));
    }
    best
}

fn partial_token_set_ratio(a: &str, b: &str) -> f64 {
    let sets = token_sets(a, b);
    if !sets.common.is_empty() {
        return 1.0;
    }
    partial_ratio(&sets.only_a.join(" "), &sets.only_b.join(" "))
}
