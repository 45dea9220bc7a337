//! Shared string normalization for inputs, template ordering and parsed values.
//!
//! Inputs are normalized exactly once per ranking call; everything else here is
//! used when values are written into a sink or when templates are sorted.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Known mis-encoded punctuation: the UTF-8 replacement character read back as
/// Latin-1 ("ï¿½") and the bare replacement character. Both stood for a dash in
/// the file names they came from.
pub static MOJIBAKE_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"ï¿½|\u{FFFD}").unwrap());

/// Multi-artist credit separator.
/// Matches: &, /, ,, •, +, ×, x, vs, feat, ft, featuring
pub static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[&/,•+×]|(?:\s+(?:x|vs\.?|feat\.?|ft\.?|featuring)\s+))\s*").unwrap()
});

// ============================================================================
// INPUT NORMALIZATION
// ============================================================================

/// Normalize a raw input string before tokenization.
/// e.g., "Artist ï¿½  Title " → "Artist - Title"
pub fn normalize_input(input: &str) -> String {
    let fixed = MOJIBAKE_DASH.replace_all(input, "-");
    MULTI_SPACE.replace_all(&fixed, " ").trim().to_string()
}

// ============================================================================
// COLLATION
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
/// Used to filter out accents during normalization.
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to ASCII by applying NFKD decomposition and removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "naïve" → "naive"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Primary collation key: accent- and case-insensitive.
/// Callers break ties on the raw string so the ordering stays total.
pub fn collation_key(s: &str) -> String {
    fold_to_ascii(s)
}

// ============================================================================
// VALUE FORMATTING
// ============================================================================

/// Lower-case every word, then upper-case its first letter. Whitespace is kept as is.
/// e.g., "tHIS title IS awesome" → "This Title Is Awesome"
pub fn capitalize_fully(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            at_word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Split an artist credit into individual names, trimmed and de-duplicated
/// case-insensitively. First occurrence wins.
/// e.g., "Artist1 & Artist2, artist1" → ["Artist1", "Artist2"]
pub fn split_artists(credit: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    ARTIST_SEPARATOR
        .split(credit)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
