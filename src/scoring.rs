//! Scoring for field values and candidates.
//!
//! This module contains:
//! - Penalty vocabularies applied to every field value
//! - The scoring context shared by all workers of a ranking call
//! - Tokenizer/occurrence weight blending for the final candidate score

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::WeightsError;
use crate::field::FieldKind;
use crate::oracle::OccurrenceOracle;

// ============================================================================
// Penalties
// ============================================================================

/// Points removed for each severe token, and for hard rejects.
pub const SEVERE_PENALTY: i32 = -20;

/// Points removed for each low-confidence token.
pub const LOW_PENALTY: i32 = -10;

/// Tokens that almost never belong inside a single value (case-insensitive, counted).
pub const SEVERE_TOKENS: [&str; 4] = ["[", "]", " - ", "_"];

/// Featuring markers: the value probably spans two fields (case-insensitive, counted).
pub const LOW_TOKENS: [&str; 5] = ["featuring", "feat.", "feat ", "ft.", "ft "];

/// Sequences that make a title suspicious (one penalty, no matter how many).
pub const SUSPICIOUS_TITLE_SEQS: [&str; 13] = [
    "- ", " -", "[", "]", "_", "{", "}", "~", "|", "\u{FFFD}", " vs ", " vs. ", "  ",
];

/// Sequences that make an artist name suspicious (one penalty, no matter how many).
pub const SUSPICIOUS_NAME_SEQS: [&str; 11] =
    ["- ", " -", "[", "]", "_", "{", "}", "~", "|", "\u{FFFD}", "  "];

/// Count non-overlapping, case-insensitive occurrences of `needle` in `haystack`.
pub fn count_ignore_case(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.to_lowercase().matches(&needle.to_lowercase()).count()
}

/// Score shared by every field kind: the kind's base score plus token penalties.
/// An empty value is a hard reject.
pub fn default_score(kind: FieldKind, value: &str) -> i32 {
    if value.is_empty() {
        return SEVERE_PENALTY;
    }
    let severe: i32 = SEVERE_TOKENS
        .iter()
        .map(|t| count_ignore_case(value, t) as i32 * SEVERE_PENALTY)
        .sum();
    let low: i32 = LOW_TOKENS
        .iter()
        .map(|t| count_ignore_case(value, t) as i32 * LOW_PENALTY)
        .sum();
    kind.base_score() + severe + low
}

pub fn has_suspicious_title(value: &str) -> bool {
    SUSPICIOUS_TITLE_SEQS.iter().any(|s| value.contains(s))
}

pub fn has_suspicious_name(value: &str) -> bool {
    SUSPICIOUS_NAME_SEQS.iter().any(|s| value.contains(s))
}

/// Aggregate of per-value scores: their sum, unless any component is negative,
/// in which case the most negative component wins outright.
pub fn aggregate_score<I>(scores: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    let mut sum = 0;
    let mut min: Option<i32> = None;
    for score in scores {
        sum += score;
        if score < 0 {
            min = Some(min.map_or(score, |m| m.min(score)));
        }
    }
    min.unwrap_or(sum)
}

// ============================================================================
// Weights
// ============================================================================

/// Relative weights of the tokenizer score and the occurrence score.
/// Written as an `N:M` ratio, e.g. `"1:1"` or `"3:1"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub tokenizer: f64,
    pub occurrence: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tokenizer: 1.0,
            occurrence: 1.0,
        }
    }
}

impl ScoreWeights {
    /// Blend a positive tokenizer score with the template's occurrence score.
    pub fn blend(&self, tokenizer_score: i32, occurrence_score: i32) -> i32 {
        (tokenizer_score as f64 * self.tokenizer + occurrence_score as f64 * self.occurrence)
            .round() as i32
    }
}

impl FromStr for ScoreWeights {
    type Err = WeightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (left, right) = s
            .split_once(':')
            .ok_or_else(|| WeightsError::Malformed(s.to_string()))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|w| w.is_finite() && *w >= 0.0)
                .ok_or_else(|| WeightsError::InvalidWeight(s.to_string()))
        };
        Ok(Self {
            tokenizer: parse(left)?,
            occurrence: parse(right)?,
        })
    }
}

impl fmt::Display for ScoreWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tokenizer, self.occurrence)
    }
}

// ============================================================================
// Scoring Context
// ============================================================================

/// Read-only scoring handle shared across every task of a ranking call.
#[derive(Clone, Default)]
pub struct ScoringContext {
    oracle: Option<Arc<dyn OccurrenceOracle>>,
    db_scoring: bool,
    weights: ScoreWeights,
}

impl ScoringContext {
    pub fn new(oracle: Option<Arc<dyn OccurrenceOracle>>, db_scoring: bool, weights: ScoreWeights) -> Self {
        Self {
            oracle,
            db_scoring,
            weights,
        }
    }

    /// Context backed by `oracle`, with occurrence scoring enabled.
    pub fn with_oracle(oracle: Arc<dyn OccurrenceOracle>) -> Self {
        Self::new(Some(oracle), true, ScoreWeights::default())
    }

    /// True when an oracle is present and occurrence scoring is switched on.
    pub fn is_db_backed(&self) -> bool {
        self.db_scoring && self.oracle.is_some()
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    pub fn occurrence_score(&self, kind: FieldKind, value: &str) -> i32 {
        match &self.oracle {
            Some(oracle) if self.db_scoring => oracle.occurrence_score(kind, value),
            _ => 0,
        }
    }

    pub fn template_score(&self, canonical: &str) -> i32 {
        match &self.oracle {
            Some(oracle) if self.db_scoring => oracle.template_score(canonical),
            _ => 0,
        }
    }

    /// Final candidate score. Occurrence data only ever boosts positive scores.
    pub fn final_score(&self, tokenizer_score: i32, canonical: &str) -> i32 {
        if self.is_db_backed() && tokenizer_score > 0 {
            self.weights.blend(tokenizer_score, self.template_score(canonical))
        } else {
            tokenizer_score
        }
    }
}

impl fmt::Debug for ScoringContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoringContext")
            .field("oracle", &self.oracle.is_some())
            .field("db_scoring", &self.db_scoring)
            .field("weights", &self.weights)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::InMemoryOracle;

    #[test]
    fn test_count_ignore_case() {
        assert_eq!(count_ignore_case("A - b - C", " - "), 2);
        assert_eq!(count_ignore_case("Feat. X FEAT. Y", "feat."), 2);
        assert_eq!(count_ignore_case("aaaa", "aa"), 2);
        assert_eq!(count_ignore_case("abc", ""), 0);
    }

    #[test]
    fn test_default_score() {
        assert_eq!(default_score(FieldKind::Title, "Plain"), 3);
        assert_eq!(default_score(FieldKind::Title, ""), SEVERE_PENALTY);
        assert_eq!(default_score(FieldKind::Title, "[a] _ b"), 3 - 60);
        assert_eq!(default_score(FieldKind::Genre, "x FT. y"), 1 - 10);
        assert_eq!(default_score(FieldKind::Artist, "A FEATURING B Feat. C"), 3 - 20);
    }

    #[test]
    fn test_aggregate_all_positive_sums() {
        assert_eq!(aggregate_score([3, 6, 3]), 12);
        assert_eq!(aggregate_score([0, 3]), 3);
        assert_eq!(aggregate_score(Vec::<i32>::new()), 0);
    }

    #[test]
    fn test_aggregate_negative_takes_minimum() {
        assert_eq!(aggregate_score([1, -37, 3, -44]), -44);
        assert_eq!(aggregate_score([100, -1]), -1);
    }

    #[test]
    fn test_weights_parse() {
        assert_eq!("1:1".parse::<ScoreWeights>().unwrap(), ScoreWeights::default());
        let w: ScoreWeights = "3:0.5".parse().unwrap();
        assert_eq!(w.tokenizer, 3.0);
        assert_eq!(w.occurrence, 0.5);
        assert!(matches!("11".parse::<ScoreWeights>(), Err(WeightsError::Malformed(_))));
        assert!(matches!("a:1".parse::<ScoreWeights>(), Err(WeightsError::InvalidWeight(_))));
        assert!(matches!("1:-2".parse::<ScoreWeights>(), Err(WeightsError::InvalidWeight(_))));
    }

    #[test]
    fn test_blend_rounds() {
        let w = ScoreWeights {
            tokenizer: 0.5,
            occurrence: 0.25,
        };
        // 5 * 0.5 + 3 * 0.25 = 3.25
        assert_eq!(w.blend(5, 3), 3);
        assert_eq!(w.blend(7, 0), 4);
    }

    #[test]
    fn test_context_without_oracle_scores_zero() {
        let ctx = ScoringContext::default();
        assert!(!ctx.is_db_backed());
        assert_eq!(ctx.occurrence_score(FieldKind::Artist, "anyone"), 0);
        assert_eq!(ctx.final_score(9, "<ARTIST> - <TITLE>"), 9);
    }

    #[test]
    fn test_context_db_switch() {
        let mut oracle = InMemoryOracle::default();
        oracle.record(FieldKind::Artist, "Known", 4);
        oracle.record_template("<ARTIST> - <TITLE>", 2);
        let oracle: Arc<dyn OccurrenceOracle> = Arc::new(oracle);

        let on = ScoringContext::new(Some(oracle.clone()), true, ScoreWeights::default());
        assert_eq!(on.occurrence_score(FieldKind::Artist, "known"), 4);
        assert_eq!(on.final_score(6, "<ARTIST> - <TITLE>"), 8);
        // Non-positive scores are never blended
        assert_eq!(on.final_score(-3, "<ARTIST> - <TITLE>"), -3);

        let off = ScoringContext::new(Some(oracle), false, ScoreWeights::default());
        assert_eq!(off.occurrence_score(FieldKind::Artist, "known"), 0);
        assert_eq!(off.final_score(6, "<ARTIST> - <TITLE>"), 6);
    }
}
