//! Disambiguation tokenizer.
//!
//! Walks a template's boundaries left to right, cutting the input into field
//! values. When a separator occurs more often than the template declares, the
//! split point is ambiguous and a backtracking resolver picks the split with the
//! best aggregate field score.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::error::{AssignError, Rejection};
use crate::field::FieldKind;
use crate::scoring::{aggregate_score, ScoringContext};
use crate::sink::TrackSink;
use crate::template::{Boundary, FormatTemplate, Separator};

// ============================================================================
// Token Assignment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredValue {
    pub score: i32,
    pub value: String,
}

/// Field values recorded for one template against one input, each with its score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenAssignment {
    values: BTreeMap<FieldKind, Vec<ScoredValue>>,
}

impl TokenAssignment {
    fn record(&mut self, kind: FieldKind, value: &str, ctx: &ScoringContext) {
        let score = kind.score(value, ctx);
        self.values.entry(kind).or_default().push(ScoredValue {
            score,
            value: value.to_string(),
        });
    }

    fn merge(&mut self, other: TokenAssignment) {
        for (kind, values) in other.values {
            self.values.entry(kind).or_default().extend(values);
        }
    }

    /// Sum of all value scores, or the most negative one if any is negative.
    pub fn score(&self) -> i32 {
        aggregate_score(self.values.values().flatten().map(|v| v.score))
    }

    /// Number of recorded values across all fields.
    pub fn len(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, kind: FieldKind) -> &[ScoredValue] {
        self.values.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Raw values recorded for `kind`, in input order.
    pub fn values_of(&self, kind: FieldKind) -> Vec<String> {
        self.get(kind).iter().map(|v| v.value.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKind, &[ScoredValue])> {
        self.values.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Write every non-empty field into `sink`.
    pub fn assign_to<S: TrackSink + ?Sized>(&self, sink: &mut S) -> Result<(), AssignError> {
        for (kind, values) in &self.values {
            if values.is_empty() {
                continue;
            }
            let raw: Vec<String> = values.iter().map(|v| v.value.clone()).collect();
            kind.assign(&raw, sink)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

pub struct Tokenizer<'a> {
    ctx: &'a ScoringContext,
}

impl<'a> Tokenizer<'a> {
    pub fn new(ctx: &'a ScoringContext) -> Self {
        Self { ctx }
    }

    /// Cut `input` into values for every field of `template`.
    pub fn tokenize(
        &self,
        template: &FormatTemplate,
        input: &str,
    ) -> Result<TokenAssignment, Rejection> {
        if !template.fits(input) {
            return Err(Rejection::DoesNotFit);
        }

        let boundaries = template.boundaries();
        let mut seps: &[Boundary<'_>] = &boundaries;
        let mut fields = template.fields();
        let mut rest = input;
        let mut assignment = TokenAssignment::default();

        while !fields.is_empty() {
            let (cur, next) = match seps {
                [cur, next, ..] => (*cur, *next),
                _ => break,
            };
            let begin = cur
                .prefix_len(rest)
                .ok_or_else(|| Rejection::MissingLiteral(cur.text().to_string()))?;

            if seps.len() == 2 {
                // Last hop: everything up to the final boundary is one value.
                let end = next
                    .find_at(rest, begin)
                    .ok_or_else(|| Rejection::SeparatorNotFound(next.text().to_string()))?
                    .start;
                assignment.record(fields[0], &rest[begin..end], self.ctx);
                break;
            }

            let Boundary::Literal(next_sep) = next else {
                return Err(Rejection::SeparatorNotFound(next.text().to_string()));
            };
            // Consecutive occurrences of the same literal are cut in one hop.
            let mut run = seps[1..].iter().take_while(|b| b.same_entry(&next)).count();
            if 1 + run == seps.len() {
                // The template ends on this literal; its last occurrence closes the final field.
                run -= 1;
            }
            let after = seps[1 + run];
            let next_match = next_sep
                .find_at(rest, begin)
                .ok_or_else(|| Rejection::SeparatorNotFound(next_sep.text().to_string()))?;
            // A trailing occurrence of the same literal lies past every occurrence in the run.
            let search_from = if after.same_entry(&next) {
                next_sep
                    .matches(rest)
                    .filter(|m| m.start >= begin)
                    .nth(run - 1)
                    .map_or(rest.len() + 1, |m| m.end)
            } else {
                next_match.end
            };
            let mut end = after
                .find_at(rest, search_from)
                .ok_or_else(|| Rejection::SeparatorNotFound(after.text().to_string()))?
                .start;
            let occurrences = next_sep.count_in(&rest[begin..end]);

            let hops = if occurrences == 1 && run == 1 {
                end = next_match.start;
                assignment.record(fields[0], &rest[begin..end], self.ctx);
                1
            } else {
                let hops = run + 1;
                let hop_fields = fields.get(..hops).ok_or(Rejection::IncompleteAssignment {
                    assigned: assignment.len(),
                    expected: template.fields().len(),
                })?;
                let values =
                    self.handle_separator(&rest[begin..end], next_sep, run, hop_fields, occurrences)?;
                assignment.merge(values);
                hops
            };

            fields = &fields[hops..];
            seps = &seps[hops..];
            rest = &rest[end..];
        }

        let expected = template.fields().len();
        if assignment.len() != expected {
            return Err(Rejection::IncompleteAssignment {
                assigned: assignment.len(),
                expected,
            });
        }
        trace!(target: "template", template = %template, score = assignment.score(), "tokenized");
        Ok(assignment)
    }

    /// Assign a segment holding `expected` repeats of `sep` to `fields`.
    fn handle_separator(
        &self,
        segment: &str,
        sep: &Separator,
        expected: usize,
        fields: &[FieldKind],
        occurrences: usize,
    ) -> Result<TokenAssignment, Rejection> {
        let mut out = TokenAssignment::default();
        if occurrences == expected {
            let pieces = sep.split(segment);
            if pieces.len() != fields.len() {
                return Err(Rejection::Unresolvable {
                    segment: segment.to_string(),
                    separator: sep.text().to_string(),
                });
            }
            for (kind, piece) in fields.iter().zip(pieces) {
                out.record(*kind, piece, self.ctx);
            }
        } else if occurrences == 0 {
            out.record(fields[0], segment, self.ctx);
        } else {
            out = self
                .resolve(fields, segment, sep)
                .ok_or_else(|| Rejection::Unresolvable {
                    segment: segment.to_string(),
                    separator: sep.text().to_string(),
                })?;
        }
        Ok(out)
    }

    /// Best split of `segment` over `fields` on repeats of `sep`.
    ///
    /// Every field must get a non-empty value. Among valid splits the strictly
    /// higher aggregate score wins, so ties keep the leftmost split.
    fn resolve(&self, fields: &[FieldKind], segment: &str, sep: &Separator) -> Option<TokenAssignment> {
        let (&head, tail) = fields.split_first()?;
        if segment.is_empty() {
            return None;
        }
        if tail.is_empty() {
            let mut single = TokenAssignment::default();
            single.record(head, segment, self.ctx);
            return Some(single);
        }

        let mut best: Option<TokenAssignment> = None;
        for m in sep.matches(segment) {
            if m.start == 0 {
                continue;
            }
            let Some(remainder) = self.resolve(tail, &segment[m.end..], sep) else {
                continue;
            };
            let mut candidate = TokenAssignment::default();
            candidate.record(head, &segment[..m.start], self.ctx);
            candidate.merge(remainder);
            if best.as_ref().map_or(true, |b| candidate.score() > b.score()) {
                best = Some(candidate);
            }
        }
        best
    }
}

/// Tokenize `input` against `template` with the given scoring context.
pub fn tokenize(
    template: &FormatTemplate,
    input: &str,
    ctx: &ScoringContext,
) -> Result<TokenAssignment, Rejection> {
    Tokenizer::new(ctx).tokenize(template, input)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ParsedTrack;

    fn run(template: &str, input: &str) -> Result<TokenAssignment, Rejection> {
        let template = FormatTemplate::parse(template).unwrap();
        tokenize(&template, input, &ScoringContext::default())
    }

    #[test]
    fn test_simple_template() {
        let tokens = run(
            "<ARTIST> - <TITLE> (<IGNORE>)",
            "Zabreguelles - This Title Is Awesome (Ignore me)",
        )
        .unwrap();
        assert_eq!(tokens.values_of(FieldKind::Artist), vec!["Zabreguelles"]);
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["This Title Is Awesome"]);
        assert_eq!(tokens.values_of(FieldKind::Ignore), vec!["Ignore me"]);
        assert_eq!(tokens.score(), 6);
    }

    #[test]
    fn test_score_is_sum_of_fields() {
        let tokens = run(
            "<ARTIST> - <TITLES> (feat. <FEAT>)",
            "Artist1 - Track1 (feat. Artist2)",
        )
        .unwrap();
        assert_eq!(tokens.score(), 3 + 6 + 3);
        assert_eq!(tokens.get(FieldKind::Titles)[0].score, 6);
    }

    #[test]
    fn test_leading_literal() {
        let tokens = run("feat. <FEAT> (<IGNORE>) - <TITLES>", "feat. Someone (x) - Song").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Feat), vec!["Someone"]);
        assert_eq!(tokens.values_of(FieldKind::Titles), vec!["Song"]);
    }

    #[test]
    fn test_missing_leading_literal_rejected() {
        let template = FormatTemplate::parse("[<GENRE>] - <ARTIST> - <TITLE>").unwrap();
        // Fits (separators are all present) but the input does not start with "["
        let input = "x [Trance] - A - B";
        assert!(template.fits(input));
        assert_eq!(
            tokenize(&template, input, &ScoringContext::default()),
            Err(Rejection::MissingLiteral("[".to_string()))
        );
    }

    #[test]
    fn test_repeated_separator_split_exactly() {
        let tokens = run("<ARTIST> - <ALBUM> - <TITLE> (<VERSION>)", "A - B - C (Remix)").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Artist), vec!["A"]);
        assert_eq!(tokens.values_of(FieldKind::Album), vec!["B"]);
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["C"]);
        assert_eq!(tokens.values_of(FieldKind::Version), vec!["Remix"]);
    }

    #[test]
    fn test_repeated_leading_literal() {
        let tokens = run("x<ARTIST>x<TITLE>", "xAxB").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Artist), vec!["A"]);
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["B"]);
    }

    #[test]
    fn test_repeated_literal_ends_template() {
        let tokens = run("<ARTIST> - <TITLE> - ", "A - B - ").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Artist), vec!["A"]);
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["B"]);
    }

    #[test]
    fn test_repeated_literal_ends_long_template() {
        let tokens = run("<ARTIST> - <ALBUM> - <TITLE> - ", "A - B - C - ").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Artist), vec!["A"]);
        assert_eq!(tokens.values_of(FieldKind::Album), vec!["B"]);
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["C"]);
    }

    #[test]
    fn test_repeated_literal_after_ambiguous_hop() {
        let template = "<ARTIST> feat. <FEAT> - <ALBUM> - <TITLE>";
        let plain = run(template, "A feat. B - C - D").unwrap();
        assert_eq!(plain.len(), 4);

        let tokens = run(template, "A feat. X feat. B - C - D").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens.get(FieldKind::Artist).len(), 1);
        assert_eq!(tokens.get(FieldKind::Feat).len(), 1);
        assert_eq!(tokens.values_of(FieldKind::Album), vec!["C"]);
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["D"]);
    }

    #[test]
    fn test_ambiguity_picks_best_split() {
        let tokens = run(
            "[<GENRE>] - <ARTIST> ft. <FEAT> - <TITLES> (<EXTRA> <VERSION>)",
            "[Trance] - Artist ft. Guest - Some - Long - Title (Remixer Remix)",
        )
        .unwrap();
        assert_eq!(tokens.values_of(FieldKind::Genre), vec!["Trance"]);
        assert_eq!(tokens.values_of(FieldKind::Artist), vec!["Artist"]);
        // Middle split: -37 / -44 beats -84 (first) and -57 (last)
        assert_eq!(tokens.values_of(FieldKind::Feat), vec!["Guest - Some"]);
        assert_eq!(tokens.values_of(FieldKind::Titles), vec!["Long - Title"]);
        assert_eq!(tokens.values_of(FieldKind::Extra), vec!["Remixer"]);
        assert_eq!(tokens.values_of(FieldKind::Version), vec!["Remix"]);
        assert_eq!(tokens.score(), -44);
    }

    #[test]
    fn test_ambiguity_tie_keeps_leftmost() {
        let tokens = run("<ARTIST_EXTRA> - <TITLES> <VERSION>", "Dewian Gross - Free To Go").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Titles), vec!["Free"]);
        assert_eq!(tokens.values_of(FieldKind::Version), vec!["To Go"]);
        let mut track = ParsedTrack::default();
        assert_eq!(
            tokens.assign_to(&mut track),
            Err(AssignError::UnknownVersion("To Go".to_string()))
        );
    }

    #[test]
    fn test_ambiguity_with_version_token() {
        let tokens = run(
            "<ARTIST_EXTRA> - <TITLES> <VERSION>",
            "Dewian Gross - Free To Go Remix",
        )
        .unwrap();
        assert_eq!(tokens.values_of(FieldKind::Titles), vec!["Free To Go"]);
        assert_eq!(tokens.values_of(FieldKind::Version), vec!["Remix"]);
        assert_eq!(tokens.score(), 3 + 6 + 3);
    }

    #[test]
    fn test_ambiguity_equal_scores_keep_leftmost() {
        // "b" / "x (y" and "b (x" / "y" both score 3
        let tokens = run("<ARTIST> - <TITLE> (<IGNORE>)", "a - b (x (y)").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["b"]);
        assert_eq!(tokens.values_of(FieldKind::Ignore), vec!["x (y"]);
    }

    #[test]
    fn test_resolver_skips_empty_values() {
        let ctx = ScoringContext::default();
        let tokenizer = Tokenizer::new(&ctx);
        let template = FormatTemplate::parse("<ARTIST> - <TITLE>").unwrap();
        let sep = &template.separators()[0];
        let fields = [FieldKind::Artist, FieldKind::Title];

        // Leading separator would leave ARTIST empty, so only the second split counts
        let tokens = tokenizer.resolve(&fields, " - x - y", sep).unwrap();
        assert_eq!(tokens.values_of(FieldKind::Artist), vec![" - x"]);
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["y"]);

        // Trailing separator would leave TITLE empty
        assert!(tokenizer.resolve(&fields, "x - ", sep).is_none());
        assert!(tokenizer.resolve(&fields, "", sep).is_none());
    }

    #[test]
    fn test_does_not_fit() {
        assert_eq!(
            run("<ARTIST> - <TITLE> (<IGNORE>)", "Artist - Title"),
            Err(Rejection::DoesNotFit)
        );
    }

    #[test]
    fn test_single_field_takes_everything() {
        let tokens = run("<TITLE>", "Whole - Thing").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["Whole - Thing"]);
    }

    #[test]
    fn test_case_insensitive_separators() {
        let tokens = run("<ARTIST> feat. <FEAT> - <TITLE>", "Main FEAT. Guest - Song").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Artist), vec!["Main"]);
        assert_eq!(tokens.values_of(FieldKind::Feat), vec!["Guest"]);
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["Song"]);
    }

    #[test]
    fn test_trailing_input_after_last_literal_ignored() {
        let tokens = run("<ARTIST> (<TITLE>)", "a (b) trailing").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Title), vec!["b"]);
    }

    #[test]
    fn test_number_field() {
        let tokens = run("<NUMBER>. <ARTIST> - <TITLE>", "07. Artist - Song").unwrap();
        assert_eq!(tokens.values_of(FieldKind::Number), vec!["07"]);
        let mut track = ParsedTrack::default();
        tokens.assign_to(&mut track).unwrap();
        assert_eq!(track.number, Some(7));
    }

    #[test]
    fn test_malformed_inputs_never_panic() {
        let templates = [
            "<ARTIST> - <TITLE>",
            "[<GENRE>] - <ARTIST> ft. <FEAT> - <TITLES> (<EXTRA> <VERSION>)",
            "<ARTIST> - <ALBUM> - <TITLE>",
            "(<NUMBER>) <TITLE>",
        ];
        let inputs = ["", " - ", "[", "] - ft. - (", "- - - -", "((((", "é - ü - ö", "[] -  ft.  - ( )"];
        for template in templates {
            for input in inputs {
                let _ = run(template, input);
            }
        }
    }
}
