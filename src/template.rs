//! Format templates: an ordered field list plus a ledger of literal separators.
//!
//! A template is written as literal text interleaved with `<FIELD>` markers,
//! e.g. `<ARTIST> - <TITLE> (<VERSION>)`. Its canonical string is rebuilt from
//! the parsed parts and always parses back to an equal template.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::TemplateError;
use crate::field::FieldKind;
use crate::normalize::collation_key;

/// Runs of spaces inside a literal fold to a single space.
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

// ============================================================================
// Track Category
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackCategory {
    Original,
    Version,
}

// ============================================================================
// Separator Ledger
// ============================================================================

/// One ledger entry: a literal and how many times in a row it separates fields.
#[derive(Debug, Clone)]
pub struct Separator {
    text: String,
    count: usize,
    matcher: Regex,
}

impl Separator {
    fn new(text: String, count: usize) -> Result<Self, TemplateError> {
        let matcher = RegexBuilder::new(&regex::escape(&text))
            .case_insensitive(true)
            .build()
            .map_err(|_| TemplateError::InvalidSeparator(text.clone()))?;
        Ok(Self {
            text,
            count,
            matcher,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Expected number of consecutive occurrences.
    pub fn count(&self) -> usize {
        self.count
    }

    /// First case-insensitive match at or after byte offset `from`.
    pub fn find_at(&self, haystack: &str, from: usize) -> Option<Range<usize>> {
        if from > haystack.len() {
            return None;
        }
        self.matcher.find_at(haystack, from).map(|m| m.range())
    }

    /// Non-overlapping, case-insensitive occurrences in `haystack`.
    pub fn count_in(&self, haystack: &str) -> usize {
        self.matcher.find_iter(haystack).count()
    }

    /// Split `haystack` on every case-insensitive occurrence.
    pub fn split<'h>(&self, haystack: &'h str) -> Vec<&'h str> {
        self.matcher.split(haystack).collect()
    }

    /// Case-insensitive matches in order.
    pub fn matches<'a>(&'a self, haystack: &'a str) -> impl Iterator<Item = Range<usize>> + 'a {
        self.matcher.find_iter(haystack).map(|m| m.range())
    }
}

impl PartialEq for Separator {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.count == other.count
    }
}

impl Eq for Separator {}

/// What the tokenizer walks: one entry per literal occurrence, wrapped in
/// start/end sentinels when the template begins or ends with a field.
#[derive(Debug, Clone, Copy)]
pub enum Boundary<'t> {
    Start,
    Literal(&'t Separator),
    End,
}

impl<'t> Boundary<'t> {
    /// Matched width. Sentinels are zero-width.
    pub fn len(&self) -> usize {
        match self {
            Boundary::Literal(sep) => sep.text.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both boundaries are occurrences of the same ledger entry.
    pub fn same_entry(&self, other: &Boundary<'_>) -> bool {
        match (self, other) {
            (Boundary::Literal(a), Boundary::Literal(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }

    pub fn text(&self) -> &'t str {
        match *self {
            Boundary::Literal(sep) => sep.text.as_str(),
            _ => "",
        }
    }

    /// Where this boundary sits in `haystack`, searching from `from`.
    /// `Start` sits at 0 and `End` at the end of the string.
    pub fn find_at(&self, haystack: &str, from: usize) -> Option<Range<usize>> {
        match self {
            Boundary::Start => Some(0..0),
            Boundary::End => Some(haystack.len()..haystack.len()),
            Boundary::Literal(sep) => sep.find_at(haystack, from),
        }
    }

    /// Length of the boundary if `haystack` begins with it.
    pub fn prefix_len(&self, haystack: &str) -> Option<usize> {
        match self {
            Boundary::Start => Some(0),
            Boundary::End => haystack.is_empty().then_some(0),
            Boundary::Literal(sep) => sep
                .find_at(haystack, 0)
                .filter(|m| m.start == 0)
                .map(|m| m.end),
        }
    }
}

// ============================================================================
// FormatTemplate
// ============================================================================

enum Piece {
    Literal(String),
    Field(FieldKind),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormatTemplate {
    fields: Vec<FieldKind>,
    separators: Vec<Separator>,
    starts_with_field: bool,
    ends_with_field: bool,
    category: Option<TrackCategory>,
    canonical: String,
}

impl FormatTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        if template.contains("><") {
            return Err(TemplateError::AmbiguousTemplate(template.to_string()));
        }

        let pieces = split_pieces(template)?;
        let mut built = Self {
            fields: Vec::new(),
            separators: Vec::new(),
            starts_with_field: matches!(pieces.first(), Some(Piece::Field(_))),
            ends_with_field: matches!(pieces.last(), Some(Piece::Field(_))),
            category: None,
            canonical: String::new(),
        };

        for piece in pieces {
            match piece {
                Piece::Field(kind) => {
                    if !kind.is_duplicable() && built.fields.contains(&kind) {
                        return Err(TemplateError::DuplicateField {
                            field: kind,
                            template: template.to_string(),
                        });
                    }
                    built.fields.push(kind);
                }
                Piece::Literal(text) => built.push_literal(&text)?,
            }
        }

        if built.fields.is_empty() {
            return Err(TemplateError::NoFieldsDeclared(template.to_string()));
        }

        built.refresh();
        trace!(target: "template", template = %built.canonical, "parsed template");
        Ok(built)
    }

    /// Override the category that would otherwise be inferred from the fields.
    pub fn with_category(mut self, category: TrackCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn fields(&self) -> &[FieldKind] {
        &self.fields
    }

    pub fn separators(&self) -> &[Separator] {
        &self.separators
    }

    pub fn contains(&self, kind: FieldKind) -> bool {
        self.fields.contains(&kind)
    }

    pub fn starts_with_field(&self) -> bool {
        self.starts_with_field
    }

    pub fn ends_with_field(&self) -> bool {
        self.ends_with_field
    }

    pub fn category(&self) -> TrackCategory {
        self.category.unwrap_or(if self.contains(FieldKind::Version) {
            TrackCategory::Version
        } else {
            TrackCategory::Original
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Ledger with sentinels, in the order the tokenizer consumes it.
    pub fn boundaries(&self) -> Vec<Boundary<'_>> {
        let occurrences: usize = self.separators.iter().map(|sep| sep.count).sum();
        let mut out = Vec::with_capacity(occurrences + 2);
        if self.starts_with_field {
            out.push(Boundary::Start);
        }
        out.extend(
            self.separators
                .iter()
                .flat_map(|sep| std::iter::repeat(Boundary::Literal(sep)).take(sep.count)),
        );
        if self.ends_with_field {
            out.push(Boundary::End);
        }
        out
    }

    /// Every literal in template order, with repeats expanded.
    pub fn expanded_separators(&self) -> Vec<&str> {
        self.separators
            .iter()
            .flat_map(|sep| std::iter::repeat(sep.text.as_str()).take(sep.count))
            .collect()
    }

    /// Cheap pre-filter: can `input` possibly match this template's separators?
    pub fn fits(&self, input: &str) -> bool {
        match self.separators.as_slice() {
            [] => true,
            [only] => only.count_in(input) >= only.count,
            ledger => {
                let mut last = 0;
                for pair in ledger.windows(2) {
                    let (sep, next_sep) = (&pair[0], &pair[1]);
                    let Some(cur) = sep.find_at(input, last) else {
                        return false;
                    };
                    let Some(next) = next_sep.find_at(input, cur.end) else {
                        return false;
                    };
                    if sep.count_in(&input[cur.start..next.start]) < sep.count {
                        return false;
                    }
                    last = next.start;
                }
                true
            }
        }
    }

    /// Required fields this template lacks, honouring the alternative table.
    pub fn missing_required(&self, required: &[FieldKind]) -> Vec<FieldKind> {
        required
            .iter()
            .copied()
            .filter(|&kind| {
                !self.contains(kind) && kind.alternative().map_or(true, |alt| !self.contains(alt))
            })
            .collect()
    }

    /// Append literal text. After a literal, the text extends that literal.
    pub fn append_separator(&mut self, separator: &str) -> Result<&mut Self, TemplateError> {
        if separator.is_empty() || separator.contains(['<', '>']) {
            return Err(TemplateError::InvalidSeparator(separator.to_string()));
        }
        if !self.ends_with_field {
            if let Some(last) = self.separators.pop() {
                let extended = format!("{}{}", last.text, separator);
                if last.count > 1 {
                    self.separators.push(Separator::new(last.text.clone(), last.count - 1)?);
                }
                self.push_literal(&extended)?;
                self.refresh();
                return Ok(self);
            }
        }
        self.push_literal(separator)?;
        self.ends_with_field = false;
        self.refresh();
        Ok(self)
    }

    /// Append a field. Two fields in a row are ambiguous.
    pub fn append_field(&mut self, kind: FieldKind) -> Result<&mut Self, TemplateError> {
        if self.ends_with_field {
            return Err(TemplateError::AmbiguousTemplate(format!(
                "{}{}",
                self.canonical,
                kind.marker()
            )));
        }
        if !kind.is_duplicable() && self.contains(kind) {
            return Err(TemplateError::DuplicateField {
                field: kind,
                template: self.canonical.clone(),
            });
        }
        self.fields.push(kind);
        self.ends_with_field = true;
        self.refresh();
        Ok(self)
    }

    /// Add a literal to the ledger, merging it into an identical last entry.
    fn push_literal(&mut self, raw: &str) -> Result<(), TemplateError> {
        let text = SPACE_RUN.replace_all(raw, " ").into_owned();
        if text.is_empty() {
            return Ok(());
        }
        match self.separators.last_mut() {
            Some(last) if last.text == text => last.count += 1,
            _ => self.separators.push(Separator::new(text, 1)?),
        }
        Ok(())
    }

    fn refresh(&mut self) {
        self.canonical = self.render();
    }

    fn render(&self) -> String {
        let seps = self.expanded_separators();
        let mut out = String::with_capacity(32);
        let mut fields = self.fields.iter();
        let mut seps = seps.into_iter();

        if !self.starts_with_field {
            if let Some(sep) = seps.next() {
                out.push_str(sep);
            }
        }
        loop {
            match fields.next() {
                Some(field) => out.push_str(&field.marker()),
                None => break,
            }
            match seps.next() {
                Some(sep) => out.push_str(sep),
                None => break,
            }
        }
        out
    }
}

/// Split a template string into literal and field pieces.
fn split_pieces(template: &str) -> Result<Vec<Piece>, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('<') {
        if open > 0 {
            pieces.push(Piece::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('>')
            .ok_or_else(|| TemplateError::UnknownFieldKind(after.to_string()))?;
        pieces.push(Piece::Field(after[..close].parse()?));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest.to_string()));
    }
    Ok(pieces)
}

impl fmt::Display for FormatTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for FormatTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FormatTemplate {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FormatTemplate> for String {
    fn from(template: FormatTemplate) -> Self {
        template.canonical
    }
}

impl PartialEq for FormatTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for FormatTemplate {}

impl Hash for FormatTemplate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl Ord for FormatTemplate {
    /// Collation order on the canonical string; raw string breaks ties.
    fn cmp(&self, other: &Self) -> Ordering {
        collation_key(&self.canonical)
            .cmp(&collation_key(&other.canonical))
            .then_with(|| self.canonical.cmp(&other.canonical))
    }
}

impl PartialOrd for FormatTemplate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// TESTS
// ============================================================================
