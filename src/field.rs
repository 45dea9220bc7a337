//! Field kinds a template can declare, with their scoring and assignment rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AssignError, TemplateError};
use crate::normalize::{capitalize_fully, split_artists};
use crate::scoring::{
    default_score, has_suspicious_name, has_suspicious_title, ScoringContext, SEVERE_PENALTY,
    LOW_PENALTY,
};
use crate::sink::TrackSink;

// ============================================================================
// Base Scores
// ============================================================================

/// No prior confidence in the value
const NO_VALUE: i32 = 0;
/// Weak prior (free-form categories like genre)
const L1_VALUE: i32 = 1;
/// Strong prior (names, titles, numbers)
const L2_VALUE: i32 = 3;

// ============================================================================
// FieldKind
// ============================================================================

/// Semantic type of a template placeholder. Written in templates as `<NAME>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKind {
    /// Track number
    Number,
    /// Track title
    Title,
    /// Main artist(s); credits are split on the usual separators
    Artist,
    /// Featured artist(s)
    Feat,
    /// Artists credited only for production
    Producer,
    /// Album title
    Album,
    /// Track title that is also the title of its single
    Titles,
    Genre,
    /// One of the known version tokens ("Remix", "Radio Edit", ...)
    Version,
    /// Free-form version label kept verbatim
    Vtoken,
    /// Remix / cover artist(s)
    Extra,
    /// Main artist that is also the version artist (VIP remixes, self-covers)
    ArtistExtra,
    /// Title of a hidden track inside this one
    Hidden,
    /// Anything irrelevant to the layout
    Ignore,
}

impl FieldKind {
    pub const ALL: [FieldKind; 14] = [
        FieldKind::Number,
        FieldKind::Title,
        FieldKind::Artist,
        FieldKind::Feat,
        FieldKind::Producer,
        FieldKind::Album,
        FieldKind::Titles,
        FieldKind::Genre,
        FieldKind::Version,
        FieldKind::Vtoken,
        FieldKind::Extra,
        FieldKind::ArtistExtra,
        FieldKind::Hidden,
        FieldKind::Ignore,
    ];

    /// Fields a complete track carries. Not enforced unless passed to
    /// [`ParserConfig::with_required`](crate::config::ParserConfig::with_required).
    pub const REQUIRED_DEFAULTS: [FieldKind; 2] = [FieldKind::Title, FieldKind::Artist];

    /// Fields that may occur more than once in a single template.
    pub const DUPLICABLE: [FieldKind; 4] = [
        FieldKind::Ignore,
        FieldKind::Artist,
        FieldKind::Feat,
        FieldKind::Genre,
    ];

    const ALTERNATIVES: [(FieldKind, FieldKind); 2] = [
        (FieldKind::Titles, FieldKind::Title),
        (FieldKind::Artist, FieldKind::ArtistExtra),
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Number => "NUMBER",
            FieldKind::Title => "TITLE",
            FieldKind::Artist => "ARTIST",
            FieldKind::Feat => "FEAT",
            FieldKind::Producer => "PRODUCER",
            FieldKind::Album => "ALBUM",
            FieldKind::Titles => "TITLES",
            FieldKind::Genre => "GENRE",
            FieldKind::Version => "VERSION",
            FieldKind::Vtoken => "VTOKEN",
            FieldKind::Extra => "EXTRA",
            FieldKind::ArtistExtra => "ARTIST_EXTRA",
            FieldKind::Hidden => "HIDDEN",
            FieldKind::Ignore => "IGNORE",
        }
    }

    /// Placeholder as written in a template, e.g. `<ARTIST>`.
    pub fn marker(self) -> String {
        format!("<{}>", self.name())
    }

    pub fn base_score(self) -> i32 {
        match self {
            FieldKind::Genre => L1_VALUE,
            FieldKind::Vtoken | FieldKind::Ignore => NO_VALUE,
            _ => L2_VALUE,
        }
    }

    pub fn is_duplicable(self) -> bool {
        Self::DUPLICABLE.contains(&self)
    }

    /// The field that satisfies a requirement on `self` when `self` is absent.
    pub fn alternative(self) -> Option<FieldKind> {
        Self::ALTERNATIVES.iter().find_map(|&(a, b)| {
            if a == self {
                Some(b)
            } else if b == self {
                Some(a)
            } else {
                None
            }
        })
    }

    /// Confidence that `value` belongs in this field. Negative means unlikely;
    /// every value of a multi-valued field is scored on its own.
    pub fn score(self, value: &str, ctx: &ScoringContext) -> i32 {
        match self {
            FieldKind::Number => {
                let penalty = if value.chars().all(|c| c.is_ascii_digit()) {
                    0
                } else {
                    SEVERE_PENALTY
                };
                default_score(self, value) + penalty
            }
            FieldKind::Title | FieldKind::Hidden => {
                let score = default_score(FieldKind::Title, value);
                if has_suspicious_title(value) {
                    score + LOW_PENALTY
                } else {
                    score
                }
            }
            FieldKind::Artist
            | FieldKind::Feat
            | FieldKind::Producer
            | FieldKind::Extra
            | FieldKind::ArtistExtra => {
                let score = default_score(FieldKind::Artist, value);
                if has_suspicious_name(value) {
                    score + SEVERE_PENALTY
                } else {
                    score + ctx.occurrence_score(FieldKind::Artist, value)
                }
            }
            FieldKind::Album => default_score(self, value),
            FieldKind::Titles => {
                FieldKind::Title.score(value, ctx) + FieldKind::Album.score(value, ctx)
            }
            FieldKind::Genre | FieldKind::Vtoken | FieldKind::Ignore => {
                default_score(self, value) + ctx.occurrence_score(self, value)
            }
            FieldKind::Version => {
                if VersionType::from_token(value).is_some() {
                    default_score(self, value)
                } else {
                    SEVERE_PENALTY
                }
            }
        }
    }

    /// Write `values` into `sink`. Single-valued kinds use the first value.
    pub fn assign<S: TrackSink + ?Sized>(
        self,
        values: &[String],
        sink: &mut S,
    ) -> Result<(), AssignError> {
        let first = || values.first().ok_or(AssignError::MissingValue(self));
        let artists = || values.iter().flat_map(|v| split_artists(v)).collect::<Vec<_>>();

        match self {
            FieldKind::Number => {
                let raw = first()?;
                let number = raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| AssignError::InvalidNumber(raw.clone()))?;
                sink.set_number(number);
            }
            FieldKind::Title => sink.set_title(capitalize_fully(first()?)),
            FieldKind::Album => sink.set_album_title(capitalize_fully(first()?)),
            FieldKind::Titles => {
                FieldKind::Title.assign(values, sink)?;
                FieldKind::Album.assign(values, sink)?;
            }
            FieldKind::Artist => sink.add_main_artists(artists()),
            FieldKind::Feat => sink.add_features(artists()),
            FieldKind::Producer => sink.add_producers(artists()),
            FieldKind::Extra => sink.add_extra_artists(artists()),
            FieldKind::ArtistExtra => {
                FieldKind::Artist.assign(values, sink)?;
                FieldKind::Extra.assign(values, sink)?;
            }
            FieldKind::Genre => sink.add_genres(values.to_vec()),
            FieldKind::Version => {
                let raw = first()?;
                let version = VersionType::from_token(raw)
                    .ok_or_else(|| AssignError::UnknownVersion(raw.clone()))?;
                sink.set_version(version);
            }
            FieldKind::Vtoken => sink.set_version_token(first()?.clone()),
            FieldKind::Hidden => sink.set_hidden_track(first()?.clone()),
            FieldKind::Ignore => values.iter().for_each(|v| sink.add_ignored(v.clone())),
        }
        Ok(())
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldKind {
    type Err = TemplateError;

    /// Exact, case-sensitive match on the field name (without angle brackets).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| TemplateError::UnknownFieldKind(s.to_string()))
    }
}

// ============================================================================
// Version Vocabulary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionType {
    Acoustic,
    Cover,
    Extended,
    Instrumental,
    Live,
    Radio,
    Remix,
    Remaster,
}

impl VersionType {
    pub const ALL: [VersionType; 8] = [
        VersionType::Acoustic,
        VersionType::Cover,
        VersionType::Extended,
        VersionType::Instrumental,
        VersionType::Live,
        VersionType::Radio,
        VersionType::Remix,
        VersionType::Remaster,
    ];

    /// Lower-case tokens that name this version in a file name.
    pub fn tokens(self) -> &'static [&'static str] {
        match self {
            VersionType::Acoustic => &["acoustic", "unplugged"],
            VersionType::Cover => &["cover"],
            VersionType::Extended => &["extended", "extended mix", "extended version", "original mix"],
            VersionType::Instrumental => &["instrumental"],
            VersionType::Live => &["live"],
            VersionType::Radio => &["radio edit", "radio mix", "radio version"],
            VersionType::Remix => &["remix", "mix", "edit", "rework", "bootleg", "flip", "vip"],
            VersionType::Remaster => &["remaster", "remastered"],
        }
    }

    /// Case-insensitive exact token lookup.
    pub fn from_token(token: &str) -> Option<VersionType> {
        let token = token.trim().to_lowercase();
        VersionType::ALL
            .iter()
            .copied()
            .find(|version| version.tokens().contains(&token.as_str()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
