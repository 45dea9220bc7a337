//! trackfmt - template-driven parsing of free-form track names.
//!
//! A [`FormatTemplate`] such as `<ARTIST> - <TITLE> (<VERSION>)` describes one way
//! a track name can be laid out. The [`Ranker`] tries every template of a
//! [`TemplateLibrary`] against an input string, scores each interpretation, and
//! returns the most plausible ones first.

pub mod config;
pub mod error;
pub mod field;
pub mod library;
pub mod normalize;
pub mod oracle;
pub mod progress;
pub mod ranker;
pub mod scoring;
pub mod sink;
pub mod template;
pub mod tokenizer;

pub use config::ParserConfig;
pub use error::{AssignError, RankError, Rejection, TemplateError, WeightsError};
pub use field::{FieldKind, VersionType};
pub use library::TemplateLibrary;
pub use oracle::{InMemoryOracle, OccurrenceOracle};
pub use ranker::{Candidate, RankOptions, Ranker};
pub use scoring::{ScoreWeights, ScoringContext};
pub use sink::{ParsedTrack, TrackSink};
pub use template::{FormatTemplate, TrackCategory};
pub use tokenizer::{tokenize, TokenAssignment, Tokenizer};
