//! Error types.
//!
//! Template-definition errors are caller-visible. Rejections are per-template,
//! per-input failures that the ranker absorbs; they only show up in logs.

use thiserror::Error;

use crate::field::FieldKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("ambiguous template '{0}': two fields without a separator between them")]
    AmbiguousTemplate(String),

    #[error("unknown field kind <{0}>")]
    UnknownFieldKind(String),

    #[error("template '{0}' declares no fields")]
    NoFieldsDeclared(String),

    #[error("field {field} may only appear once in '{template}'")]
    DuplicateField { field: FieldKind, template: String },

    #[error("invalid separator '{0}'")]
    InvalidSeparator(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error("'{0}' is not a track number")]
    InvalidNumber(String),

    #[error("'{0}' is not a known version token")]
    UnknownVersion(String),

    #[error("no value to assign to {0}")]
    MissingValue(FieldKind),
}

/// Why one template produced no candidate for one input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("input does not fit the template's separators")]
    DoesNotFit,

    #[error("input does not continue with '{0}'")]
    MissingLiteral(String),

    #[error("separator '{0}' not found")]
    SeparatorNotFound(String),

    #[error("no valid split of '{segment}' on '{separator}'")]
    Unresolvable { segment: String, separator: String },

    #[error("assigned {assigned} of {expected} fields")]
    IncompleteAssignment { assigned: usize, expected: usize },

    #[error(transparent)]
    Assign(#[from] AssignError),
}

#[derive(Debug, Error)]
pub enum RankError {
    #[error("templates missing required fields: {}", .0.join("; "))]
    MissingRequiredFields(Vec<String>),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightsError {
    #[error("score ratio '{0}' is not of the form N:M")]
    Malformed(String),

    #[error("score ratio '{0}' has a non-numeric or negative weight")]
    InvalidWeight(String),
}
