//! Occurrence oracle: how often a value or template has been seen before.
//!
//! The engine only reads from it, from many worker threads at once.

use std::path::Path;

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::field::FieldKind;

pub trait OccurrenceOracle: Send + Sync {
    /// Bonus for `value` having been seen as `kind` before. 0 when unknown.
    fn occurrence_score(&self, kind: FieldKind, value: &str) -> i32;

    /// Bonus for a template (by canonical string) having matched before.
    fn template_score(&self, canonical: &str) -> i32;
}

/// One line of a JSON occurrence history file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueOccurrence {
    pub field: FieldKind,
    pub value: String,
    pub count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateOccurrence {
    pub template: String,
    pub count: i32,
}

/// On-disk shape of an occurrence history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OccurrenceHistory {
    #[serde(default)]
    pub values: Vec<ValueOccurrence>,
    #[serde(default)]
    pub templates: Vec<TemplateOccurrence>,
}

/// FxHashMap-backed oracle. Value keys are case-insensitive; template keys are
/// canonical strings and compared exactly.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOracle {
    values: FxHashMap<(FieldKind, String), i32>,
    templates: FxHashMap<String, i32>,
}

impl InMemoryOracle {
    /// Add `count` sightings of `value` as `kind`.
    pub fn record(&mut self, kind: FieldKind, value: &str, count: i32) {
        *self.values.entry((kind, value.to_lowercase())).or_insert(0) += count;
    }

    pub fn record_template(&mut self, canonical: &str, count: i32) {
        *self.templates.entry(canonical.to_string()).or_insert(0) += count;
    }

    pub fn from_history(history: OccurrenceHistory) -> Self {
        let mut oracle = Self::default();
        for v in &history.values {
            oracle.record(v.field, &v.value, v.count);
        }
        for t in &history.templates {
            oracle.record_template(&t.template, t.count);
        }
        oracle
    }

    /// Load a JSON occurrence history file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read occurrence history {}", path.display()))?;
        let history: OccurrenceHistory = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse occurrence history {}", path.display()))?;
        info!(
            target: "config",
            values = history.values.len(),
            templates = history.templates.len(),
            "occurrence history loaded"
        );
        Ok(Self::from_history(history))
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OccurrenceOracle for InMemoryOracle {
    fn occurrence_score(&self, kind: FieldKind, value: &str) -> i32 {
        self.values
            .get(&(kind, value.to_lowercase()))
            .copied()
            .unwrap_or(0)
    }

    fn template_score(&self, canonical: &str) -> i32 {
        self.templates.get(canonical).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_record_is_case_insensitive_and_accumulates() {
        let mut oracle = InMemoryOracle::default();
        oracle.record(FieldKind::Artist, "Daft Punk", 2);
        oracle.record(FieldKind::Artist, "DAFT PUNK", 3);
        assert_eq!(oracle.occurrence_score(FieldKind::Artist, "daft punk"), 5);
        // Same value under another kind is a separate key
        assert_eq!(oracle.occurrence_score(FieldKind::Genre, "daft punk"), 0);
    }

    #[test]
    fn test_template_scores() {
        let mut oracle = InMemoryOracle::default();
        oracle.record_template("<ARTIST> - <TITLE>", 7);
        assert_eq!(oracle.template_score("<ARTIST> - <TITLE>"), 7);
        assert_eq!(oracle.template_score("<TITLE> - <ARTIST>"), 0);
    }

    #[test]
    fn test_load_history_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"values":[{{"field":"GENRE","value":"Trance","count":4}}],
                "templates":[{{"template":"<ARTIST> - <TITLE>","count":1}}]}}"#
        )
        .unwrap();

        let oracle = InMemoryOracle::load(file.path()).unwrap();
        assert_eq!(oracle.len(), 2);
        assert_eq!(oracle.occurrence_score(FieldKind::Genre, "trance"), 4);
        assert_eq!(oracle.template_score("<ARTIST> - <TITLE>"), 1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InMemoryOracle::load(&dir.path().join("missing.json")).is_err());
    }
}
