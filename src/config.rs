//! Parser configuration.
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `TRACKFMT_`-prefixed environment variables (`__` separates nested keys).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::WeightsError;
use crate::field::FieldKind;
use crate::scoring::ScoreWeights;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum number of candidates per input. 0 or negative means unbounded.
    pub limit: i32,
    /// Fields every template must declare (directly or through its alternative).
    pub required_fields: Vec<FieldKind>,
    /// Fail the whole ranking call instead of skipping offending templates.
    pub strict_required: bool,
    /// Tokenizer to occurrence weight ratio, `N:M`.
    pub score_ratio: String,
    /// Consult the occurrence oracle when one is available.
    pub db_scoring: bool,
    /// Drop candidates whose final score is negative.
    pub filter_negatives: bool,
    pub parallel: bool,
    /// 0 uses the global rayon pool; otherwise a dedicated pool of this size.
    pub workers: usize,
    /// Per-call deadline; templates not started in time are skipped.
    pub timeout_ms: Option<u64>,
    pub library_path: Option<PathBuf>,
    /// Inline templates, added after the library file.
    pub templates: Vec<String>,
    pub log_level: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            required_fields: Vec::new(),
            strict_required: false,
            score_ratio: "1:1".to_string(),
            db_scoring: true,
            filter_negatives: false,
            parallel: true,
            workers: 0,
            timeout_ms: None,
            library_path: None,
            templates: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl ParserConfig {
    pub fn weights(&self) -> Result<ScoreWeights, WeightsError> {
        self.score_ratio.parse()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn with_limit(mut self, limit: i32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_required<I: IntoIterator<Item = FieldKind>>(mut self, fields: I) -> Self {
        self.required_fields = fields.into_iter().collect();
        self
    }

    pub fn with_strict_required(mut self, strict: bool) -> Self {
        self.strict_required = strict;
        self
    }

    pub fn with_score_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.score_ratio = ratio.into();
        self
    }

    pub fn with_db_scoring(mut self, enabled: bool) -> Self {
        self.db_scoring = enabled;
        self
    }

    pub fn with_filter_negatives(mut self, filter: bool) -> Self {
        self.filter_negatives = filter;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_library_path(mut self, path: impl AsRef<Path>) -> Self {
        self.library_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_templates<I, S>(mut self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.templates = templates.into_iter().map(Into::into).collect();
        self
    }
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: TRACKFMT_).
pub fn load(config_path: Option<&Path>) -> Result<ParserConfig> {
    let mut figment = Figment::from(Serialized::defaults(ParserConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("TRACKFMT_").split("__"));

    let config: ParserConfig = figment.extract().context("Invalid parser configuration")?;
    config
        .weights()
        .with_context(|| format!("Invalid score_ratio '{}'", config.score_ratio))?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}
