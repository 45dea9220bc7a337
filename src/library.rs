//! Template libraries and their text format.
//!
//! One template per line, in canonical form. Lines starting with `//` and blank
//! lines are skipped. Bad lines are logged and kept aside; they never abort a load.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use tracing::{info, warn};

use crate::config::ParserConfig;
use crate::error::TemplateError;
use crate::template::FormatTemplate;

pub const COMMENT_MARKER: &str = "//";

/// Used when a configuration names no templates at all.
const BUILTIN_TEMPLATES: [&str; 2] = ["[<GENRE>] - <ARTIST> - <TITLE>", "<ARTIST> - <TITLE>"];

#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: Vec<Arc<FormatTemplate>>,
    rejected: Vec<(usize, TemplateError)>,
}

impl TemplateLibrary {
    pub fn new(templates: Vec<FormatTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(Arc::new).collect(),
            rejected: Vec::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::from_lines(BUILTIN_TEMPLATES)
    }

    /// Parse the library text format.
    pub fn parse(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    /// Parse templates one per item. Line numbers in [`rejected`](Self::rejected) are 1-based.
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut library = Self::default();
        for (idx, raw) in lines.into_iter().enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.trim().is_empty() || line.trim_start().starts_with(COMMENT_MARKER) {
                continue;
            }
            match FormatTemplate::parse(line) {
                Ok(template) => library.templates.push(Arc::new(template)),
                Err(e) => {
                    warn!(target: "library", line = idx + 1, error = %e, "skipping invalid template");
                    library.rejected.push((idx + 1, e));
                }
            }
        }
        library
    }

    /// Load a library file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template library {}", path.display()))?;
        let library = Self::parse(&text);
        info!(
            target: "library",
            path = %path.display(),
            templates = library.len(),
            rejected = library.rejected.len(),
            "template library loaded"
        );
        Ok(library)
    }

    /// Write the library in canonical form.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_text())
            .with_context(|| format!("Failed to write template library {}", path.display()))?;
        info!(target: "library", path = %path.display(), templates = self.len(), "template library saved");
        Ok(())
    }

    /// Library assembled from `config`: the library file, then inline templates.
    /// Falls back to the built-in templates when neither names any.
    pub fn from_config(config: &ParserConfig) -> Result<Self> {
        let mut library = match &config.library_path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        library.extend(Self::from_lines(config.templates.iter().map(String::as_str)));
        if library.is_empty() && library.rejected.is_empty() {
            info!(target: "library", "no templates configured, using built-ins");
            return Ok(Self::builtin());
        }
        Ok(library)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for template in &self.templates {
            out.push_str(template.canonical());
            out.push('\n');
        }
        out
    }

    /// De-duplicated copy in collation order.
    pub fn sorted(&self) -> Self {
        let mut seen = FxHashSet::default();
        let mut templates: Vec<Arc<FormatTemplate>> = self
            .templates
            .iter()
            .filter(|t| seen.insert(t.canonical().to_string()))
            .cloned()
            .collect();
        templates.sort();
        Self {
            templates,
            rejected: self.rejected.clone(),
        }
    }

    pub fn push(&mut self, template: FormatTemplate) {
        self.templates.push(Arc::new(template));
    }

    pub fn extend(&mut self, other: TemplateLibrary) {
        self.templates.extend(other.templates);
        self.rejected.extend(other.rejected);
    }

    pub fn templates(&self) -> &[Arc<FormatTemplate>] {
        &self.templates
    }

    /// Lines that failed to parse, with their 1-based line number.
    pub fn rejected(&self) -> &[(usize, TemplateError)] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl PartialEq for TemplateLibrary {
    fn eq(&self, other: &Self) -> bool {
        self.templates == other.templates
    }
}

impl Eq for TemplateLibrary {}

impl FromIterator<FormatTemplate> for TemplateLibrary {
    fn from_iter<T: IntoIterator<Item = FormatTemplate>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
