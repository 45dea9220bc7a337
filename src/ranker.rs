//! Candidate ranking.
//!
//! Evaluates one input against every template of a library and returns the best
//! interpretations first. Templates are independent, so evaluation fans out over
//! rayon; the result order never depends on completion order.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::config::ParserConfig;
use crate::error::RankError;
use crate::field::FieldKind;
use crate::library::TemplateLibrary;
use crate::normalize::normalize_input;
use crate::scoring::ScoringContext;
use crate::sink::{ParsedTrack, TrackSink};
use crate::template::FormatTemplate;
use crate::tokenizer::Tokenizer;

// ============================================================================
// Candidate
// ============================================================================

/// One template's interpretation of one input.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate<S = ParsedTrack> {
    #[serde(serialize_with = "serialize_template")]
    pub template: Arc<FormatTemplate>,
    pub track: S,
    pub score: i32,
}

fn serialize_template<Z: Serializer>(template: &Arc<FormatTemplate>, serializer: Z) -> Result<Z::Ok, Z::Error> {
    serializer.serialize_str(template.canonical())
}

/// Best score first; ties go to the template that collates first.
fn by_rank<S>(a: &Candidate<S>, b: &Candidate<S>) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.template.cmp(&b.template))
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone)]
pub struct RankOptions {
    /// 0 or negative means unbounded.
    pub limit: i32,
    pub required: Vec<FieldKind>,
    pub strict_required: bool,
    pub filter_negatives: bool,
    pub parallel: bool,
    /// 0 uses the global rayon pool.
    pub workers: usize,
    pub timeout: Option<Duration>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self::from(&ParserConfig::default())
    }
}

impl From<&ParserConfig> for RankOptions {
    fn from(config: &ParserConfig) -> Self {
        Self {
            limit: config.limit,
            required: config.required_fields.clone(),
            strict_required: config.strict_required,
            filter_negatives: config.filter_negatives,
            parallel: config.parallel,
            workers: config.workers,
            timeout: config.timeout(),
        }
    }
}

// ============================================================================
// Ranker
// ============================================================================

#[derive(Debug)]
pub struct Ranker {
    /// Templates that declare every required field.
    eligible: Vec<Arc<FormatTemplate>>,
    /// Templates missing required fields, with what they miss.
    violations: Vec<(Arc<FormatTemplate>, Vec<FieldKind>)>,
    ctx: ScoringContext,
    options: RankOptions,
    pool: Option<rayon::ThreadPool>,
}

impl Ranker {
    pub fn new(library: &TemplateLibrary, ctx: ScoringContext, options: RankOptions) -> Result<Self, RankError> {
        let mut eligible = Vec::with_capacity(library.len());
        let mut violations = Vec::new();
        for template in library.templates() {
            let missing = template.missing_required(&options.required);
            if missing.is_empty() {
                eligible.push(Arc::clone(template));
            } else {
                if !options.strict_required {
                    warn!(
                        target: "ranker",
                        template = %template,
                        missing = ?missing,
                        "template lacks required fields, excluded"
                    );
                }
                violations.push((Arc::clone(template), missing));
            }
        }

        let pool = if options.parallel && options.workers > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(options.workers)
                    .thread_name(|i| format!("trackfmt-rank-{i}"))
                    .build()?,
            )
        } else {
            None
        };

        Ok(Self {
            eligible,
            violations,
            ctx,
            options,
            pool,
        })
    }

    /// Ranker over `library` configured from `config`.
    pub fn from_config(
        library: &TemplateLibrary,
        ctx: ScoringContext,
        config: &ParserConfig,
    ) -> Result<Self, RankError> {
        Self::new(library, ctx, RankOptions::from(config))
    }

    pub fn options(&self) -> &RankOptions {
        &self.options
    }

    pub fn context(&self) -> &ScoringContext {
        &self.ctx
    }

    pub fn violations(&self) -> &[(Arc<FormatTemplate>, Vec<FieldKind>)] {
        &self.violations
    }

    /// Rank `input` into fresh [`ParsedTrack`]s.
    pub fn rank(&self, input: &str) -> Result<Vec<Candidate>, RankError> {
        self.rank_from(input, &ParsedTrack::default())
    }

    /// Rank `input`; every candidate's sink starts as a clone of `base`.
    pub fn rank_from<S>(&self, input: &str, base: &S) -> Result<Vec<Candidate<S>>, RankError>
    where
        S: TrackSink + Clone + Send + Sync,
    {
        if self.options.strict_required && !self.violations.is_empty() {
            return Err(RankError::MissingRequiredFields(
                self.violations
                    .iter()
                    .map(|(t, missing)| {
                        let names: Vec<&str> = missing.iter().map(|k| k.name()).collect();
                        format!("{} (missing {})", t, names.join(", "))
                    })
                    .collect(),
            ));
        }

        let input = normalize_input(input);
        let deadline = self.options.timeout.map(|t| Instant::now() + t);
        let skipped = AtomicUsize::new(0);

        let evaluate = |template: &Arc<FormatTemplate>| -> Option<Candidate<S>> {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                skipped.fetch_add(1, AtomicOrdering::Relaxed);
                return None;
            }
            self.evaluate(template, &input, base)
        };

        let mut candidates: Vec<Candidate<S>> = if !self.options.parallel {
            self.eligible.iter().filter_map(&evaluate).collect()
        } else if let Some(pool) = &self.pool {
            pool.install(|| self.eligible.par_iter().filter_map(&evaluate).collect())
        } else {
            self.eligible.par_iter().filter_map(&evaluate).collect()
        };

        let skipped = skipped.into_inner();
        if skipped > 0 {
            warn!(
                target: "ranker",
                input = %input,
                skipped,
                "deadline reached, returning partial ranking"
            );
        }

        if self.options.filter_negatives {
            candidates.retain(|c| c.score >= 0);
        }
        candidates.sort_by(by_rank);
        if self.options.limit > 0 {
            candidates.truncate(self.options.limit as usize);
        }
        Ok(candidates)
    }

    /// Best candidate, if any.
    pub fn best(&self, input: &str) -> Result<Option<Candidate>, RankError> {
        Ok(self.rank(input)?.into_iter().next())
    }

    fn evaluate<S>(&self, template: &Arc<FormatTemplate>, input: &str, base: &S) -> Option<Candidate<S>>
    where
        S: TrackSink + Clone,
    {
        let outcome = Tokenizer::new(&self.ctx)
            .tokenize(template, input)
            .and_then(|tokens| {
                let mut track = base.clone();
                tokens.assign_to(&mut track)?;
                Ok((tokens, track))
            });

        match outcome {
            Ok((tokens, track)) => {
                let score = self.ctx.final_score(tokens.score(), template.canonical());
                debug!(target: "ranker", input, template = %template, score, "[ok] parsed");
                Some(Candidate {
                    template: Arc::clone(template),
                    track,
                    score,
                })
            }
            Err(reason) => {
                debug!(target: "ranker", input, template = %template, %reason, "[not ok] parsed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{InMemoryOracle, OccurrenceOracle};
    use crate::scoring::ScoreWeights;

    fn library(lines: &[&str]) -> TemplateLibrary {
        TemplateLibrary::from_lines(lines.iter().copied())
    }

    fn ranker(lines: &[&str], options: RankOptions) -> Ranker {
        Ranker::new(&library(lines), ScoringContext::default(), options).unwrap()
    }

    fn canon(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.template.canonical()).collect()
    }

    #[test]
    fn test_rank_sorts_by_score_then_template() {
        let r = ranker(
            &["<IGNORE> - <TITLES>", "<ARTIST> - <TITLE>", "<ARTIST> - <TITLES>"],
            RankOptions {
                limit: 0,
                ..RankOptions::default()
            },
        );
        let candidates = r.rank("Artist - Title").unwrap();
        assert_eq!(
            canon(&candidates),
            vec!["<ARTIST> - <TITLES>", "<ARTIST> - <TITLE>", "<IGNORE> - <TITLES>"]
        );
        assert_eq!(candidates.iter().map(|c| c.score).collect::<Vec<_>>(), vec![9, 6, 6]);
    }

    #[test]
    fn test_input_normalized_once() {
        let r = ranker(&["<ARTIST> - <TITLE>"], RankOptions::default());
        let best = r.best("Artist  ï¿½  Title").unwrap().unwrap();
        assert_eq!(best.track.main_artists, vec!["Artist"]);
        assert_eq!(best.track.title.as_deref(), Some("Title"));
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let r = ranker(&["<ARTIST> - <TITLE> (<IGNORE>)"], RankOptions::default());
        assert!(r.rank("nothing to see").unwrap().is_empty());
        assert!(r.best("nothing to see").unwrap().is_none());
    }

    #[test]
    fn test_required_fields_excluded_when_lenient() {
        let r = ranker(
            &["<ARTIST> - <TITLE>", "<IGNORE> - <TITLE>"],
            RankOptions {
                required: vec![FieldKind::Artist],
                ..RankOptions::default()
            },
        );
        assert_eq!(r.violations().len(), 1);
        assert_eq!(canon(&r.rank("a - b").unwrap()), vec!["<ARTIST> - <TITLE>"]);
    }

    #[test]
    fn test_required_fields_fail_when_strict() {
        let r = ranker(
            &["<ARTIST> - <TITLE>", "<IGNORE> - <TITLE>"],
            RankOptions {
                required: vec![FieldKind::Artist],
                strict_required: true,
                ..RankOptions::default()
            },
        );
        match r.rank("a - b") {
            Err(RankError::MissingRequiredFields(list)) => {
                assert_eq!(list, vec!["<IGNORE> - <TITLE> (missing ARTIST)".to_string()]);
            }
            other => panic!("expected strict failure, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_negatives() {
        let lines = ["<ARTIST> - <TITLE>", "<TITLE>"];
        let input = "Some - Thing - Else";
        let keep = ranker(&lines, RankOptions::default());
        assert!(keep.rank(input).unwrap().iter().any(|c| c.score < 0));

        let drop = ranker(
            &lines,
            RankOptions {
                filter_negatives: true,
                ..RankOptions::default()
            },
        );
        assert!(drop.rank(input).unwrap().iter().all(|c| c.score >= 0));
    }

    #[test]
    fn test_dedicated_pool_matches_sequential() {
        let lines = [
            "<ARTIST> - <TITLE>",
            "<ARTIST> - <TITLES>",
            "<ARTIST_EXTRA> - <TITLES>",
            "<ALBUM> - <TITLE>",
            "<IGNORE> - <TITLES>",
        ];
        let sequential = ranker(
            &lines,
            RankOptions {
                parallel: false,
                limit: 0,
                ..RankOptions::default()
            },
        );
        let pooled = ranker(
            &lines,
            RankOptions {
                workers: 3,
                limit: 0,
                ..RankOptions::default()
            },
        );
        let a = serde_json::to_string(&sequential.rank("Artist - Title").unwrap()).unwrap();
        let b = serde_json::to_string(&pooled.rank("Artist - Title").unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_timeout_returns_partial() {
        let r = ranker(
            &["<ARTIST> - <TITLE>", "<ALBUM> - <TITLE>"],
            RankOptions {
                timeout: Some(Duration::ZERO),
                ..RankOptions::default()
            },
        );
        assert!(r.rank("a - b").unwrap().is_empty());
    }

    #[test]
    fn test_oracle_blends_template_score() {
        let mut oracle = InMemoryOracle::default();
        oracle.record_template("<ALBUM> - <TITLE>", 10);
        let oracle: Arc<dyn OccurrenceOracle> = Arc::new(oracle);
        let ctx = ScoringContext::new(Some(oracle), true, ScoreWeights::default());
        let r = Ranker::new(
            &library(&["<ARTIST> - <TITLE>", "<ALBUM> - <TITLE>"]),
            ctx,
            RankOptions::default(),
        )
        .unwrap();
        let candidates = r.rank("a - b").unwrap();
        assert_eq!(canon(&candidates), vec!["<ALBUM> - <TITLE>", "<ARTIST> - <TITLE>"]);
        assert_eq!(candidates[0].score, 16);
    }

    #[test]
    fn test_oracle_artist_bonus() {
        let mut oracle = InMemoryOracle::default();
        oracle.record(FieldKind::Artist, "Known Artist", 5);
        let ctx = ScoringContext::with_oracle(Arc::new(oracle));
        let r = Ranker::new(
            &library(&["<ARTIST> - <TITLE>", "<TITLE> - <ARTIST>"]),
            ctx,
            RankOptions::default(),
        )
        .unwrap();
        let best = r.best("Known Artist - Song").unwrap().unwrap();
        assert_eq!(best.template.canonical(), "<ARTIST> - <TITLE>");
        assert_eq!(best.score, 3 + 5 + 3);
    }

    #[test]
    fn test_rank_from_keeps_base_values() {
        let r = ranker(&["<ARTIST> - <TITLE>"], RankOptions::default());
        let base = ParsedTrack {
            genres: vec!["Rock".to_string()],
            ..ParsedTrack::default()
        };
        let best = r.rank_from("a - b", &base).unwrap().remove(0);
        assert_eq!(best.track.genres, vec!["Rock"]);
        assert_eq!(best.track.main_artists, vec!["a"]);
    }

    #[test]
    fn test_candidate_serializes_canonical_template() {
        let r = ranker(&["<ARTIST> - <TITLE>"], RankOptions::default());
        let json = serde_json::to_value(r.rank("a - b").unwrap()).unwrap();
        assert_eq!(json[0]["template"], "<ARTIST> - <TITLE>");
        assert_eq!(json[0]["score"], 6);
        assert_eq!(json[0]["track"]["title"], "B");
    }
}
