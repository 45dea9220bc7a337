use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use trackfmt::config::load as load_config;
use trackfmt::progress::{create_progress_bar, format_duration, log_progress, set_log_only};
use trackfmt::{
    Candidate, FieldKind, InMemoryOracle, OccurrenceOracle, ParserConfig, RankOptions,
    Ranker, ScoringContext, TemplateLibrary,
};

#[derive(Parser)]
#[command(name = "trackfmt")]
#[command(about = "Parse free-form track names against a library of format templates")]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Template library file (one template per line)
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    /// Maximum candidates per input (0 = all)
    #[arg(long, global = true)]
    limit: Option<i32>,

    /// Fields every template must declare (comma-separated, e.g. ARTIST,TITLE)
    #[arg(long, global = true, value_delimiter = ',')]
    required: Vec<FieldKind>,

    /// Fail instead of skipping templates that lack required fields
    #[arg(long, global = true)]
    strict: bool,

    /// Tokenizer to occurrence score ratio, N:M
    #[arg(long, global = true)]
    ratio: Option<String>,

    #[arg(long, global = true)]
    workers: Option<usize>,

    /// JSON occurrence history used as a scoring bonus
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[arg(long, global = true)]
    json: bool,

    /// Disable progress bars, log progress lines instead (for tail -f)
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rank each input and print its candidates
    Parse {
        #[arg(required = true)]
        inputs: Vec<String>,
    },
    /// Rank every line of a file, writing JSON lines
    Batch {
        file: PathBuf,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate the template library and print it sorted
    Check {
        /// Rewrite the library file sorted and de-duplicated
        #[arg(long)]
        write: bool,
    },
}

const LOG_INTERVAL: u64 = 10_000;

#[derive(Serialize)]
struct BatchRecord<'a> {
    input: &'a str,
    candidates: Vec<Candidate>,
}

const DEFAULT_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Install the subscriber before config loads so its own log lines are kept.
/// Returns a handle for applying the configured level when `RUST_LOG` is unset.
fn init_tracing() -> Option<FilterHandle> {
    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => {
            let fmt_layer = fmt::layer().with_writer(io::stderr).with_target(true);
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
            None
        }
        Err(_) => {
            let (filter, handle) = reload::Layer::new(EnvFilter::new(DEFAULT_LOG_LEVEL));
            let fmt_layer = fmt::layer().with_writer(io::stderr).with_target(true);
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
            Some(handle)
        }
    }
}

fn apply_log_level(handle: Option<&FilterHandle>, level: &str) -> Result<()> {
    let Some(handle) = handle else {
        return Ok(());
    };
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("Invalid log_level '{}'", level))?;
    handle.reload(filter).context("Failed to apply log level")
}

/// Loaded configuration with command-line overrides applied.
fn resolve_config(args: &Args) -> Result<ParserConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(path) = &args.templates {
        config.library_path = Some(path.clone());
    }
    if let Some(limit) = args.limit {
        config.limit = limit;
    }
    if !args.required.is_empty() {
        config.required_fields = args.required.clone();
    }
    if args.strict {
        config.strict_required = true;
    }
    if let Some(ratio) = &args.ratio {
        config.score_ratio = ratio.clone();
        config
            .weights()
            .with_context(|| format!("Invalid --ratio '{}'", ratio))?;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    Ok(config)
}

fn scoring_context(config: &ParserConfig, history: Option<&Path>) -> Result<ScoringContext> {
    let oracle = match history {
        Some(path) => Some(Arc::new(InMemoryOracle::load(path)?) as Arc<dyn OccurrenceOracle>),
        None => None,
    };
    Ok(ScoringContext::new(oracle, config.db_scoring, config.weights()?))
}

fn print_candidates(input: &str, candidates: Vec<Candidate>, json: bool) -> Result<()> {
    if json {
        let record = BatchRecord { input, candidates };
        println!("{}", serde_json::to_string(&record)?);
        return Ok(());
    }
    println!("{}", input);
    if candidates.is_empty() {
        println!("  (no candidates)");
    }
    for candidate in &candidates {
        println!(
            "  {:>5}  {}  {}",
            candidate.score,
            candidate.template,
            serde_json::to_string(&candidate.track)?
        );
    }
    Ok(())
}

fn run_parse(ranker: &Ranker, inputs: &[String], json: bool) -> Result<()> {
    for input in inputs {
        let candidates = ranker.rank(input)?;
        print_candidates(input, candidates, json)?;
    }
    Ok(())
}

fn run_batch(ranker: &Ranker, file: &Path, output: Option<&Path>) -> Result<()> {
    let start = Instant::now();
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read input file {}", file.display()))?;
    let inputs: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let total = inputs.len() as u64;
    info!(target: "batch", inputs = total, file = %file.display(), "ranking batch");

    let pb = create_progress_bar(total, "Ranking");
    let done = AtomicU64::new(0);
    let results: Vec<Result<BatchRecord>> = inputs
        .par_iter()
        .map(|&input| -> Result<BatchRecord> {
            let candidates = ranker.rank(input)?;
            pb.inc(1);
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            log_progress("Ranking", current, total, LOG_INTERVAL);
            Ok(BatchRecord { input, candidates })
        })
        .collect();
    pb.finish_with_message(format!("Ranked {} inputs", total));

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    let mut unparsed = 0usize;
    for result in results {
        let record = result?;
        if record.candidates.is_empty() {
            unparsed += 1;
        }
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush().context("Failed to flush batch output")?;

    info!(
        target: "batch",
        inputs = total,
        unparsed,
        elapsed = %format_duration(start.elapsed()),
        "batch complete"
    );
    Ok(())
}

fn run_check(config: &ParserConfig, library: &TemplateLibrary, write: bool) -> Result<()> {
    for (line, error) in library.rejected() {
        println!("line {}: {}", line, error);
    }
    let sorted = library.sorted();
    print!("{}", sorted.to_text());
    info!(
        target: "library",
        templates = library.len(),
        unique = sorted.len(),
        rejected = library.rejected().len(),
        "library checked"
    );

    if write {
        let Some(path) = &config.library_path else {
            bail!("--write needs a library file (--templates or library_path)");
        };
        sorted.save(path)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_handle = init_tracing();
    let mut config = resolve_config(&args)?;
    apply_log_level(log_handle.as_ref(), &config.log_level)?;
    set_log_only(args.log_only);

    let library = TemplateLibrary::from_config(&config)?;
    if let Command::Check { write } = args.command {
        return run_check(&config, &library, write);
    }

    // Batch parallelism runs on the global pool; a per-ranker pool would nest inside it
    let batch = matches!(args.command, Command::Batch { .. });
    if batch && config.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
        config.workers = 0;
    }

    let ctx = scoring_context(&config, args.history.as_deref())?;
    let ranker = Ranker::new(&library, ctx, RankOptions::from(&config))?;
    if library.is_empty() {
        warn!(target: "library", "template library is empty, nothing will parse");
    }

    match &args.command {
        Command::Parse { inputs } => run_parse(&ranker, inputs, args.json),
        Command::Batch { file, output } => run_batch(&ranker, file, output.as_deref()),
        Command::Check { .. } => Ok(()),
    }
}
