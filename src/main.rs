use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gec::dataset::{
    build_support_index, read_jsonl, split_checked, validate_items, write_jsonl,
    DEFAULT_BATCH_SIZE, DEFAULT_EVAL_FRACTION, DEFAULT_SPLIT_SEED,
};
use gec::eval::SentenceScores;
use gec::{CorrectionRequest, CorrectionService, DatasetItem, GecConfig, VectorIndex};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gec", version, about = "Retrieval-augmented grammatical error correction")]
struct Cli {
    /// Path to the YAML pipeline config. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a JSONL support set into the support index
    BuildIndex {
        /// Support set (JSONL)
        input: PathBuf,
        /// Output artifact; defaults to `support_index.path`
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Check that every line of a JSONL dataset normalizes
    Validate {
        input: PathBuf,
        /// Write the normalized items here
        #[arg(long)]
        normalized_out: Option<PathBuf>,
    },
    /// Split a JSONL dataset into disjoint support and eval sets
    Split {
        input: PathBuf,
        #[arg(long)]
        out_support: PathBuf,
        #[arg(long)]
        out_eval: PathBuf,
        #[arg(long, default_value_t = DEFAULT_EVAL_FRACTION)]
        eval_frac: f64,
        #[arg(long, default_value_t = DEFAULT_SPLIT_SEED)]
        seed: u64,
    },
    /// Report size, provenance and norm health of both indexes
    Inspect,
    /// Correct one sentence
    Correct {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Skip example retrieval
        #[arg(long)]
        no_retrieval: bool,
    },
    /// Score the pipeline against a JSONL eval set
    Eval {
        input: PathBuf,
        /// Stop after this many items
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gec=info,index=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GecConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::BuildIndex {
            input,
            out,
            batch_size,
        } => build_index(&config, &input, out, batch_size).await,
        Command::Validate {
            input,
            normalized_out,
        } => validate(&input, normalized_out.as_deref()),
        Command::Split {
            input,
            out_support,
            out_eval,
            eval_frac,
            seed,
        } => split(&input, &out_support, &out_eval, eval_frac, seed),
        Command::Inspect => inspect(&config),
        Command::Correct {
            text,
            top_k,
            no_retrieval,
        } => correct(&config, text, top_k, no_retrieval).await,
        Command::Eval { input, limit } => evaluate(&config, &input, limit).await,
    }
}

fn load_items(path: &Path) -> Result<Vec<DatasetItem>> {
    let raw = read_jsonl(path)?;
    let (items, errors) = validate_items(&raw);
    if !errors.is_empty() {
        for e in errors.iter().take(20) {
            eprintln!("ERR: {e}");
        }
        bail!(
            "{} of {} items in {} failed validation",
            errors.len(),
            raw.len(),
            path.display()
        );
    }
    Ok(items)
}

async fn build_index(
    config: &GecConfig,
    input: &Path,
    out: Option<PathBuf>,
    batch_size: usize,
) -> Result<()> {
    let out = out
        .or_else(|| config.support_index.path.clone())
        .context("no output path: pass --out or set support_index.path")?;
    let items = load_items(input)?;

    let embedder = semantic::build_embedder(&config.embedding)?;
    let index = VectorIndex::new(embedder, config.support_index.index_config());
    let rows = build_support_index(&index, &items, batch_size).await?;
    index.save(&out)?;
    println!("wrote {rows} entries to {}", out.display());
    Ok(())
}

fn validate(input: &Path, normalized_out: Option<&Path>) -> Result<()> {
    let raw = read_jsonl(input)?;
    let (items, errors) = validate_items(&raw);
    println!(
        "read {} items; normalized {}; errors {}",
        raw.len(),
        items.len(),
        errors.len()
    );
    for e in errors.iter().take(10) {
        println!("ERR: {e}");
    }
    if !errors.is_empty() {
        bail!("validation failed");
    }
    if let Some(first) = items.first() {
        println!("sample normalized item:\n{}", serde_json::to_string_pretty(first)?);
    }
    if let Some(out) = normalized_out {
        write_jsonl(&items, out)?;
        println!("wrote normalized items to {}", out.display());
    }
    Ok(())
}

fn split(input: &Path, out_support: &Path, out_eval: &Path, eval_frac: f64, seed: u64) -> Result<()> {
    if !(0.0..1.0).contains(&eval_frac) {
        bail!("--eval-frac must be within [0, 1)");
    }
    let items = load_items(input)?;
    let (support, eval) = split_checked(&items, eval_frac, seed)?;
    write_jsonl(&support, out_support)?;
    write_jsonl(&eval, out_eval)?;
    println!(
        "wrote {} support items to {} and {} eval items to {}",
        support.len(),
        out_support.display(),
        eval.len(),
        out_eval.display()
    );
    Ok(())
}

fn inspect(config: &GecConfig) -> Result<()> {
    let embedder = semantic::build_embedder(&config.embedding)?;
    let configured = embedder.model_name().to_string();
    println!("configured embedding model: {configured}");

    let stores = [
        ("support", config.support_index.path.as_deref(), config.support_index.index_config()),
        ("cache", config.cache.path.as_deref(), config.cache.index_config()),
    ];
    let mut dims = Vec::new();
    for (name, path, index_config) in stores {
        let Some(path) = path else {
            println!("{name}: in-memory only");
            continue;
        };
        if !path.exists() {
            println!("{name}: {} does not exist", path.display());
            continue;
        }
        let index = VectorIndex::new(Arc::clone(&embedder), index_config);
        index
            .load(path)
            .with_context(|| format!("failed to load {name} index"))?;
        let stats = index.stats();
        println!("{name}: {}", serde_json::to_string_pretty(&stats)?);
        if let Some(stored) = stats.provenance.get(index::PROVENANCE_EMBEDDING_MODEL) {
            if stored != &configured {
                println!("WARNING: {name} index built with '{stored}' but '{configured}' is configured");
            }
        }
        if stats.off_unit_rows > 0 {
            println!("WARNING: {name} index has {} rows off unit length", stats.off_unit_rows);
        }
        dims.extend(stats.dimension);
    }
    dims.dedup();
    if dims.len() > 1 {
        println!("WARNING: embedding dimensions differ across indexes: {dims:?}");
    }
    Ok(())
}

async fn correct(config: &GecConfig, text: String, top_k: Option<usize>, no_retrieval: bool) -> Result<()> {
    let service = CorrectionService::from_config(config)?;
    let mut request = CorrectionRequest::new(text);
    request.top_k = top_k;
    if no_retrieval {
        request.use_retrieval = Some(false);
    }
    let result = service.correct(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn evaluate(config: &GecConfig, input: &Path, limit: Option<usize>) -> Result<()> {
    let service = CorrectionService::from_config(config)?;
    let items = load_items(input)?;
    let mut scores = SentenceScores::default();
    let mut failures = 0usize;

    for item in items.iter().take(limit.unwrap_or(usize::MAX)) {
        match service.correct(CorrectionRequest::new(item.input.clone())).await {
            Ok(result) => scores.record(&item.input, &result.correction, &item.correction),
            Err(e) => {
                tracing::warn!(input = %item.input, error = %e, "correction failed");
                failures += 1;
                // leaving the sentence untouched
                scores.record(&item.input, &item.input, &item.correction);
            }
        }
    }

    let (precision, recall) = scores.precision_recall();
    let report = serde_json::json!({
        "sentences": scores.sentences,
        "failures": failures,
        "precision": precision,
        "recall": recall,
        "f0.5": scores.f05(),
        "exact_match": scores.accuracy(),
        "cache": service.metrics(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
