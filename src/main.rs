//! CLI entry point for the job matcher.
//!
//! Commands: `init`, `config`, `embed` (corpus to vector table), `build`
//! (vector table to published index), `match` (résumé to ranked postings)
//! and `info`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use jobmatch::display::{THEME, create_progress_bar, with_spinner};
use jobmatch::io::ExitCode;
use jobmatch::matching::stored_metadata;
use jobmatch::{
    EmbeddingGenerator, EngineError, EngineResult, FastEmbedGenerator, FsBlobStore,
    InMemoryRecordStore, MatchEngine, MatchResult, RecordStore, Settings, StorageError,
    VectorError, VectorStore, extract_text,
};

/// Corpus copy kept next to the vectors so `match` can resolve records.
const RECORDS_FILE_NAME: &str = "records.json";

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic résumé to job-posting matcher
#[derive(Parser)]
#[command(
    name = "jobmatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Match a résumé against job postings by semantic similarity",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ jobmatch init\n  $ jobmatch embed jobs.json\n  $ jobmatch build\n  $ jobmatch match resume.txt --top-k 5"
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Set up .jobmatch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    #[command(about = "Display active settings")]
    Config,

    #[command(about = "Embed job descriptions from a JSON corpus into the vector table")]
    Embed {
        /// JSON array of {id, title, company, description}
        records: PathBuf,
    },

    #[command(about = "Build and publish the search index from the vector table")]
    Build,

    #[command(about = "Rank job postings against a plain-text résumé")]
    Match {
        /// Plain-text résumé
        resume: PathBuf,

        /// Number of results (overrides config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Clusters probed per query (overrides config)
        #[arg(long)]
        nprobe: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    #[command(about = "Show metadata of the published index")]
    Info {
        /// Output metadata as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            return report(&EngineError::Config {
                reason: format!("{e:#}"),
            });
        }
    };

    init_tracing(cli.debug || settings.debug);

    let outcome = match cli.command {
        Commands::Init { force } => return init(force).into(),
        Commands::Config => return show_config(&settings).into(),
        Commands::Embed { records } => embed(&settings, &records),
        Commands::Build => build(&settings),
        Commands::Match {
            resume,
            top_k,
            nprobe,
            json,
        } => run_match(&settings, &resume, top_k, nprobe, json),
        Commands::Info { json } => info(&settings, json),
    };

    match outcome {
        Ok(code) => code.into(),
        Err(e) => report(&e),
    }
}

fn report(error: &EngineError) -> std::process::ExitCode {
    eprintln!("{}", THEME.error_with_icon(&error.to_string()));
    for suggestion in error.recovery_suggestions() {
        eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
    }
    ExitCode::from_error(error).into()
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Settings::load().context("Failed to load configuration"),
    }
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn init(force: bool) -> ExitCode {
    match Settings::init_config_file(force) {
        Ok(path) => {
            println!(
                "{}",
                THEME.success_with_icon(&format!("Created configuration file at: {}", path.display()))
            );
            println!("Edit this file to customize your settings.");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&e.to_string()));
            ExitCode::ConfigError
        }
    }
}

fn show_config(settings: &Settings) -> ExitCode {
    println!("{}", THEME.apply(&THEME.title, "Current Configuration:"));
    println!("{}", "=".repeat(50));
    match toml::to_string_pretty(settings) {
        Ok(toml_str) => {
            println!("{toml_str}");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error displaying config: {e}");
            ExitCode::ConfigError
        }
    }
}

fn load_embedder(settings: &Settings) -> EngineResult<Arc<FastEmbedGenerator>> {
    let model = &settings.embedding.model;
    let generator = with_spinner(&format!("Loading embedding model {model}"), || {
        FastEmbedGenerator::new(model, settings.embedding.cache_dir.as_deref(), false)
    })?;
    Ok(Arc::new(generator))
}

fn open_engine(
    settings: &Settings,
    records: Arc<dyn RecordStore>,
) -> EngineResult<(MatchEngine, Arc<FastEmbedGenerator>)> {
    let embedder = load_embedder(settings)?;
    let blobs = Arc::new(FsBlobStore::new(settings.index_path())?);
    let engine = MatchEngine::new(
        embedder.clone(),
        records,
        blobs,
        settings.engine_config(),
    );
    Ok((engine, embedder))
}

fn embed(settings: &Settings, records_path: &Path) -> EngineResult<ExitCode> {
    let corpus = InMemoryRecordStore::load_json(records_path)?;
    let records = corpus.all();
    let data_path = settings.data_path();

    let (engine, embedder) = open_engine(settings, Arc::new(corpus))?;
    let mut store = VectorStore::open_or_create(&data_path, embedder.dimension())?;

    let started = Instant::now();
    let progress = create_progress_bar(records.len() as u64, "Embedding job descriptions");
    let embedded = engine.embed_records(&records, &mut store, Some(&progress))?;
    progress.finish_and_clear();

    std::fs::create_dir_all(&data_path).map_err(StorageError::from)?;
    let json = serde_json::to_vec_pretty(&records)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    std::fs::write(data_path.join(RECORDS_FILE_NAME), json)
        .map_err(StorageError::from)?;

    println!(
        "{}",
        THEME.success_with_icon(&format!(
            "Embedded {embedded} of {} records in {:.1}s",
            records.len(),
            started.elapsed().as_secs_f64()
        ))
    );
    Ok(ExitCode::Success)
}

fn load_records(settings: &Settings) -> EngineResult<InMemoryRecordStore> {
    let path = settings.data_path().join(RECORDS_FILE_NAME);
    if !path.exists() {
        tracing::warn!(
            "No record corpus at {}; matches will have no titles",
            path.display()
        );
        return Ok(InMemoryRecordStore::new());
    }
    Ok(InMemoryRecordStore::load_json(&path)?)
}

fn build(settings: &Settings) -> EngineResult<ExitCode> {
    let mut store = VectorStore::open(settings.data_path())?;
    let (engine, embedder) = open_engine(settings, Arc::new(load_records(settings)?))?;

    if store.dimension() != embedder.dimension() {
        return Err(VectorError::DimensionMismatch {
            expected: embedder.dimension().get(),
            actual: store.dimension().get(),
        }
        .into());
    }

    let started = Instant::now();
    let published = engine.rebuild_from_store(&mut store)?;
    let metadata = &published.metadata;

    println!(
        "{}",
        THEME.success_with_icon(&format!(
            "Built index '{}' with {} vectors in {} clusters ({:.1}s)",
            metadata.name,
            metadata.vector_count,
            metadata.cluster_count,
            started.elapsed().as_secs_f64()
        ))
    );
    Ok(ExitCode::Success)
}

fn run_match(
    settings: &Settings,
    resume: &Path,
    top_k: Option<usize>,
    nprobe: Option<usize>,
    json: bool,
) -> EngineResult<ExitCode> {
    let text = extract_text(resume)?.ok_or_else(|| EngineError::EmptyDocument {
        path: resume.to_path_buf(),
    })?;

    let (engine, _) = open_engine(settings, Arc::new(load_records(settings)?))?;
    if !engine.load()? {
        tracing::warn!(
            "Index '{}' has not been built yet; run 'jobmatch build'",
            settings.index.name
        );
    }

    let top_k = top_k.unwrap_or(settings.matching.top_k);
    let results = engine.match_text_with_nprobe(&text, top_k, nprobe)?;

    if json {
        let output = serde_json::to_string_pretty(&results)
            .map_err(|e| EngineError::General(format!("Failed to encode results: {e}")))?;
        println!("{output}");
    } else {
        print_matches(&results);
    }

    Ok(ExitCode::from_matches(&results))
}

fn print_matches(results: &[MatchResult]) {
    if results.is_empty() {
        println!("{}", THEME.warning_with_icon("No matching jobs found"));
        return;
    }

    for (rank, result) in results.iter().enumerate() {
        let heading = if result.company.is_empty() {
            result.title.clone()
        } else {
            format!("{} at {}", result.title, result.company)
        };
        println!(
            "{}. {} {}",
            rank + 1,
            THEME.apply(&THEME.title, heading),
            THEME.apply(&THEME.dim, format!("[{}]", result.record_id))
        );
        println!("   Similarity: {}", THEME.similarity(result.similarity));
        if let Some(excerpt) = &result.excerpt {
            println!("   {excerpt}");
        }
        println!();
    }
}

fn info(settings: &Settings, json: bool) -> EngineResult<ExitCode> {
    let blobs = FsBlobStore::new(settings.index_path())?;
    let name = &settings.index.name;
    let Some(metadata) = stored_metadata(&blobs, name)? else {
        return Err(VectorError::IndexNotFound { name: name.clone() }.into());
    };

    if json {
        let output = serde_json::to_string_pretty(&metadata)
            .map_err(|e| EngineError::General(format!("Failed to encode metadata: {e}")))?;
        println!("{output}");
        return Ok(ExitCode::Success);
    }

    let created = metadata
        .created_at_utc()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let quantization = if metadata.quantized {
        format!("product ({} x {} bits)", metadata.subvectors, metadata.bits)
    } else {
        "flat".to_string()
    };

    println!("{}", THEME.apply(&THEME.title, format!("Index '{}'", metadata.name)));
    println!("{}", THEME.field("Vectors", metadata.vector_count));
    println!("{}", THEME.field("Dimension", metadata.dimension));
    println!("{}", THEME.field("Clusters", metadata.cluster_count));
    println!("{}", THEME.field("Probe", metadata.nprobe));
    println!("{}", THEME.field("Quantization", quantization));
    println!("{}", THEME.field("Model", &metadata.model));
    println!("{}", THEME.field("Created", created));
    Ok(ExitCode::Success)
}
