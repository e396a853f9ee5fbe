use anyhow::Context;
use clap::{Parser, Subcommand};
use datapipe_embed::{EmbeddingProvider, FastEmbedProvider, HashingProvider};
use datapipe_ingest::{
    IngestPipeline, LoadHints, LoaderRegistry, SqliteTextStore, TextStore, VectorIndexManager,
    WhisperHttpTranscriber,
    config::{PipelineConfig, ProviderKind},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Ingest documents, spreadsheets, audio and markup into a searchable text index.
#[derive(Parser, Debug)]
#[command(name = "datapipe", author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (defaults to ./datapipe.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the data directories and the database schema
    Init,
    /// Load every file under a directory, then vectorize pending texts
    Ingest {
        /// Directory containing input files
        #[arg(long)]
        input_dir: PathBuf,
        /// Column holding the text in CSV and Excel files
        #[arg(long)]
        text_column: Option<String>,
        /// Field names to collect from JSON files
        #[arg(long, num_args = 1..)]
        text_fields: Vec<String>,
        /// Tag names to collect from XML and HTML files
        #[arg(long, num_args = 1..)]
        text_tags: Vec<String>,
    },
    /// Find the stored texts closest to a query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short, default_value_t = 5)]
        k: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show store and index statistics
    Stats,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct SearchOutput {
    rank: usize,
    distance: f32,
    text_id: Option<String>,
    source_file: Option<String>,
    content: Option<String>,
}

/// Failure before any input is touched: bad configuration, unreachable
/// database or model. Reported with exit code 2.
#[derive(Debug, thiserror::Error)]
#[error("{0:#}")]
struct StartupError(anyhow::Error);

fn startup<T>(result: anyhow::Result<T>) -> anyhow::Result<T> {
    result.map_err(|e| StartupError(e).into())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            process::exit(if e.is::<StartupError>() { 2 } else { 1 });
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<PipelineConfig> {
    let config = PipelineConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &PipelineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

async fn open_store(config: &PipelineConfig) -> anyhow::Result<SqliteTextStore> {
    let db_path = config.database_path();
    SqliteTextStore::open(
        &db_path,
        Duration::from_secs(config.storage.busy_timeout_secs),
    )
    .await
    .with_context(|| format!("opening database {}", db_path.display()))
}

async fn build_provider(config: &PipelineConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
        ProviderKind::Hashing => Arc::new(HashingProvider::new(config.embedding.dimension)),
        ProviderKind::Fastembed => Arc::new(
            FastEmbedProvider::create(config.embed_config())
                .await
                .context("initializing embedding model")?,
        ),
    };
    tracing::info!(
        "Using {} embeddings with dimension {}",
        provider.provider_name(),
        provider.embedding_dimension()
    );
    Ok(provider)
}

async fn build_pipeline(config: &PipelineConfig) -> anyhow::Result<IngestPipeline> {
    let store = Arc::new(open_store(config).await?);
    let transcriber = Arc::new(WhisperHttpTranscriber::new(&config.transcription)?);
    let registry = LoaderRegistry::with_defaults(transcriber, Some(config.transcripts_dir()));
    let provider = build_provider(config).await?;
    let index = VectorIndexManager::open(provider, config.index_path())
        .context("loading vector index")?;
    Ok(IngestPipeline::new(store, registry, index).with_progress(config.show_progress))
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let config = startup(load_config(args.config.as_deref()))?;
    init_tracing(&config);
    startup(config.ensure_directories())?;

    match args.command {
        Commands::Init => {
            let store = startup(open_store(&config).await)?;
            store.close().await;
            println!("Initialized data directory at {}", config.data_dir.display());
            println!("Database location: {}", config.database_path().display());
            Ok(0)
        }
        Commands::Ingest {
            input_dir,
            text_column,
            text_fields,
            text_tags,
        } => {
            if !input_dir.is_dir() {
                return Err(StartupError(anyhow::anyhow!(
                    "input directory {} does not exist",
                    input_dir.display()
                ))
                .into());
            }
            let mut pipeline = startup(build_pipeline(&config).await)?;
            let hints = LoadHints {
                text_column,
                text_fields,
                text_tags,
            };

            let summary = pipeline.run(&input_dir, &hints).await?;

            println!(
                "\nProcessed {} files successfully",
                summary.ingest.success_count()
            );
            if summary.ingest.failure_count() > 0 {
                println!("Failed to process {} files:", summary.ingest.failure_count());
                for outcome in summary.ingest.failed() {
                    if let Err(e) = &outcome.result {
                        println!("  {}: {}", outcome.path.display(), e);
                    }
                }
            }
            println!("Records created: {}", summary.ingest.records_created());

            let vectorize = &summary.vectorize;
            println!(
                "Vectorized {} of {} pending texts ({} failed), index size {}",
                vectorize.processed,
                vectorize.pending,
                vectorize.failures.len(),
                vectorize.index_size
            );
            Ok(summary.exit_code())
        }
        Commands::Search { query, k, format } => {
            let pipeline = startup(build_pipeline(&config).await)?;
            let hits = pipeline.search(&query, k).await?;

            let mut results = Vec::with_capacity(hits.len());
            for (rank, hit) in hits.into_iter().enumerate() {
                let record = match &hit.text_id {
                    Some(id) => pipeline.store().get_text(id).await?,
                    None => None,
                };
                results.push(SearchOutput {
                    rank: rank + 1,
                    distance: hit.distance,
                    text_id: hit.text_id,
                    source_file: record.as_ref().map(|r| r.source_file.clone()),
                    content: record.map(|r| r.content),
                });
            }

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} results:", results.len());
                    for result in results {
                        let preview: String = result
                            .content
                            .as_deref()
                            .unwrap_or("<unknown text>")
                            .chars()
                            .take(100)
                            .collect();
                        println!(
                            "  #{} | Distance: {:.4} | File: {} | {}",
                            result.rank,
                            result.distance,
                            result.source_file.as_deref().unwrap_or("?"),
                            preview.replace('\n', " ")
                        );
                    }
                }
            }
            Ok(0)
        }
        Commands::Stats => {
            let store = startup(open_store(&config).await)?;
            let stats = store.stats().await?;
            println!("Database Statistics:");
            println!("  Total texts: {}", stats.total_texts);
            println!("  Pending texts: {}", stats.pending_texts);
            println!("  Embeddings: {}", stats.embeddings);
            println!("  Source files: {}", stats.source_files);
            println!("  Index snapshot: {}", config.index_path().display());
            Ok(0)
        }
    }
}
