mod eval;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_assistant_core::config::{DEFAULT_BASE_URL, DEFAULT_COMPLETION_MODEL, DEFAULT_EMBEDDING_MODEL};
use doc_assistant_core::store::{CHUNKS_FILE, MANIFEST_FILE, VECTORS_FILE};
use doc_assistant_core::{
    collect_pages, AnalysisOptions, CharacterNgramEmbedder, DocumentAnalyzer, EmbeddingProvider, IngestionOptions,
    Ingestor, LopdfLoader, OpenAiCompletions, OpenAiEmbeddings, PolicyGate, ProviderSettings, Retriever,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-assistant", version, about = "Retrieval-grounded document analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the persisted index.
    #[arg(long, global = true, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// API key for the completion and embedding endpoints.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, global = true, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, global = true, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    #[arg(long, global = true, env = "COMPLETION_MODEL", default_value = DEFAULT_COMPLETION_MODEL)]
    completion_model: String,

    /// Filter used when RUST_LOG is unset.
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Embed with the local character n-gram model instead of the API.
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load a PDF (or a folder of PDFs), chunk, embed and persist the index.
    Ingest {
        #[arg(long)]
        file: PathBuf,
        /// Document identifier; defaults to the file stem.
        #[arg(long)]
        doc_id: Option<String>,
    },
    /// Answer a query with a schema-validated JSON summary.
    Analyze {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Write the JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the built-in regular and adversarial cases.
    Eval {
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
}

impl Cli {
    fn provider_settings(&self) -> anyhow::Result<ProviderSettings> {
        let mut settings = ProviderSettings::new(self.api_key.clone(), &self.base_url)?;
        settings.embedding_model = self.embedding_model.clone();
        settings.completion_model = self.completion_model.clone();
        Ok(settings)
    }

    fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level).with_context(|| format!("invalid LOG_LEVEL {log_level:?}"))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        offline = cli.offline,
        "doc-assistant boot"
    );

    let settings = cli.provider_settings()?;
    if cli.offline {
        run(&cli, &settings, CharacterNgramEmbedder::default()).await
    } else {
        let embedder = OpenAiEmbeddings::new(&settings)?;
        run(&cli, &settings, embedder).await
    }
}

async fn run<E>(cli: &Cli, settings: &ProviderSettings, embedder: E) -> anyhow::Result<ExitCode>
where
    E: EmbeddingProvider,
{
    match &cli.command {
        Command::Ingest { file, doc_id } => {
            ingest(cli, settings, embedder, file, doc_id.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze { query, top_k, out } => {
            let analyzer = build_analyzer(cli, settings, embedder)?;
            let summary = analyzer.analyze(query, *top_k).await.context("analysis failed")?;
            let payload = serde_json::to_string_pretty(&summary)?;

            match out {
                Some(path) => {
                    tokio::fs::write(path, payload)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Saved: {}", path.display());
                }
                None => println!("{payload}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Eval { top_k } => {
            let analyzer = build_analyzer(cli, settings, embedder)?;
            let report = eval::run_all(&analyzer, *top_k).await;
            Ok(if report.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn ingest<E>(
    cli: &Cli,
    settings: &ProviderSettings,
    embedder: E,
    file: &Path,
    doc_id: Option<&str>,
) -> anyhow::Result<()>
where
    E: EmbeddingProvider,
{
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let collected = collect_pages(file, doc_id, &LopdfLoader)
        .with_context(|| format!("failed to read pdf text from {}", file.display()))?;
    if !collected.skipped_files.is_empty() {
        warn!(
            "skipped_files={} under {}",
            collected.skipped_files.len(),
            file.display()
        );
        for skipped in &collected.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
        }
    }

    let ingestor = Ingestor::new(embedder, IngestionOptions::default(), settings.max_retries)?;
    let index_dir = cli.index_dir();
    let manifest = ingestor
        .ingest(&collected.pages, &index_dir)
        .await
        .context("ingestion failed")?;

    let label = match doc_id {
        Some(doc_id) => doc_id.to_string(),
        None => file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string()),
    };
    println!("doc_id={label} chunks={}", manifest.chunk_count);
    for artifact in [CHUNKS_FILE, VECTORS_FILE, MANIFEST_FILE] {
        println!("Saved: {}", index_dir.join(artifact).display());
    }
    Ok(())
}

fn build_analyzer<E>(
    cli: &Cli,
    settings: &ProviderSettings,
    embedder: E,
) -> anyhow::Result<DocumentAnalyzer<Retriever<E>, OpenAiCompletions>>
where
    E: EmbeddingProvider,
{
    let index_dir = cli.index_dir();
    let retriever = Retriever::open(&index_dir, embedder)
        .with_context(|| format!("cannot open the index in {}", index_dir.display()))?
        .with_max_retries(settings.max_retries);
    let completions = OpenAiCompletions::new(settings)?;
    let policy = PolicyGate::with_default_rules().context("default policy rules failed to compile")?;
    Ok(DocumentAnalyzer::new(policy, retriever, completions, AnalysisOptions::default()))
}
