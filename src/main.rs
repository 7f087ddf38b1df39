use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use groundqa::config::Config;
use groundqa::db::Db;
use groundqa::db::models::RefKind;
use groundqa::db::search::SearchFilter;
use groundqa::embedder::Embedder;
use groundqa::embedder::mock::MockEmbedder;
use groundqa::embedder::remote::RemoteEmbedder;
use groundqa::generator::{GenerateRequest, GroundedGenerator};
use groundqa::indexer::core::Indexer;
use groundqa::llm::groq::GroqClient;
use groundqa::retriever::Retriever;
use groundqa::synthesizer;
use groundqa::testcase::TestCase;

#[derive(Parser)]
#[command(name = "groundqa", version, about = "Grounded QA test generation")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest requirement documents (files or directories)
    Index {
        paths: Vec<PathBuf>,
    },
    /// Ingest the target page markup and extract its selector set
    Page {
        /// Page identifier, e.g. checkout.html
        page_id: String,
        /// Path to the markup file
        file: PathBuf,
    },
    /// Search the knowledge base (debugging aid)
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Restrict to one kind: chunk | selector
        #[arg(long)]
        kind: Option<String>,
    },
    /// Generate a grounded test case for a feature query
    Generate {
        query: String,
        /// Target page id (must have been ingested with `page`)
        #[arg(long)]
        page: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Write the test case JSON here in addition to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Compile a generated test case into a Selenium script
    Script {
        /// Path to a test case JSON produced by `generate`
        test_case: PathBuf,
        /// Target page id the test case was generated for
        #[arg(long)]
        page: String,
        /// Write the script here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List indexed documents
    Docs,
    /// Delete one document (by source name) and/or one page's selectors
    Delete {
        /// Document source name to delete
        #[arg(long)]
        source: Option<String>,
        /// Page id whose selector set to delete
        #[arg(long)]
        page: Option<String>,
    },
    /// Show knowledge base statistics
    Stats,
    /// Clear the knowledge base
    Reset,
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match &config.embedding.endpoint {
        Some(endpoint) => {
            let embedder = RemoteEmbedder::new(
                endpoint,
                &config.model.name,
                config.model.dimensions,
                config.embedding.timeout_secs,
                config.embedding.max_retries,
            )?;
            Ok(Arc::new(embedder))
        }
        None => {
            warn!("No embedding endpoint configured, using the deterministic mock embedder");
            Ok(Arc::new(MockEmbedder::new(config.model.dimensions)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let db = Db::open(&config.db_path, config.model.dimensions)
        .context("Failed to open knowledge base")?;
    let db = Arc::new(TokioMutex::new(db));
    let embedder = build_embedder(&config)?;

    match cli.command {
        Command::Index { paths } => {
            if paths.is_empty() {
                anyhow::bail!("no paths given");
            }
            let indexer = Indexer::new(db.clone(), embedder.as_ref(), &config)?;
            let mut total = groundqa::indexer::core::IngestSummary::default();
            for path in paths {
                let summary = indexer.ingest_path(&path, true).await;
                total.ingested += summary.ingested;
                total.skipped += summary.skipped;
                total.failed += summary.failed;
            }
            info!(
                "Ingestion finished: {} indexed, {} skipped, {} failed",
                total.ingested, total.skipped, total.failed
            );
        }

        Command::Page { page_id, file } => {
            let markup = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let indexer = Indexer::new(db.clone(), embedder.as_ref(), &config)?;
            let result = indexer.ingest_page(&page_id, &markup).await?;
            for warning in &result.warnings {
                warn!("{warning}");
            }
            info!(
                "Page {page_id}: {} selectors, {} chunks",
                result.selector_count, result.chunk_count
            );
        }

        Command::Search { query, top_k, kind } => {
            let ref_kind = match kind.as_deref() {
                None => None,
                Some(s) => Some(
                    RefKind::parse(s)
                        .with_context(|| format!("unknown kind '{s}', expected chunk|selector"))?,
                ),
            };
            let retriever = Retriever::new(db, embedder);
            let results = retriever
                .retrieve(
                    &query,
                    top_k.unwrap_or(config.search_top_k),
                    SearchFilter {
                        ref_kind,
                        page_id: None,
                    },
                )
                .await?;
            for result in &results {
                println!(
                    "{:.4}  [{}]  ({})  {}",
                    result.similarity,
                    result.citation(),
                    result.origin,
                    result.content.chars().take(100).collect::<String>()
                );
            }
            if results.is_empty() {
                println!("(no results — is the knowledge base built?)");
            }
        }

        Command::Generate {
            query,
            page,
            top_k,
            out,
        } => {
            let llm = Arc::new(GroqClient::from_config(&config.llm)?);
            let generator = GroundedGenerator::new(db, embedder, llm);
            let request = GenerateRequest {
                feature_query: query,
                page_id: page,
                top_k: top_k.unwrap_or(config.search_top_k),
            };
            let test_case = generator.generate(&request).await?;

            let json = serde_json::to_string_pretty(&test_case)?;
            if let Some(out) = out {
                std::fs::write(&out, &json)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                info!("Wrote {} to {}", test_case.test_id, out.display());
            }
            println!("{json}");
        }

        Command::Script {
            test_case,
            page,
            out,
        } => {
            let json = std::fs::read_to_string(&test_case)
                .with_context(|| format!("failed to read {}", test_case.display()))?;
            let parsed: TestCase =
                serde_json::from_str(&json).context("test case file is not valid")?;

            let selectors = {
                let db = db.lock().await;
                db.selectors_for_page(&page)?
            };
            if selectors.is_empty() {
                anyhow::bail!("no selectors indexed for page '{page}'");
            }

            let artifact = synthesizer::synthesize(&parsed, &selectors)?;
            if let Some(out) = out {
                std::fs::write(&out, &artifact.source_text)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                info!(
                    "Wrote {} script for {} to {} ({} selectors)",
                    artifact.language,
                    artifact.test_id,
                    out.display(),
                    artifact.referenced_selectors.len()
                );
            } else {
                println!("{}", artifact.source_text);
            }
        }

        Command::Docs => {
            let db = db.lock().await;
            for doc in db.list_documents()? {
                println!(
                    "{}  {}  ({}, indexed {})",
                    doc.id, doc.source_name, doc.content_type, doc.indexed_at
                );
            }
        }

        Command::Delete { source, page } => {
            if source.is_none() && page.is_none() {
                anyhow::bail!("pass --source and/or --page");
            }
            let mut db = db.lock().await;
            if let Some(source) = source {
                if db.delete_document(&source)? {
                    info!("Deleted document {source}");
                } else {
                    warn!("No document named {source}");
                }
            }
            if let Some(page) = page {
                if db.delete_page(&page)? {
                    info!("Deleted selectors for page {page}");
                } else {
                    warn!("No selectors for page {page}");
                }
            }
        }

        Command::Stats => {
            let db = db.lock().await;
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Reset => {
            let mut db = db.lock().await;
            db.reset()?;
            info!("Knowledge base cleared");
        }
    }

    Ok(())
}
