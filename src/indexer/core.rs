//! End-to-end ingestion: extract → chunk → embed → upsert.
//!
//! Each document or page is ingested in isolation; a failure aborts only the
//! affected item, never a whole batch.

use std::path::Path;
use std::sync::Arc;

use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::models::NewChunk;
use crate::db::{Db, KbError};
use crate::embedder::{Embedder, EmbedderError};
use crate::indexer::chunker::{Chunker, ChunkerError};
use crate::indexer::extract::{self, ExtractError};
use crate::indexer::selectors::extract_selectors;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Chunk(#[from] ChunkerError),

    #[error(transparent)]
    Embed(#[from] EmbedderError),

    #[error(transparent)]
    Kb(#[from] KbError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a batch ingestion run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of a page ingestion.
#[derive(Debug)]
pub struct PageIngest {
    pub selector_count: usize,
    pub chunk_count: usize,
    pub warnings: Vec<String>,
}

pub struct Indexer<'a, E: Embedder + ?Sized> {
    db: Arc<TokioMutex<Db>>,
    embedder: &'a E,
    chunker: Chunker,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: &'a E,
        config: &Config,
    ) -> Result<Self, ChunkerError> {
        let chunker = Chunker::new(
            config.chunk_size,
            config.chunk_overlap,
            config.boundary_slack,
        )?;
        Ok(Self {
            db,
            embedder,
            chunker,
        })
    }

    /// Ingest one document into the knowledge base. Returns the chunk count.
    pub async fn ingest_document(
        &self,
        source_name: &str,
        content_type: &str,
        raw: &[u8],
    ) -> Result<usize, IngestError> {
        let text = extract::extract_text(content_type, raw)?;
        let chunks = self.chunker.split(&text)?;

        let text_refs: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&text_refs)?;

        let db_chunks: Vec<NewChunk<'_>> = chunks
            .iter()
            .map(|c| NewChunk {
                ordinal: c.ordinal,
                content: &c.text,
                span_start: c.span.start,
                span_end: c.span.end,
            })
            .collect();

        {
            let mut db = self.db.lock().await;
            db.insert_document(source_name, content_type, &text, &db_chunks, &vectors)?;
        }

        info!("Indexed {source_name} ({} chunks)", chunks.len());
        Ok(chunks.len())
    }

    /// Ingest the target page: extract and store its canonical selector set,
    /// and feed the page's structure/text into the chunk corpus so retrieval
    /// can cite it.
    pub async fn ingest_page(&self, page_id: &str, markup: &str) -> Result<PageIngest, IngestError> {
        let extracted = extract_selectors(page_id, markup);

        let embed_texts: Vec<String> = extracted
            .selectors
            .iter()
            .map(|s| format!("{} {} {}", s.name, s.kind, s.selector))
            .collect();
        let text_refs: Vec<&str> = embed_texts.iter().map(|s| s.as_str()).collect();
        let vectors = self.embedder.embed_batch(&text_refs)?;

        {
            let mut db = self.db.lock().await;
            db.upsert_page_selectors(page_id, &extracted.selectors, &vectors)?;
        }

        let chunk_count = match extract::extract_text("html", markup.as_bytes()) {
            Ok(text) => match self.chunk_page_text(page_id, &text).await {
                Ok(count) => count,
                Err(IngestError::Chunk(ChunkerError::EmptyInput)) => {
                    debug!("Page {page_id} has no indexable text");
                    0
                }
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e.into()),
        };

        info!(
            "Indexed page {page_id} ({} selectors, {} chunks)",
            extracted.selectors.len(),
            chunk_count
        );
        Ok(PageIngest {
            selector_count: extracted.selectors.len(),
            chunk_count,
            warnings: extracted.warnings,
        })
    }

    async fn chunk_page_text(&self, page_id: &str, text: &str) -> Result<usize, IngestError> {
        let chunks = self.chunker.split(text)?;
        let text_refs: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&text_refs)?;

        let db_chunks: Vec<NewChunk<'_>> = chunks
            .iter()
            .map(|c| NewChunk {
                ordinal: c.ordinal,
                content: &c.text,
                span_start: c.span.start,
                span_end: c.span.end,
            })
            .collect();

        let mut db = self.db.lock().await;
        db.insert_document(page_id, "html", text, &db_chunks, &vectors)?;
        Ok(chunks.len())
    }

    /// Ingest a file or directory tree. Directory walks respect .gitignore.
    /// Unsupported extensions are skipped; per-file failures are counted and
    /// logged without aborting the batch.
    pub async fn ingest_path<P: AsRef<Path>>(
        &self,
        path: P,
        show_progress: bool,
    ) -> IngestSummary {
        let path = path.as_ref();
        let mut summary = IngestSummary::default();

        let mut files: Vec<(std::path::PathBuf, &'static str)> = Vec::new();
        let walker = WalkBuilder::new(path).hidden(false).build();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            let entry_path = entry.path();
            if entry_path.is_dir() {
                continue;
            }
            match extract::content_type_for_path(entry_path) {
                Some(content_type) => files.push((entry_path.to_path_buf(), content_type)),
                None => summary.skipped += 1,
            }
        }

        let bar = if show_progress {
            let bar = ProgressBar::new(files.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            Some(bar)
        } else {
            None
        };

        for (file, content_type) in files {
            let source_name = file.to_string_lossy().replace('\\', "/");
            if let Some(bar) = &bar {
                bar.set_message(source_name.clone());
            }

            let result = match std::fs::read(&file) {
                Ok(raw) => self.ingest_document(&source_name, content_type, &raw).await,
                Err(source) => Err(IngestError::Io {
                    path: source_name.clone(),
                    source,
                }),
            };

            match result {
                Ok(_) => summary.ingested += 1,
                Err(e) => {
                    warn!("Failed to ingest {source_name}: {e}");
                    summary.failed += 1;
                }
            }

            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }

        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        summary
    }
}
