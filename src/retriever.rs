//! Semantic retrieval over the knowledge base.
//!
//! Embeds a free-text query and returns the top-K ranked knowledge fragments
//! (document chunks and/or selector descriptors). An empty index yields an
//! empty result, not an error — callers decide whether that is fatal.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

use crate::db::search::{SearchFilter, SearchResult};
use crate::db::{Db, KbError};
use crate::embedder::{Embedder, EmbedderError};

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error(transparent)]
    Embed(#[from] EmbedderError),

    #[error(transparent)]
    Kb(#[from] KbError),
}

pub struct Retriever {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    #[must_use]
    pub fn new(db: Arc<TokioMutex<Db>>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    /// Retrieve the top-K fragments for a query. Deterministic for a fixed
    /// index state and a fixed query embedding.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: SearchFilter<'_>,
    ) -> Result<Vec<SearchResult>, RetrieveError> {
        let query_vector = self.embedder.embed(query)?;

        let results = {
            let db = self.db.lock().await;
            db.search(&query_vector, top_k, filter)?
        };
        debug!("Retrieved {} fragments for query", results.len());
        Ok(results)
    }
}
