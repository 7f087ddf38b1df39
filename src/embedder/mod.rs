/// Embedder trait and shared types for text embedding.
///
/// The embedding model itself is an external collaborator; this module only
/// defines the adapter contract and its failure modes. An adapter must never
/// return a partial or zero vector on upstream failure — failures surface as
/// typed errors so they cannot silently degrade retrieval quality.
pub mod mock;
pub mod remote;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding service failed: {0}")]
    Service(String),

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("embedding service returned dimension {got}, expected {expected}")]
    Dimension { expected: usize, got: usize },
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`. Same text must produce the same vector.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}
