/// Remote embedding adapter over an OpenAI-compatible `/embeddings` endpoint.
///
/// Transient upstream failures (timeouts, 5xx, 429) are retried with
/// exponential backoff; exhausted retries surface as typed errors. A response
/// carrying the wrong dimensionality is rejected outright.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Embedder, EmbedderError};

const BACKOFF_BASE_MS: u64 = 500;

pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    timeout_secs: u64,
    max_retries: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(
        endpoint: &str,
        model: &str,
        dimensions: usize,
        timeout_secs: u64,
        max_retries: usize,
    ) -> Result<Self, EmbedderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EmbedderError::Service(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
            timeout_secs,
            max_retries,
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    EmbedderError::Timeout(self.timeout_secs)
                } else {
                    EmbedderError::Service(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EmbedderError::Service(format!(
                "embedding endpoint returned status {status}"
            )));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .map_err(|e| EmbedderError::Service(format!("malformed embedding response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbedderError::Service(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            if item.embedding.len() != self.dimensions {
                return Err(EmbedderError::Dimension {
                    expected: self.dimensions,
                    got: item.embedding.len(),
                });
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }

    fn request_with_retry(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut attempt = 0;
        loop {
            match self.request(texts) {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    let backoff = BACKOFF_BASE_MS * (1 << attempt);
                    warn!("Embedding attempt {} failed ({e}), retrying in {backoff}ms", attempt + 1);
                    std::thread::sleep(Duration::from_millis(backoff));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Dimension mismatches are contract violations, not transient conditions.
fn is_transient(e: &EmbedderError) -> bool {
    matches!(e, EmbedderError::Timeout(_) | EmbedderError::Service(_))
}

impl Embedder for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        debug!("Embedding 1 text via {}", self.endpoint);
        let mut vectors = self.request_with_retry(&[text])?;
        Ok(vectors.remove(0))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Embedding {} texts via {}", texts.len(), self.endpoint);
        self.request_with_retry(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&EmbedderError::Timeout(30)));
        assert!(is_transient(&EmbedderError::Service("503".into())));
        assert!(!is_transient(&EmbedderError::Dimension {
            expected: 384,
            got: 768
        }));
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let embedder =
            RemoteEmbedder::new("http://localhost:9999/embeddings/", "m", 384, 1, 0).unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:9999/embeddings");
        assert_eq!(embedder.dimensions(), 384);
    }
}
