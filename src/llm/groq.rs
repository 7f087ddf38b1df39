/// Chat-completion client for the Groq API (OpenAI-compatible).
///
/// Any endpoint speaking the `/chat/completions` protocol works by pointing
/// `base_url` elsewhere. Transient failures (timeout, 429, 5xx) retry with
/// exponential backoff; the API key comes from `GROQ_API_KEY`.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{LlmClient, LlmError};
use crate::config::LlmConfig;

const BACKOFF_BASE_MS: u64 = 500;

pub struct GroqClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
    max_retries: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl GroqClient {
    /// Build a client from config, reading the API key from `GROQ_API_KEY`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key =
            std::env::var("GROQ_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Service(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    fn request(&self, system_prompt: &str, prompt: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::Service(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::Service(format!(
                "chat endpoint returned status {status}"
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| LlmError::Service(format!("malformed chat response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Service("chat response contained no choices".to_string()))
    }
}

impl LlmClient for GroqClient {
    fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String, LlmError> {
        debug!("Requesting completion from {} ({})", self.base_url, self.model);

        let mut attempt = 0;
        loop {
            match self.request(system_prompt, prompt) {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    let backoff = BACKOFF_BASE_MS * (1 << attempt);
                    warn!("LLM attempt {} failed ({e}), retrying in {backoff}ms", attempt + 1);
                    std::thread::sleep(Duration::from_millis(backoff));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(e: &LlmError) -> bool {
    matches!(e, LlmError::Timeout(_) | LlmError::Service(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&LlmError::Timeout(60)));
        assert!(is_transient(&LlmError::Service("503".into())));
        assert!(!is_transient(&LlmError::MissingApiKey));
    }
}
