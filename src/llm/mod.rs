/// LLM client trait and shared types for chat-completion calls.
///
/// The model is an untrusted external producer: callers get its raw text back
/// and are responsible for parsing and validating it. Timeouts are normal,
/// retryable failures, not crashes.
pub mod groq;
pub mod mock;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("llm service failed: {0}")]
    Service(String),

    #[error("llm request timed out after {0}s")]
    Timeout(u64),

    #[error("GROQ_API_KEY environment variable is not set")]
    MissingApiKey,
}

/// Trait for chat-completion clients.
pub trait LlmClient: Send + Sync {
    /// Send one (system prompt, user prompt) pair and return the raw
    /// completion text.
    fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String, LlmError>;
}
