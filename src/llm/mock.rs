/// Scripted LLM client for tests.
///
/// Returns queued responses in order and records every prompt it receives so
/// tests can assert on retry behavior and corrective instructions.
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{LlmClient, LlmError};

pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    #[must_use]
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far, in call order (user prompt only).
    pub fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl LlmClient for MockLlm {
    fn generate(&self, _system_prompt: &str, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Service("mock response queue exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_returns_responses_in_order() {
        let llm = MockLlm::new(vec!["first", "second"]);
        assert_eq!(llm.generate("sys", "p1").unwrap(), "first");
        assert_eq!(llm.generate("sys", "p2").unwrap(), "second");
        assert!(matches!(llm.generate("sys", "p3"), Err(LlmError::Service(_))));
        assert_eq!(llm.seen_prompts(), vec!["p1", "p2", "p3"]);
        assert_eq!(llm.call_count(), 3);
    }
}
