//! Grounded test-case generation.
//!
//! Retrieves the context for a feature query, prompts the LLM for a
//! structured test case, and runs every response through a validation gate
//! before anything is returned: steps may only target elements that exist in
//! the page's canonical selector set, and citations may only point at
//! fragments retrieved for this request. The LLM is treated as an untrusted
//! producer — a violation triggers one corrective retry, then surfaces as a
//! typed error. Nothing is silently patched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use crate::db::models::{RefKind, SelectorDescriptor};
use crate::db::search::{SearchFilter, SearchResult};
use crate::db::{Db, KbError};
use crate::embedder::Embedder;
use crate::llm::{LlmClient, LlmError};
use crate::retriever::{RetrieveError, Retriever};
use crate::testcase::{Action, TestCase};

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub feature_query: String,
    pub page_id: String,
    pub top_k: usize,
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("no selectors indexed for page '{0}'")]
    UnknownPage(String),

    #[error("llm response is not a valid test case: {0}")]
    Parse(String),

    #[error("ungrounded selector: {0}")]
    UngroundedSelector(String),

    #[error("ungrounded citation: {0}")]
    UngroundedCitation(String),

    #[error("incomplete test case: {0}")]
    IncompleteTestCase(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    #[error(transparent)]
    Kb(#[from] KbError),
}

impl GenerateError {
    /// Failures the model itself can fix on a corrective retry, as opposed to
    /// infrastructure errors.
    fn is_correctable(&self) -> bool {
        matches!(
            self,
            GenerateError::Parse(_)
                | GenerateError::UngroundedSelector(_)
                | GenerateError::UngroundedCitation(_)
                | GenerateError::IncompleteTestCase(_)
        )
    }
}

const SYSTEM_PROMPT: &str = r#"You are an expert QA engineer specializing in test case generation.
Your task is to produce one structured test case grounded STRICTLY in the provided documentation and page elements.

IMPORTANT RULES:
1. ONLY test behavior that the provided documentation describes
2. NEVER invent page elements: every step's selector_name must exactly match the name of one of the listed PAGE ELEMENTS
3. grounded_in must list the citation ids (chunk:N / selector:N) you actually relied on, each at most once
4. The final step must be an assert that verifies the expected result
5. type and select steps must include a value

Output format - return a single JSON object, no prose:
{
  "test_id": "TC-001",
  "feature": "Feature name",
  "description": "What is being tested",
  "steps": [{"action": "click|type|select|assert", "selector_name": "element name", "value": "optional"}],
  "expected_result": "Expected outcome",
  "grounded_in": ["chunk:1", "selector:2"]
}"#;

pub struct GroundedGenerator {
    db: Arc<TokioMutex<Db>>,
    retriever: Retriever,
    llm: Arc<dyn LlmClient>,
}

impl GroundedGenerator {
    #[must_use]
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let retriever = Retriever::new(db.clone(), embedder);
        Self { db, retriever, llm }
    }

    /// Generate one validated test case for the request. On success every
    /// step references a discovered element and every citation a fragment
    /// retrieved here.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<TestCase, GenerateError> {
        let selectors = {
            let db = self.db.lock().await;
            db.selectors_for_page(&request.page_id)?
        };
        if selectors.is_empty() {
            return Err(GenerateError::UnknownPage(request.page_id.clone()));
        }
        let by_name: HashMap<&str, &SelectorDescriptor> =
            selectors.iter().map(|s| (s.name.as_str(), s)).collect();

        let chunks = self
            .retriever
            .retrieve(
                &request.feature_query,
                request.top_k,
                SearchFilter {
                    ref_kind: Some(RefKind::Chunk),
                    page_id: None,
                },
            )
            .await?;
        let selector_hits = self
            .retriever
            .retrieve(
                &request.feature_query,
                request.top_k,
                SearchFilter {
                    ref_kind: Some(RefKind::Selector),
                    page_id: Some(&request.page_id),
                },
            )
            .await?;

        let retrieved: HashSet<String> = chunks
            .iter()
            .chain(selector_hits.iter())
            .map(SearchResult::citation)
            .collect();
        let prompt = build_prompt(&request.feature_query, &chunks, &selector_hits);

        let raw = self.llm.generate(SYSTEM_PROMPT, &prompt)?;
        match attempt(&raw, &by_name, &retrieved) {
            Ok(test_case) => {
                info!(
                    "Generated {} for page {} on first attempt",
                    test_case.test_id, request.page_id
                );
                Ok(test_case)
            }
            Err(violation) if violation.is_correctable() => {
                warn!("Generation rejected ({violation}), retrying once");
                let retry_prompt = format!(
                    "{prompt}\n\nYOUR PREVIOUS ANSWER WAS REJECTED: {violation}.\n\
                     Produce a corrected test case that satisfies every rule. Use only the \
                     listed page elements and citation ids."
                );
                let raw = self.llm.generate(SYSTEM_PROMPT, &retry_prompt)?;
                let test_case = attempt(&raw, &by_name, &retrieved)?;
                info!(
                    "Generated {} for page {} after corrective retry",
                    test_case.test_id, request.page_id
                );
                Ok(test_case)
            }
            Err(e) => Err(e),
        }
    }
}

/// One parse + validate pass over a raw LLM response.
fn attempt(
    raw: &str,
    by_name: &HashMap<&str, &SelectorDescriptor>,
    retrieved: &HashSet<String>,
) -> Result<TestCase, GenerateError> {
    let test_case = parse_test_case(raw)?;
    validate(&test_case, by_name, retrieved)?;
    Ok(test_case)
}

/// The validation gate. Runs unconditionally on every parsed response.
fn validate(
    test_case: &TestCase,
    by_name: &HashMap<&str, &SelectorDescriptor>,
    retrieved: &HashSet<String>,
) -> Result<(), GenerateError> {
    if test_case.steps.is_empty() {
        return Err(GenerateError::IncompleteTestCase(
            "test case has no steps".to_string(),
        ));
    }

    for step in &test_case.steps {
        let Some(descriptor) = by_name.get(step.selector_name.as_str()) else {
            return Err(GenerateError::UngroundedSelector(format!(
                "'{}' does not exist on the target page",
                step.selector_name
            )));
        };
        if !step.action.allows(descriptor.kind) {
            return Err(GenerateError::UngroundedSelector(format!(
                "action '{}' cannot target '{}', which is a {} element",
                step.action, step.selector_name, descriptor.kind
            )));
        }
    }

    if let Some(last) = test_case.steps.last() {
        if last.action != Action::Assert {
            return Err(GenerateError::IncompleteTestCase(format!(
                "final step must be an assert, found '{}'",
                last.action
            )));
        }
    }

    if test_case.grounded_in.is_empty() {
        return Err(GenerateError::UngroundedCitation(
            "grounded_in is empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for citation in &test_case.grounded_in {
        if !seen.insert(citation.as_str()) {
            return Err(GenerateError::UngroundedCitation(format!(
                "'{citation}' is cited more than once"
            )));
        }
        if !retrieved.contains(citation.as_str()) {
            return Err(GenerateError::UngroundedCitation(format!(
                "'{citation}' was not retrieved for this request"
            )));
        }
    }

    Ok(())
}

/// Extract the JSON object from a raw completion, tolerating code fences and
/// surrounding prose. A missing or malformed object is a parse failure,
/// distinct from grounding failures.
fn parse_test_case(raw: &str) -> Result<TestCase, GenerateError> {
    let start = raw
        .find('{')
        .ok_or_else(|| GenerateError::Parse("no JSON object in response".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| GenerateError::Parse("no JSON object in response".to_string()))?;
    if end < start {
        return Err(GenerateError::Parse("no JSON object in response".to_string()));
    }

    serde_json::from_str(&raw[start..=end]).map_err(|e| GenerateError::Parse(e.to_string()))
}

fn build_prompt(query: &str, chunks: &[SearchResult], selector_hits: &[SearchResult]) -> String {
    let docs = if chunks.is_empty() {
        "(no documentation retrieved)".to_string()
    } else {
        chunks
            .iter()
            .map(|c| format!("[{}] (Source: {})\n{}", c.citation(), c.origin, c.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    };

    let elements = if selector_hits.is_empty() {
        "(no page elements retrieved)".to_string()
    } else {
        selector_hits
            .iter()
            .map(|s| {
                let detail = s
                    .selector
                    .as_ref()
                    .map(|m| format!(" — selector {}, kind: {}", m.selector, m.kind))
                    .unwrap_or_default();
                format!("[{}] {}{}", s.citation(), s.content, detail)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Based on the following documentation and page elements, produce one test case \
         for this request:\n\n\
         USER REQUEST: {query}\n\n\
         DOCUMENTATION CONTEXT:\n{docs}\n\n\
         PAGE ELEMENTS (the only elements that exist):\n{elements}\n\n\
         Return a single JSON object in the required schema. Cite only the ids listed \
         above in grounded_in, and reference page elements by their exact name."
    )
}
