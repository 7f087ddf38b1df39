//! The structured test-case schema shared by the generator and synthesizer.
//!
//! A [`TestCase`] is a per-request value: the generator builds and validates
//! one, the synthesizer compiles it. Nothing here touches shared state.

use serde::{Deserialize, Serialize};

use crate::db::models::SelectorKind;

/// What a test step does to its target element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Click,
    Type,
    Select,
    Assert,
}

impl Action {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Type => "type",
            Action::Select => "select",
            Action::Assert => "assert",
        }
    }

    /// Whether this action can legally target an element of the given kind.
    /// The same matrix gates generation and script synthesis.
    #[must_use]
    pub fn allows(&self, kind: SelectorKind) -> bool {
        match self {
            Action::Click => matches!(kind, SelectorKind::Click | SelectorKind::Radio),
            Action::Type => matches!(kind, SelectorKind::Input),
            Action::Select => matches!(kind, SelectorKind::Radio),
            Action::Assert => true,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a test case. `selector_name` refers to a descriptor's
/// human-readable name; resolution to a concrete selector happens at
/// validation and synthesis time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: Action,
    pub selector_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A structured, traceable test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub test_id: String,
    pub feature: String,
    pub description: String,
    pub steps: Vec<Step>,
    pub expected_result: String,
    /// Citation ids (`chunk:N` / `selector:N`) this case is grounded in.
    pub grounded_in: Vec<String>,
}

/// A compiled automation script, derived purely from a validated test case
/// plus the selector map. Regenerable, never hand-edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptArtifact {
    pub test_id: String,
    pub language: String,
    pub source_text: String,
    /// Canonical selector values, in first-use order.
    pub referenced_selectors: Vec<String>,
}
