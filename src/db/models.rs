use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ingested source document. Immutable once stored; replaced wholesale when
/// the same `source_name` is re-ingested.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub source_name: String,
    pub content_type: String,
    pub indexed_at: DateTime<Utc>,
}

/// Chunk insert model. Spans are character offsets into the extracted
/// document text.
#[derive(Debug, Clone)]
pub struct NewChunk<'a> {
    pub ordinal: usize,
    pub content: &'a str,
    pub span_start: usize,
    pub span_end: usize,
}

/// Interaction affordance of a page element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    /// Buttons, submit inputs, links — things you click.
    Click,
    /// Free-text fields — things you type into.
    Input,
    /// Radios, checkboxes, dropdowns — things you choose from.
    Radio,
    /// Elements with an id that carry readable text.
    Text,
    /// Elements with an id but no direct text of their own.
    Container,
}

impl SelectorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorKind::Click => "click",
            SelectorKind::Input => "input",
            SelectorKind::Radio => "radio",
            SelectorKind::Text => "text",
            SelectorKind::Container => "container",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "click" => Some(SelectorKind::Click),
            "input" => Some(SelectorKind::Input),
            "radio" => Some(SelectorKind::Radio),
            "text" => Some(SelectorKind::Text),
            "container" => Some(SelectorKind::Container),
            _ => None,
        }
    }
}

impl std::fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selector insert model produced by extraction, before a page id and row id
/// are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSelector {
    pub name: String,
    pub selector: String,
    pub kind: SelectorKind,
    /// Document-order index of the winning element.
    pub position: usize,
}

/// Canonical record mapping a human-readable name to a concrete page-element
/// locator and its interaction kind. The single source of truth for what the
/// generator may reference.
#[derive(Debug, Clone, Serialize)]
pub struct SelectorDescriptor {
    pub id: i64,
    pub page_id: String,
    pub name: String,
    pub selector: String,
    pub kind: SelectorKind,
    pub position: usize,
}

/// What an embedding record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Chunk,
    Selector,
}

impl RefKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Chunk => "chunk",
            RefKind::Selector => "selector",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chunk" => Some(RefKind::Chunk),
            "selector" => Some(RefKind::Selector),
            _ => None,
        }
    }
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_kind_round_trip() {
        for kind in [
            SelectorKind::Click,
            SelectorKind::Input,
            SelectorKind::Radio,
            SelectorKind::Text,
            SelectorKind::Container,
        ] {
            assert_eq!(SelectorKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SelectorKind::parse("hover"), None);
    }

    #[test]
    fn test_selector_kind_serde_lowercase() {
        let json = serde_json::to_string(&SelectorKind::Click).unwrap();
        assert_eq!(json, "\"click\"");
        let kind: SelectorKind = serde_json::from_str("\"radio\"").unwrap();
        assert_eq!(kind, SelectorKind::Radio);
    }

    #[test]
    fn test_ref_kind_round_trip() {
        assert_eq!(RefKind::parse("chunk"), Some(RefKind::Chunk));
        assert_eq!(RefKind::parse("selector"), Some(RefKind::Selector));
        assert_eq!(RefKind::parse("page"), None);
    }
}
