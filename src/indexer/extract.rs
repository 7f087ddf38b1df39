//! Per-format text extraction for ingested documents.
//!
//! Turns raw bytes into plain text suitable for chunking. Markdown is reduced
//! via pulldown-cmark, JSON is flattened into readable `key: value` lines,
//! HTML becomes a structure summary plus visible text, and PDF text is pulled
//! per page with lopdf.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("failed to parse {kind} document: {message}")]
    Parse { kind: &'static str, message: String },
}

/// Map a file extension to a supported content type.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "md" | "markdown" => Some("markdown"),
        "txt" => Some("text"),
        "json" => Some("json"),
        "html" | "htm" => Some("html"),
        "pdf" => Some("pdf"),
        _ => None,
    }
}

/// Extract plain text from a raw document of the given content type.
pub fn extract_text(content_type: &str, raw: &[u8]) -> Result<String, ExtractError> {
    match content_type {
        "markdown" => Ok(markdown_to_text(&String::from_utf8_lossy(raw))),
        "text" => Ok(String::from_utf8_lossy(raw).into_owned()),
        "json" => Ok(json_to_text(raw)),
        "html" => Ok(html_to_text(&String::from_utf8_lossy(raw))),
        "pdf" => pdf_to_text(raw),
        other => Err(ExtractError::UnsupportedType(other.to_string())),
    }
}

// ── Markdown ─────────────────────────────────────────────────────────

fn markdown_to_text(markdown: &str) -> String {
    use pulldown_cmark::{Event, Parser, TagEnd};

    let mut out = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
            ) => out.push_str("\n\n"),
            _ => {}
        }
    }
    squeeze_blank_lines(&out)
}

// ── JSON ─────────────────────────────────────────────────────────────

/// Flatten JSON into readable `key: value` lines. Invalid JSON falls back to
/// the raw text so a malformed upload still contributes something searchable.
fn json_to_text(raw: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => {
            let mut out = String::new();
            flatten_json(&value, 0, &mut out);
            out.trim_end().to_string()
        }
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

fn flatten_json(value: &serde_json::Value, indent: usize, out: &mut String) {
    let prefix = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                if val.is_object() || val.is_array() {
                    out.push_str(&format!("{prefix}{key}:\n"));
                    flatten_json(val, indent + 1, out);
                } else {
                    out.push_str(&format!("{prefix}{key}: {}\n", scalar_to_text(val)));
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                flatten_json(item, indent, out);
            }
        }
        other => out.push_str(&format!("{prefix}{}\n", scalar_to_text(other))),
    }
}

fn scalar_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── HTML ─────────────────────────────────────────────────────────────

static ID_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[id]").unwrap());
static FORM_CONTROLS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, button, textarea, select").unwrap());

/// Summarize markup for retrieval: elements with ids, form controls, then the
/// visible text. Selector extraction handles the canonical element map; this
/// text only feeds the chunk corpus.
fn html_to_text(markup: &str) -> String {
    let doc = Html::parse_document(markup);
    let mut lines: Vec<String> = Vec::new();

    let with_ids: Vec<_> = doc.select(&ID_ELEMENTS).collect();
    if !with_ids.is_empty() {
        lines.push("ELEMENTS WITH IDS:".to_string());
        for el in with_ids {
            let tag = el.value().name();
            let id = el.value().id().unwrap_or_default();
            let text: String = el.text().collect::<String>();
            let text = collapse_ws(&text);
            let snippet: String = text.chars().take(50).collect();
            lines.push(format!("  - <{tag} id=\"{id}\"> {snippet}"));
        }
        lines.push(String::new());
    }

    let controls: Vec<_> = doc.select(&FORM_CONTROLS).collect();
    if !controls.is_empty() {
        lines.push("FORM ELEMENTS:".to_string());
        for el in controls {
            let tag = el.value().name();
            let id = el.value().id().unwrap_or("no-id");
            let kind = el.value().attr("type").unwrap_or(tag);
            lines.push(format!("  - <{tag} type=\"{kind}\" id=\"{id}\">"));
        }
        lines.push(String::new());
    }

    let mut body = String::new();
    collect_visible_text(doc.tree.root(), &mut body);
    lines.push(squeeze_blank_lines(&body));

    squeeze_blank_lines(&lines.join("\n"))
}

fn collect_visible_text(node: ego_tree::NodeRef<'_, scraper::Node>, out: &mut String) {
    match node.value() {
        scraper::Node::Text(text) => out.push_str(&text),
        scraper::Node::Element(el) => {
            if matches!(el.name(), "script" | "style") {
                return;
            }
            for child in node.children() {
                collect_visible_text(child, out);
            }
        }
        scraper::Node::Document | scraper::Node::Fragment => {
            for child in node.children() {
                collect_visible_text(child, out);
            }
        }
        _ => {}
    }
}

// ── PDF ──────────────────────────────────────────────────────────────

fn pdf_to_text(raw: &[u8]) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load_mem(raw).map_err(|e| ExtractError::Parse {
        kind: "pdf",
        message: e.to_string(),
    })?;

    let mut parts = Vec::new();
    for page in doc.get_pages().keys() {
        match doc.extract_text(&[*page]) {
            Ok(text) => parts.push(text),
            Err(e) => warn!("Skipping unreadable PDF page {page}: {e}"),
        }
    }
    Ok(parts.join("\n\n"))
}

// ── Helpers ──────────────────────────────────────────────────────────

pub(crate) fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn squeeze_blank_lines(s: &str) -> String {
    static BLANKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
    BLANKS.replace_all(s.trim(), "\n\n").into_owned()
}
