//! Selector extraction from the target page markup.
//!
//! Walks the document in tree order and produces one [`NewSelector`] per
//! element with a recognized role, naming it from its label, aria-label,
//! placeholder, own text, or value, in that order, with the raw id/name
//! attribute as the last resort. Elements without an id or name attribute are
//! skipped — they cannot be addressed stably. Output is deterministic:
//! identical markup yields identical descriptors in identical order.

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::db::models::{NewSelector, SelectorKind};
use crate::indexer::extract::collapse_ws;

static ANY_ELEMENT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").unwrap());
static LABELS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label[for]").unwrap());

/// Extraction output: the deduplicated descriptor set plus non-fatal
/// collision warnings.
#[derive(Debug)]
pub struct ExtractedPage {
    pub selectors: Vec<NewSelector>,
    pub warnings: Vec<String>,
}

/// Extract the canonical selector set from one page's markup.
///
/// Collisions on the derived selector are resolved in favor of the later
/// element in document order; each collision is recorded as a warning.
pub fn extract_selectors(page_id: &str, markup: &str) -> ExtractedPage {
    let doc = Html::parse_document(markup);

    // label[for] text wins the naming precedence
    let mut labels: HashMap<String, String> = HashMap::new();
    for label in doc.select(&LABELS) {
        if let Some(for_id) = label.value().attr("for") {
            let text = collapse_ws(&label.text().collect::<String>());
            if !text.is_empty() {
                labels.entry(for_id.to_string()).or_insert(text);
            }
        }
    }

    let mut slots: Vec<Option<NewSelector>> = Vec::new();
    let mut by_selector: HashMap<String, usize> = HashMap::new();
    let mut warnings = Vec::new();
    let mut position = 0usize;

    for element in doc.select(&ANY_ELEMENT) {
        let Some(kind) = classify(element) else {
            continue;
        };
        let Some(selector) = canonical_selector(element) else {
            continue;
        };

        let descriptor = NewSelector {
            name: derive_name(element, &labels),
            selector: selector.clone(),
            kind,
            position,
        };
        position += 1;

        if let Some(&prev) = by_selector.get(&selector) {
            let message = format!(
                "page '{page_id}': selector '{selector}' matches multiple elements, keeping the later one"
            );
            warn!("{message}");
            warnings.push(message);
            slots[prev] = None;
        }
        by_selector.insert(selector, slots.len());
        slots.push(Some(descriptor));
    }

    ExtractedPage {
        selectors: slots.into_iter().flatten().collect(),
        warnings,
    }
}

/// Map an element to its interaction kind, or `None` for elements with no
/// recognized role.
fn classify(element: ElementRef<'_>) -> Option<SelectorKind> {
    let value = element.value();
    match value.name() {
        "button" => Some(SelectorKind::Click),
        "input" => match value.attr("type").unwrap_or("text") {
            "submit" | "button" | "reset" | "image" => Some(SelectorKind::Click),
            "radio" | "checkbox" => Some(SelectorKind::Radio),
            "hidden" => None,
            _ => Some(SelectorKind::Input),
        },
        "textarea" => Some(SelectorKind::Input),
        "select" => Some(SelectorKind::Radio),
        "a" => {
            if value.attr("href").is_some() && value.id().is_some() {
                Some(SelectorKind::Click)
            } else {
                None
            }
        }
        // Structural and metadata tags never become display targets
        "html" | "head" | "body" | "script" | "style" | "meta" | "link" | "title" | "form"
        | "label" | "option" | "optgroup" => None,
        _ => {
            value.id()?;
            let has_text = element.text().any(|t| !t.trim().is_empty());
            if has_text {
                Some(SelectorKind::Text)
            } else {
                Some(SelectorKind::Container)
            }
        }
    }
}

/// Canonical locator: `#id` when an id exists, else a `tag[name="…"]`
/// attribute selector. Elements with neither are not addressable.
fn canonical_selector(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    if let Some(id) = value.id() {
        return Some(format!("#{id}"));
    }
    value
        .attr("name")
        .map(|name| format!("{}[name=\"{}\"]", value.name(), name))
}

fn derive_name(element: ElementRef<'_>, labels: &HashMap<String, String>) -> String {
    let value = element.value();

    if let Some(id) = value.id() {
        if let Some(label) = labels.get(id) {
            return label.clone();
        }
    }
    if let Some(aria) = value.attr("aria-label") {
        let aria = collapse_ws(aria);
        if !aria.is_empty() {
            return aria;
        }
    }
    if let Some(placeholder) = value.attr("placeholder") {
        let placeholder = collapse_ws(placeholder);
        if !placeholder.is_empty() {
            return placeholder;
        }
    }
    let own_text = collapse_ws(&element.text().collect::<String>());
    if !own_text.is_empty() {
        return own_text;
    }
    if let Some(attr_value) = value.attr("value") {
        let attr_value = collapse_ws(attr_value);
        if !attr_value.is_empty() {
            return attr_value;
        }
    }

    value
        .id()
        .or_else(|| value.attr("name"))
        .unwrap_or_else(|| value.name())
        .to_string()
}
