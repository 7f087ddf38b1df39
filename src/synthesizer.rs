//! Deterministic compilation of a validated test case into a Selenium script.
//!
//! A pure function: same (test case, selector map) always yields byte-identical
//! output. Emitted locators use only canonical selector values, never the
//! human-readable names, so a regenerated script targets exactly the elements
//! the validated test case was checked against.

use std::collections::HashMap;

use thiserror::Error;

use crate::db::models::{SelectorDescriptor, SelectorKind};
use crate::testcase::{Action, ScriptArtifact, Step, TestCase};

/// Identifier recorded in [`ScriptArtifact::language`].
pub const SCRIPT_LANGUAGE: &str = "python-selenium";

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("no template for action '{action}' on {kind} element '{selector_name}'")]
    UnmappedAction {
        action: Action,
        kind: SelectorKind,
        selector_name: String,
    },

    #[error("step references selector name '{0}' that is not in the selector map")]
    UnknownSelector(String),

    #[error("step '{action} {selector_name}' requires a value")]
    MissingValue {
        action: Action,
        selector_name: String,
    },
}

/// Compile a validated test case against the page's selector map.
pub fn synthesize(
    test_case: &TestCase,
    selectors: &[SelectorDescriptor],
) -> Result<ScriptArtifact, SynthesisError> {
    let by_name: HashMap<&str, &SelectorDescriptor> =
        selectors.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut referenced: Vec<String> = Vec::new();
    let mut body: Vec<String> = Vec::new();
    let mut page_id: Option<&str> = None;

    for (index, step) in test_case.steps.iter().enumerate() {
        let descriptor = by_name
            .get(step.selector_name.as_str())
            .ok_or_else(|| SynthesisError::UnknownSelector(step.selector_name.clone()))?;
        if !step.action.allows(descriptor.kind) {
            return Err(SynthesisError::UnmappedAction {
                action: step.action,
                kind: descriptor.kind,
                selector_name: step.selector_name.clone(),
            });
        }

        page_id.get_or_insert(descriptor.page_id.as_str());
        if !referenced.contains(&descriptor.selector) {
            referenced.push(descriptor.selector.clone());
        }

        body.push(emit_step(index + 1, step, descriptor)?);
    }

    let header = format!(
        "# {}: {}\n{}# Expected: {}",
        test_case.test_id,
        test_case.feature,
        comment_block(&test_case.description),
        test_case.expected_result.replace('\n', " ")
    );

    let source_text = format!(
        r#"{header}

from selenium import webdriver
from selenium.webdriver.common.by import By
from selenium.webdriver.support import expected_conditions as EC
from selenium.webdriver.support.ui import Select, WebDriverWait

TARGET_PAGE = {page}  # resolve to the deployed URL before running


def main():
    driver = webdriver.Chrome()
    wait = WebDriverWait(driver, 10)
    try:
        driver.get(TARGET_PAGE)

{steps}
        print({done})
    finally:
        driver.quit()


if __name__ == "__main__":
    main()
"#,
        header = header,
        page = py_str(page_id.unwrap_or("about:blank")),
        steps = body.join("\n\n"),
        done = py_str(&format!(
            "PASS {}: {}",
            test_case.test_id, test_case.expected_result
        )),
    );

    Ok(ScriptArtifact {
        test_id: test_case.test_id.clone(),
        language: SCRIPT_LANGUAGE.to_string(),
        source_text,
        referenced_selectors: referenced,
    })
}

fn emit_step(
    number: usize,
    step: &Step,
    descriptor: &SelectorDescriptor,
) -> Result<String, SynthesisError> {
    let selector = py_str(&descriptor.selector);
    let comment = format!(
        "        # Step {number}: {} '{}'",
        step.action, step.selector_name
    );

    const INDENT: &str = "        ";
    let mut lines: Vec<String> = Vec::new();
    match step.action {
        Action::Click => {
            lines.push(format!(
                "{INDENT}element = wait.until(EC.element_to_be_clickable((By.CSS_SELECTOR, {selector})))"
            ));
            lines.push(format!("{INDENT}element.click()"));
        }
        Action::Type => {
            let value = required_value(step)?;
            lines.push(format!(
                "{INDENT}element = wait.until(EC.visibility_of_element_located((By.CSS_SELECTOR, {selector})))"
            ));
            lines.push(format!("{INDENT}element.clear()"));
            lines.push(format!("{INDENT}element.send_keys({})", py_str(value)));
        }
        Action::Select => {
            let value = required_value(step)?;
            lines.push(format!(
                "{INDENT}element = wait.until(EC.presence_of_element_located((By.CSS_SELECTOR, {selector})))"
            ));
            lines.push(format!(
                "{INDENT}Select(element).select_by_visible_text({})",
                py_str(value)
            ));
        }
        Action::Assert => {
            lines.push(format!(
                "{INDENT}element = wait.until(EC.visibility_of_element_located((By.CSS_SELECTOR, {selector})))"
            ));
            match &step.value {
                Some(value) => lines.push(format!(
                    "{INDENT}assert {} in element.text, {}",
                    py_str(value),
                    py_str(&format!("expected '{}' in '{}'", value, step.selector_name))
                )),
                None => lines.push(format!(
                    "{INDENT}assert element.is_displayed(), {}",
                    py_str(&format!("expected '{}' to be visible", step.selector_name))
                )),
            }
        }
    }

    Ok(format!("{comment}\n{}", lines.join("\n")))
}

fn required_value(step: &Step) -> Result<&str, SynthesisError> {
    step.value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SynthesisError::MissingValue {
            action: step.action,
            selector_name: step.selector_name.clone(),
        })
}

/// Render a Python double-quoted string literal.
fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn comment_block(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push_str("# ");
        out.push_str(line);
        out.push('\n');
    }
    out
}
