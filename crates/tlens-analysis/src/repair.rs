//! Best-effort recovery of JSON from raw model output.
//!
//! Models wrap JSON in Markdown fences, add chatter around it, or emit
//! JavaScript-flavoured object literals. [`parse_model_output`] handles the
//! common cases; anything with nested quotes, comments, or unbalanced braces
//! is expected to end in [`ResponseError::MalformedJson`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ResponseError;

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));
static BARE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*):").expect("valid regex")
});
static SINGLE_QUOTED_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([:\[,]\s*)'([^'"\\]*)'"#).expect("valid regex"));

/// Parses model output into JSON, repairing it if the direct parse fails.
///
/// # Errors
///
/// Returns [`ResponseError::EmptyResponse`] for blank output and
/// [`ResponseError::MalformedJson`], carrying the original text, when the
/// repaired text still does not parse.
pub fn parse_model_output(raw: &str) -> Result<Value, ResponseError> {
    let unfenced = strip_markdown_fences(raw);
    if unfenced.is_empty() {
        return Err(ResponseError::EmptyResponse);
    }
    let candidate = extract_json_object(unfenced).unwrap_or(unfenced);

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Ok(value),
        Err(direct_err) => {
            let repaired = repair_json(candidate);
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => {
                    tracing::debug!(error = %direct_err, "model output needed JSON repair");
                    Ok(value)
                }
                Err(e) => Err(ResponseError::MalformedJson {
                    raw: raw.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
    }
}

/// Applies the textual repair heuristics in order: trailing commas, bare
/// keys, single-quoted values, then raw newlines/tabs inside strings.
#[must_use]
pub fn repair_json(text: &str) -> String {
    let fixed = text
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let fixed = TRAILING_COMMA_RE.replace_all(&fixed, "$1");
    let fixed = BARE_KEY_RE.replace_all(&fixed, "$1\"$2\"$3:");
    let fixed = SINGLE_QUOTED_VALUE_RE.replace_all(&fixed, "$1\"$2\"");
    escape_control_chars_in_strings(&fixed)
}

/// Strip a surrounding Markdown code fence (```` ```json ```` or bare ```` ``` ````).
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let clean = clean.strip_suffix("```").unwrap_or(clean);
    clean.trim()
}

/// Extract the first balanced `{...}` object, ignoring braces inside strings.
fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut start_idx = None;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start_idx = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start_idx.map(|start| &text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Escape literal newlines, carriage returns, and tabs that appear inside
/// double-quoted strings; structural whitespace is left alone.
fn escape_control_chars_in_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;

    for c in text.chars() {
        if escape_next {
            escape_next = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' if in_string => {
                escape_next = true;
                out.push(c);
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '\t' if in_string => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
