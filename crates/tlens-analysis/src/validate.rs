//! Structural contract for model output claiming to be an analysis.
//!
//! Checks run in a fixed order and the first violation wins, so the same
//! malformed response always reports the same [`ResponseError`].

use std::borrow::Cow;

use serde_json::Value;
use tlens_core::{AnalysisResult, TechniqueCategory, ValidationMode};

use crate::error::ResponseError;
use crate::sanitize::{clean_text, sanitize_response};

#[derive(Clone, Copy)]
enum FieldKind {
    /// A string that still has content after markup stripping.
    Text,
    /// Any present value; its type is checked afterwards.
    Value,
}

const REQUIRED_TECHNIQUE_FIELDS: [(&str, FieldKind); 4] = [
    ("name", FieldKind::Text),
    ("category", FieldKind::Value),
    ("description", FieldKind::Text),
    ("confidence", FieldKind::Value),
];

/// Validates `response` and, on success, returns its sanitized form.
///
/// In [`ValidationMode::Strict`] the first invalid technique rejects the whole
/// response. In [`ValidationMode::Lenient`] invalid techniques are dropped and
/// only an empty remainder is an error.
///
/// # Errors
///
/// Returns the first [`ResponseError`] found; technique errors carry the
/// 1-based index of the offending entry.
pub fn validate_response(
    response: &Value,
    mode: ValidationMode,
) -> Result<AnalysisResult, ResponseError> {
    let validated = validate_structure(response, mode)?;
    Ok(sanitize_response(&validated))
}

/// Runs the structural checks without sanitizing.
///
/// Lenient mode returns a copy with the invalid techniques removed; strict
/// mode borrows the input unchanged.
///
/// # Errors
///
/// See [`validate_response`].
pub fn validate_structure(
    response: &Value,
    mode: ValidationMode,
) -> Result<Cow<'_, Value>, ResponseError> {
    if is_falsy(response) {
        return Err(ResponseError::EmptyResponse);
    }

    if !is_present(response.get("summary")) || !is_present(response.get("techniques")) {
        return Err(ResponseError::MissingFields {
            raw: response.clone(),
        });
    }

    if !has_text(response["summary"].get("overview")) {
        return Err(ResponseError::MissingSummary);
    }

    let Some(techniques) = response["techniques"].as_array() else {
        return Err(ResponseError::InvalidTechniques {
            raw: response.clone(),
        });
    };

    if techniques.is_empty() {
        return Err(ResponseError::NoTechniques);
    }

    match mode {
        ValidationMode::Strict => {
            for (idx, technique) in techniques.iter().enumerate() {
                validate_technique(technique, idx + 1)?;
            }
            Ok(Cow::Borrowed(response))
        }
        ValidationMode::Lenient => {
            let kept: Vec<Value> = techniques
                .iter()
                .enumerate()
                .filter(|(idx, technique)| match validate_technique(technique, idx + 1) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(
                            code = err.code(),
                            error = %err,
                            "dropping invalid technique"
                        );
                        false
                    }
                })
                .map(|(_, technique)| technique.clone())
                .collect();

            if kept.is_empty() {
                return Err(ResponseError::NoTechniques);
            }

            let mut filtered = response.clone();
            filtered["techniques"] = Value::Array(kept);
            Ok(Cow::Owned(filtered))
        }
    }
}

/// Checks one technique; `index` is 1-based and only used for reporting.
///
/// # Errors
///
/// [`ResponseError::InvalidTechnique`] for a missing required field or a
/// text field that is not a non-blank string,
/// [`ResponseError::InvalidConfidence`] for a confidence outside `[0, 1]`, and
/// [`ResponseError::InvalidCategory`] for a category outside the fixed set.
pub fn validate_technique(technique: &Value, index: usize) -> Result<(), ResponseError> {
    for (field, kind) in REQUIRED_TECHNIQUE_FIELDS {
        let value = technique.get(field);
        let ok = match kind {
            FieldKind::Text => has_text(value),
            FieldKind::Value => is_present(value),
        };
        if !ok {
            return Err(ResponseError::InvalidTechnique { index, field });
        }
    }

    let confidence = &technique["confidence"];
    match confidence.as_f64() {
        Some(c) if (0.0..=1.0).contains(&c) => {}
        _ => {
            return Err(ResponseError::InvalidConfidence {
                index,
                value: confidence.to_string(),
            })
        }
    }

    let category = &technique["category"];
    let known = category
        .as_str()
        .is_some_and(|c| c.parse::<TechniqueCategory>().is_ok());
    if !known {
        return Err(ResponseError::InvalidCategory {
            index,
            category: category
                .as_str()
                .map_or_else(|| category.to_string(), str::to_string),
        });
    }

    Ok(())
}

/// `null`, `false`, `""`, and zero: nothing usable came back at all.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// A string that is non-empty once markup is stripped; other JSON types fail.
fn has_text(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| !clean_text(s).is_empty())
}

/// Field presence: absent, `null`, `false`, and `""` count as missing.
///
/// Numbers are always present, so a confidence of exactly `0` passes the
/// required-field check and is judged by the range check instead.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null | Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
