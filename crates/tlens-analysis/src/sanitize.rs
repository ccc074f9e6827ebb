//! Canonicalizes a parsed model response into a bounded [`AnalysisResult`].
//!
//! Every string passes through [`clean_text`], every list is head-truncated,
//! and every free-text field is prefix-truncated by characters. Numbers are
//! clamped into range. The markup stripping is a best-effort cosmetic layer
//! over mostly-trusted model output, not an HTML security boundary.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use tlens_core::analysis::mean_confidence;
use tlens_core::{
    AnalysisMetadata, AnalysisResult, AnalysisSummary, DetectedFramework, EmotionalBeat, Evidence,
    LanguageAnalysis, Technique, TokenUsage,
};

pub const MAX_TECHNIQUES: usize = 50;
pub const MAX_EVIDENCE: usize = 5;
pub const MAX_KEY_FINDINGS: usize = 10;
pub const MAX_RECOMMENDATIONS: usize = 10;
const MAX_FRAMEWORKS: usize = 10;
const MAX_FRAMEWORK_ELEMENTS: usize = 10;
const MAX_EMOTIONAL_BEATS: usize = 20;
const MAX_KEY_PHRASES: usize = 20;
const MAX_POWER_WORDS: usize = 30;

const OVERVIEW_LEN: usize = 2000;
const LIST_ITEM_LEN: usize = 500;
const NAME_LEN: usize = 200;
const DESCRIPTION_LEN: usize = 1000;
const EVIDENCE_TEXT_LEN: usize = 500;
const EVIDENCE_CONTEXT_LEN: usize = 300;

const MIN_TECHNIQUE_CONFIDENCE: f64 = 0.1;
const MAX_TECHNIQUE_CONFIDENCE: f64 = 1.0;
const DEFAULT_TECHNIQUE_CONFIDENCE: f64 = 0.5;
const DEFAULT_SOPHISTICATION: &str = "intermedio";
const DEFAULT_IMPACT: &str = "medio";
const DEFAULT_EFFECTIVENESS: u8 = 7;

static SCRIPT_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static JS_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript\s*:").expect("valid regex"));
static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("valid regex"));

/// Strips script blocks, markup tags, `javascript:` schemes, and inline
/// `on<event>=` handlers, then trims surrounding whitespace.
#[must_use]
pub fn clean_text(input: &str) -> String {
    let text = SCRIPT_BLOCK_RE.replace_all(input, "");
    let text = TAG_RE.replace_all(&text, "");
    let text = JS_SCHEME_RE.replace_all(&text, "");
    let text = EVENT_HANDLER_RE.replace_all(&text, "");
    text.trim().to_string()
}

/// Keeps at most `max_chars` characters; no ellipsis is added.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Produces the sanitized, size-bounded copy of a structurally valid response.
///
/// The input is never mutated. Missing optional fields become `None` or empty
/// lists; `analysisMetadata.confidence` is recomputed from the clamped
/// technique confidences.
#[must_use]
pub fn sanitize_response(response: &Value) -> AnalysisResult {
    let empty = Map::new();
    let root = response.as_object().unwrap_or(&empty);

    let techniques: Vec<Technique> = root
        .get("techniques")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(MAX_TECHNIQUES)
                .map(sanitize_technique)
                .collect()
        })
        .unwrap_or_default();

    let summary = sanitize_summary(
        root.get("summary")
            .and_then(Value::as_object)
            .unwrap_or(&empty),
    );
    let metadata = sanitize_metadata(
        root.get("analysisMetadata").and_then(Value::as_object),
        &techniques,
    );

    AnalysisResult {
        summary,
        techniques,
        analysis_metadata: metadata,
        frameworks_detected: root.get("frameworksDetected").and_then(sanitize_frameworks),
        emotional_journey: root.get("emotionalJourney").and_then(sanitize_emotional_journey),
        language_analysis: root
            .get("languageAnalysis")
            .and_then(Value::as_object)
            .map(sanitize_language_analysis),
    }
}

fn sanitize_summary(summary: &Map<String, Value>) -> AnalysisSummary {
    AnalysisSummary {
        overview: text(summary, "overview", OVERVIEW_LEN).unwrap_or_default(),
        key_findings: text_list(summary, "keyFindings", MAX_KEY_FINDINGS, LIST_ITEM_LEN),
        recommendations: text_list(summary, "recommendations", MAX_RECOMMENDATIONS, LIST_ITEM_LEN),
        target_audience: text(summary, "targetAudience", LIST_ITEM_LEN),
        main_objective: text(summary, "mainObjective", LIST_ITEM_LEN),
        sophistication_level: text(summary, "sophisticationLevel", 50)
            .unwrap_or_else(|| DEFAULT_SOPHISTICATION.to_string()),
        overall_effectiveness: integer_in_range(
            summary.get("overallEffectiveness"),
            1,
            10,
            DEFAULT_EFFECTIVENESS,
        ),
    }
}

fn sanitize_technique(raw: &Value) -> Technique {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let confidence = number(obj.get("confidence"))
        .unwrap_or(DEFAULT_TECHNIQUE_CONFIDENCE)
        .clamp(MIN_TECHNIQUE_CONFIDENCE, MAX_TECHNIQUE_CONFIDENCE);

    let evidence = obj
        .get("evidence")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(MAX_EVIDENCE)
                .map(sanitize_evidence)
                .collect()
        })
        .unwrap_or_default();

    Technique {
        id: text(obj, "id", 100)
            .unwrap_or_else(|| format!("tech_{}", uuid::Uuid::new_v4().simple())),
        name: text(obj, "name", NAME_LEN).unwrap_or_default(),
        category: text(obj, "category", 50)
            .map(|c| c.to_lowercase())
            .unwrap_or_default(),
        subcategory: text(obj, "subcategory", 100),
        description: text(obj, "description", DESCRIPTION_LEN).unwrap_or_default(),
        confidence,
        why_it_works: text(obj, "whyItWorks", DESCRIPTION_LEN),
        objective: text(obj, "objective", LIST_ITEM_LEN),
        funnel_stage: text(obj, "funnelStage", 50),
        impact: text(obj, "impact", 50).unwrap_or_else(|| DEFAULT_IMPACT.to_string()),
        evidence,
    }
}

fn sanitize_evidence(raw: &Value) -> Evidence {
    match raw {
        Value::String(s) => Evidence {
            text: truncate_chars(&clean_text(s), EVIDENCE_TEXT_LEN),
            context: None,
            timestamp: None,
        },
        Value::Object(obj) => Evidence {
            text: text(obj, "text", EVIDENCE_TEXT_LEN).unwrap_or_default(),
            context: text(obj, "context", EVIDENCE_CONTEXT_LEN),
            timestamp: number(obj.get("timestamp")),
        },
        _ => Evidence {
            text: String::new(),
            context: None,
            timestamp: None,
        },
    }
}

fn sanitize_metadata(
    raw: Option<&Map<String, Value>>,
    techniques: &[Technique],
) -> AnalysisMetadata {
    let empty = Map::new();
    let obj = raw.unwrap_or(&empty);

    let timestamp = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));

    let token_usage = obj
        .get("tokenUsage")
        .and_then(|v| serde_json::from_value::<TokenUsage>(v.clone()).ok());

    AnalysisMetadata {
        timestamp,
        model: text(obj, "model", 100),
        input_length: obj.get("inputLength").and_then(Value::as_u64),
        token_usage,
        transcript_hash: text(obj, "transcriptHash", 64),
        confidence: mean_confidence(techniques.iter().map(|t| t.confidence)),
    }
}

fn sanitize_frameworks(raw: &Value) -> Option<Vec<DetectedFramework>> {
    let items = raw.as_array()?;
    Some(
        items
            .iter()
            .take(MAX_FRAMEWORKS)
            .filter_map(Value::as_object)
            .filter_map(|obj| {
                Some(DetectedFramework {
                    name: text(obj, "name", NAME_LEN)?,
                    description: text(obj, "description", DESCRIPTION_LEN),
                    confidence: number(obj.get("confidence")).unwrap_or(0.5).clamp(0.0, 1.0),
                    elements: text_list(obj, "elements", MAX_FRAMEWORK_ELEMENTS, NAME_LEN),
                })
            })
            .collect(),
    )
}

fn sanitize_emotional_journey(raw: &Value) -> Option<Vec<EmotionalBeat>> {
    let items = raw.as_array()?;
    Some(
        items
            .iter()
            .take(MAX_EMOTIONAL_BEATS)
            .filter_map(Value::as_object)
            .filter_map(|obj| {
                Some(EmotionalBeat {
                    stage: text(obj, "stage", 100)?,
                    emotion: text(obj, "emotion", 100),
                    intensity: integer_in_range(obj.get("intensity"), 1, 10, 5),
                    description: text(obj, "description", LIST_ITEM_LEN),
                    timestamp: number(obj.get("timestamp")),
                })
            })
            .collect(),
    )
}

fn sanitize_language_analysis(obj: &Map<String, Value>) -> LanguageAnalysis {
    LanguageAnalysis {
        tone: text(obj, "tone", 100),
        style: text(obj, "style", NAME_LEN),
        key_phrases: text_list(obj, "keyPhrases", MAX_KEY_PHRASES, NAME_LEN),
        power_words: text_list(obj, "powerWords", MAX_POWER_WORDS, 100),
        readability_level: text(obj, "readabilityLevel", 100),
    }
}

/// Cleaned, truncated string field; `None` when absent, not a string, or blank.
fn text(obj: &Map<String, Value>, key: &str, max_chars: usize) -> Option<String> {
    let cleaned = clean_text(obj.get(key)?.as_str()?);
    if cleaned.is_empty() {
        None
    } else {
        Some(truncate_chars(&cleaned, max_chars))
    }
}

/// First `max_items` entries of a string array, cleaned and truncated; blanks dropped.
fn text_list(
    obj: &Map<String, Value>,
    key: &str,
    max_items: usize,
    max_chars: usize,
) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(max_items)
                .filter_map(Value::as_str)
                .map(clean_text)
                .filter(|s| !s.is_empty())
                .map(|s| truncate_chars(&s, max_chars))
                .collect()
        })
        .unwrap_or_default()
}

/// Numeric value, accepting numeric strings such as `"0.8"`.
fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn integer_in_range(value: Option<&Value>, min: u8, max: u8, default: u8) -> u8 {
    match number(value) {
        Some(n) => n.round().clamp(f64::from(min), f64::from(max)) as u8,
        None => default,
    }
}

#[cfg(test)]
#[path = "sanitize_test.rs"]
mod tests;
