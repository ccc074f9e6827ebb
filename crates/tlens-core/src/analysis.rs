//! Normalized analysis model produced by the response pipeline.
//!
//! Every value here has already been cleaned, truncated, and clamped; field
//! names serialize in camelCase because the result is persisted as an opaque
//! JSON blob and read back by the web front end.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed set of categories a detected technique may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechniqueCategory {
    Conversion,
    Credibility,
    Engagement,
    Awareness,
    Psychology,
    Copywriting,
}

impl TechniqueCategory {
    pub const ALL: [TechniqueCategory; 6] = [
        TechniqueCategory::Conversion,
        TechniqueCategory::Credibility,
        TechniqueCategory::Engagement,
        TechniqueCategory::Awareness,
        TechniqueCategory::Psychology,
        TechniqueCategory::Copywriting,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TechniqueCategory::Conversion => "conversion",
            TechniqueCategory::Credibility => "credibility",
            TechniqueCategory::Engagement => "engagement",
            TechniqueCategory::Awareness => "awareness",
            TechniqueCategory::Psychology => "psychology",
            TechniqueCategory::Copywriting => "copywriting",
        }
    }
}

impl std::fmt::Display for TechniqueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown technique category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for TechniqueCategory {
    type Err = UnknownCategory;

    /// Matches exactly; the model is instructed to emit lowercase names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: AnalysisSummary,
    pub techniques: Vec<Technique>,
    pub analysis_metadata: AnalysisMetadata,
    pub frameworks_detected: Option<Vec<DetectedFramework>>,
    pub emotional_journey: Option<Vec<EmotionalBeat>>,
    pub language_analysis: Option<LanguageAnalysis>,
}

impl AnalysisResult {
    /// Mean of all technique confidences rounded to two decimals, `0.0` when
    /// there are no techniques.
    #[must_use]
    pub fn mean_confidence(&self) -> f64 {
        mean_confidence(self.techniques.iter().map(|t| t.confidence))
    }
}

/// Arithmetic mean rounded to two decimal places; empty input yields `0.0`.
#[must_use]
pub fn mean_confidence<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f64, 0_u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return 0.0;
    }
    (sum / f64::from(count) * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub overview: String,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub target_audience: Option<String>,
    pub main_objective: Option<String>,
    pub sophistication_level: String,
    /// Always within `1..=10`.
    pub overall_effectiveness: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technique {
    pub id: String,
    pub name: String,
    /// Lowercase category name; one of [`TechniqueCategory`] for validated input.
    pub category: String,
    pub subcategory: Option<String>,
    pub description: String,
    /// Always within `0.1..=1.0`.
    pub confidence: f64,
    pub why_it_works: Option<String>,
    pub objective: Option<String>,
    pub funnel_stage: Option<String>,
    pub impact: String,
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub text: String,
    pub context: Option<String>,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub timestamp: DateTime<Utc>,
    pub model: Option<String>,
    pub input_length: Option<u64>,
    pub token_usage: Option<TokenUsage>,
    /// Hex SHA-256 of the analyzed transcript, for de-duplication downstream.
    pub transcript_hash: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFramework {
    pub name: String,
    pub description: Option<String>,
    pub confidence: f64,
    pub elements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalBeat {
    pub stage: String,
    pub emotion: Option<String>,
    pub intensity: u8,
    pub description: Option<String>,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageAnalysis {
    pub tone: Option<String>,
    pub style: Option<String>,
    pub key_phrases: Vec<String>,
    pub power_words: Vec<String>,
    pub readability_level: Option<String>,
}
