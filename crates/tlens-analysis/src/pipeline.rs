//! End-to-end transcript analysis.
//!
//! `completion call (retried) → parse/repair → validate → sanitize`, with a
//! hand-built fallback result whenever the model output cannot be trusted.
//! Only transport, authorization, and cancellation failures reach the caller.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tlens_core::{
    AnalysisMetadata, AnalysisResult, AnalysisSummary, AppConfig, Evidence, Technique,
    TechniqueCategory, TokenUsage, ValidationMode,
};
use tokio_util::sync::CancellationToken;

use crate::client::{ChatClient, ChatRequest, Completion, ResponseFormat};
use crate::error::{AnalysisError, ResponseError};
use crate::prompt::{analysis_messages, truncate_transcript};
use crate::repair::parse_model_output;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sanitize::{clean_text, truncate_chars};
use crate::validate::validate_response;

const ANALYSIS_TEMPERATURE: f32 = 0.3;
const FALLBACK_CONFIDENCE: f64 = 0.3;
const FALLBACK_EXCERPT_CHARS: usize = 200;

const FALLBACK_TECHNIQUE_DESCRIPTION: &str = "No se pudo completar el análisis detallado; \
el contenido muestra técnicas generales de comunicación con la audiencia.";
const FALLBACK_OVERVIEW: &str = "Análisis básico: la respuesta del modelo no pudo procesarse. \
Intenta analizar la transcripción de nuevo para obtener resultados detallados.";
const FALLBACK_RECOMMENDATION: &str =
    "Vuelve a ejecutar el análisis para obtener un informe completo.";

/// A finished analysis. `degraded` holds the reason when `result` is the
/// fallback placeholder rather than the model's own analysis.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub degraded: Option<ResponseError>,
}

impl AnalysisOutcome {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

pub struct TranscriptAnalyzer {
    client: ChatClient,
    policy: RetryPolicy,
    model: String,
    max_transcript_chars: usize,
    max_completion_tokens: u32,
    validation_mode: ValidationMode,
}

impl TranscriptAnalyzer {
    /// Builds an analyzer from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Config`] when no API key is configured or the
    /// base URL is invalid, and [`AnalysisError::Http`] if the HTTP client
    /// cannot be constructed.
    pub fn from_config(config: &AppConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .require_api_key()
            .map_err(|e| AnalysisError::Config(e.to_string()))?;
        let client =
            ChatClient::with_base_url(api_key, config.request_timeout_secs, &config.api_base_url)?;
        Ok(Self {
            client,
            policy: RetryPolicy::from_config(config),
            model: config.model.clone(),
            max_transcript_chars: config.max_transcript_chars,
            max_completion_tokens: config.max_completion_tokens,
            validation_mode: config.validation_mode,
        })
    }

    /// Replaces the retry policy; mainly useful to shorten back-off in tests.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Analyzes one transcript.
    ///
    /// Structural problems in the model output never fail this call; they
    /// produce a degraded [`AnalysisOutcome`] carrying a fallback result.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::InvalidInput`] for a blank transcript.
    /// - [`AnalysisError::Status`] / [`AnalysisError::Http`] when the completion
    ///   call fails on every attempt, or immediately on HTTP 401/403.
    /// - [`AnalysisError::Cancelled`] when `cancel` fires.
    pub async fn analyze(
        &self,
        transcript: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        if transcript.trim().is_empty() {
            return Err(AnalysisError::InvalidInput("transcript is empty".to_string()));
        }

        let prompt_text = truncate_transcript(transcript, self.max_transcript_chars);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: analysis_messages(&prompt_text),
            temperature: ANALYSIS_TEMPERATURE,
            max_tokens: self.max_completion_tokens,
            response_format: Some(ResponseFormat::json_object()),
        };

        let completion: Completion =
            retry_with_backoff(&self.policy, cancel, || self.client.complete(&request)).await?;

        let (mut result, degraded) =
            match process_completion(&completion.content, self.validation_mode) {
                Ok(result) => (result, None),
                Err(err) => {
                    tracing::warn!(
                        code = err.code(),
                        error = %err,
                        "model response rejected; using fallback analysis"
                    );
                    (fallback_result(transcript), Some(err))
                }
            };

        stamp_provenance(
            &mut result,
            transcript,
            completion.model.as_deref().unwrap_or(&self.model),
            completion.usage,
        );

        tracing::info!(
            model = result.analysis_metadata.model.as_deref().unwrap_or_default(),
            techniques = result.techniques.len(),
            confidence = result.analysis_metadata.confidence,
            degraded = degraded.is_some(),
            "transcript analysis complete"
        );

        Ok(AnalysisOutcome { result, degraded })
    }
}

/// Turns raw completion text into a sanitized result: parse (repairing if
/// needed), validate, sanitize. No network, no retries.
///
/// # Errors
///
/// Any [`ResponseError`] from parsing or validation.
pub fn process_completion(
    content: &str,
    mode: ValidationMode,
) -> Result<AnalysisResult, ResponseError> {
    let parsed = parse_model_output(content)?;
    validate_response(&parsed, mode)
}

/// Minimal placeholder used when the model output is unusable: one generic
/// technique with low confidence so downstream views still render.
#[must_use]
pub fn fallback_result(transcript: &str) -> AnalysisResult {
    let excerpt = truncate_chars(&clean_text(transcript), FALLBACK_EXCERPT_CHARS);
    let techniques = vec![Technique {
        id: "tech_fallback".to_string(),
        name: "Comunicación general".to_string(),
        category: TechniqueCategory::Engagement.as_str().to_string(),
        subcategory: None,
        description: FALLBACK_TECHNIQUE_DESCRIPTION.to_string(),
        confidence: FALLBACK_CONFIDENCE,
        why_it_works: None,
        objective: None,
        funnel_stage: None,
        impact: "bajo".to_string(),
        evidence: if excerpt.is_empty() {
            Vec::new()
        } else {
            vec![Evidence {
                text: excerpt,
                context: None,
                timestamp: None,
            }]
        },
    }];

    AnalysisResult {
        summary: AnalysisSummary {
            overview: FALLBACK_OVERVIEW.to_string(),
            key_findings: Vec::new(),
            recommendations: vec![FALLBACK_RECOMMENDATION.to_string()],
            target_audience: None,
            main_objective: None,
            sophistication_level: "intermedio".to_string(),
            overall_effectiveness: 5,
        },
        analysis_metadata: AnalysisMetadata {
            timestamp: Utc::now(),
            model: None,
            input_length: None,
            token_usage: None,
            transcript_hash: None,
            confidence: FALLBACK_CONFIDENCE,
        },
        techniques,
        frameworks_detected: None,
        emotional_journey: None,
        language_analysis: None,
    }
}

fn stamp_provenance(
    result: &mut AnalysisResult,
    transcript: &str,
    model: &str,
    usage: Option<TokenUsage>,
) {
    let confidence = result.mean_confidence();
    result.analysis_metadata = AnalysisMetadata {
        timestamp: Utc::now(),
        model: Some(model.to_string()),
        input_length: Some(transcript.chars().count() as u64),
        token_usage: usage,
        transcript_hash: Some(transcript_hash(transcript)),
        confidence,
    };
}

/// Lowercase hex SHA-256 of the transcript.
#[must_use]
pub fn transcript_hash(transcript: &str) -> String {
    let digest = Sha256::digest(transcript.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
