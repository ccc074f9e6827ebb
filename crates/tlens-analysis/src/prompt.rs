//! Prompt construction for transcript analysis.

use tlens_core::TechniqueCategory;

use crate::client::ChatMessage;

const TRUNCATION_MARKER: &str = "\n\n[... transcript truncated ...]\n\n";

/// Keeps the head and tail halves of `transcript` when it exceeds `max_chars`.
#[must_use]
pub fn truncate_transcript(transcript: &str, max_chars: usize) -> String {
    let total = transcript.chars().count();
    if total <= max_chars {
        return transcript.to_string();
    }
    let tail_len = max_chars / 2;
    let head_len = max_chars - tail_len;
    let head: String = transcript.chars().take(head_len).collect();
    let tail: String = transcript.chars().skip(total - tail_len).collect();
    format!("{head}{TRUNCATION_MARKER}{tail}")
}

fn category_list() -> String {
    TechniqueCategory::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn analysis_system_prompt() -> String {
    format!(
        r#"You are an expert in marketing, persuasion, and sales communication.
You analyze video transcripts and identify the persuasion and communication techniques they use.

Respond with ONLY a JSON object, no Markdown and no commentary, with this shape:
{{
  "summary": {{
    "overview": string,
    "keyFindings": [string],
    "recommendations": [string],
    "targetAudience": string,
    "mainObjective": string,
    "sophisticationLevel": "basico" | "intermedio" | "avanzado",
    "overallEffectiveness": integer 1-10
  }},
  "techniques": [{{
    "id": string,
    "name": string,
    "category": one of [{categories}],
    "subcategory": string,
    "description": string,
    "confidence": number between 0 and 1,
    "whyItWorks": string,
    "objective": string,
    "funnelStage": string,
    "impact": "bajo" | "medio" | "alto",
    "evidence": [{{ "text": exact quote, "context": string, "timestamp": number or null }}]
  }}],
  "frameworksDetected": [{{
    "name": string, "description": string, "confidence": number, "elements": [string]
  }}],
  "emotionalJourney": [{{
    "stage": string, "emotion": string, "intensity": integer 1-10, "description": string
  }}],
  "languageAnalysis": {{
    "tone": string, "style": string, "keyPhrases": [string], "powerWords": [string],
    "readabilityLevel": string
  }}
}}

Rules:
- Include at least one technique. Every technique needs name, category, description, and confidence.
- Use only the listed categories, written in lowercase.
- Quote evidence verbatim from the transcript.
- Write every free-text value in Spanish."#,
        categories = category_list()
    )
}

/// System and user messages asking the model to analyze `transcript`.
#[must_use]
pub fn analysis_messages(transcript: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(analysis_system_prompt()),
        ChatMessage::user(format!(
            "Analyze the following transcript:\n\n<transcript>\n{transcript}\n</transcript>"
        )),
    ]
}
