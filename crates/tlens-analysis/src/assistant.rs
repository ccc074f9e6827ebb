//! Question answering grounded in previously analyzed transcripts.

use serde::{Deserialize, Serialize};
use tlens_core::{AnalysisResult, AppConfig};
use tokio_util::sync::CancellationToken;

use crate::client::{ChatClient, ChatMessage, ChatRequest};
use crate::error::AnalysisError;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sanitize::truncate_chars;

const ASSISTANT_TEMPERATURE: f32 = 0.7;
const DEFAULT_CONTEXT_CHARS: usize = 24_000;
const EXCERPT_CHARS: usize = 3_000;
const MAX_TECHNIQUES_PER_ENTRY: usize = 10;

/// One transcript in the user's library, with its analysis when available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusEntry {
    pub title: String,
    pub transcript: String,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
}

pub struct TranscriptAssistant {
    client: ChatClient,
    policy: RetryPolicy,
    model: String,
    max_completion_tokens: u32,
    context_chars: usize,
}

impl TranscriptAssistant {
    /// # Errors
    ///
    /// Returns [`AnalysisError::Config`] when no API key is configured or the
    /// base URL is invalid.
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
            max_completion_tokens: config.max_completion_tokens,
            context_chars: DEFAULT_CONTEXT_CHARS,
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Character budget for the transcript context block.
    #[must_use]
    pub fn with_context_chars(mut self, context_chars: usize) -> Self {
        self.context_chars = context_chars;
        self
    }

    /// Answers `question` using `corpus` as context and `history` as the
    /// prior conversation.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::InvalidInput`] for a blank question.
    /// - [`AnalysisError::EmptyCompletion`] when the model returns no text.
    /// - Transport, status, and cancellation errors from the completion call.
    pub async fn reply(
        &self,
        corpus: &[CorpusEntry],
        history: &[ChatMessage],
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AnalysisError> {
        if question.trim().is_empty() {
            return Err(AnalysisError::InvalidInput("question is empty".to_string()));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: build_grounded_messages(corpus, history, question, self.context_chars),
            temperature: ASSISTANT_TEMPERATURE,
            max_tokens: self.max_completion_tokens,
            response_format: None,
        };

        let completion =
            retry_with_backoff(&self.policy, cancel, || self.client.complete(&request)).await?;
        let answer = completion.content.trim();
        if answer.is_empty() {
            return Err(AnalysisError::EmptyCompletion);
        }

        tracing::info!(
            corpus_entries = corpus.len(),
            history_turns = history.len(),
            answer_chars = answer.chars().count(),
            "assistant reply complete"
        );
        Ok(answer.to_string())
    }
}

/// System prompt with as many corpus entries as fit in `context_chars`,
/// followed by `history` and the new question.
///
/// Entries are added whole, in order; the first one that would overflow the
/// budget stops the context block. A first entry larger than the whole budget
/// is cut to fit so the model always sees something.
#[must_use]
pub fn build_grounded_messages(
    corpus: &[CorpusEntry],
    history: &[ChatMessage],
    question: &str,
    context_chars: usize,
) -> Vec<ChatMessage> {
    let mut context = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for entry in corpus {
        let block = render_entry(entry);
        let len = block.chars().count();
        if used + len > context_chars {
            if included == 0 && context_chars > 0 {
                context.push_str(&truncate_chars(&block, context_chars));
                included += 1;
            }
            break;
        }
        context.push_str(&block);
        used += len;
        included += 1;
    }

    if included < corpus.len() {
        tracing::debug!(included, total = corpus.len(), "corpus context truncated to fit budget");
    }

    let system = if context.is_empty() {
        format!("{ASSISTANT_INSTRUCTIONS}\n\nNo hay transcripciones disponibles todavía.")
    } else {
        format!("{ASSISTANT_INSTRUCTIONS}\n\nTranscripciones disponibles:\n\n{context}")
    };

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(question.trim()));
    messages
}

const ASSISTANT_INSTRUCTIONS: &str = "Eres un asistente experto en marketing \
y comunicación persuasiva. Responde en español usando solo la información \
de las transcripciones y análisis que siguen. \
Si la respuesta no está en ellas, dilo claramente. \
Cita el título de la transcripción cuando uses su contenido.";

fn render_entry(entry: &CorpusEntry) -> String {
    let mut block = format!("### {}\n", entry.title.trim());

    if let Some(analysis) = &entry.analysis {
        block.push_str(&format!("Resumen: {}\n", analysis.summary.overview));
        if !analysis.techniques.is_empty() {
            let techniques: Vec<String> = analysis
                .techniques
                .iter()
                .take(MAX_TECHNIQUES_PER_ENTRY)
                .map(|t| format!("{} ({})", t.name, t.category))
                .collect();
            block.push_str(&format!("Técnicas: {}\n", techniques.join(", ")));
        }
    }

    block.push_str(&format!(
        "Fragmento:\n{}\n\n",
        truncate_chars(entry.transcript.trim(), EXCERPT_CHARS)
    ));
    block
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tlens_core::{AnalysisMetadata, AnalysisSummary, Technique};

    use super::*;
    use crate::client::Role;

    fn entry(title: &str, transcript: &str) -> CorpusEntry {
        CorpusEntry {
            title: title.to_string(),
            transcript: transcript.to_string(),
            analysis: None,
        }
    }

    fn analyzed(title: &str) -> CorpusEntry {
        let mut e = entry(title, "Solo quedan diez plazas.");
        e.analysis = Some(AnalysisResult {
            summary: AnalysisSummary {
                overview: "Lanzamiento con urgencia.".to_string(),
                key_findings: Vec::new(),
                recommendations: Vec::new(),
                target_audience: None,
                main_objective: None,
                sophistication_level: "intermedio".to_string(),
                overall_effectiveness: 7,
            },
            techniques: vec![Technique {
                id: "tech_1".to_string(),
                name: "Escasez".to_string(),
                category: "conversion".to_string(),
                subcategory: None,
                description: "Plazas limitadas.".to_string(),
                confidence: 0.9,
                why_it_works: None,
                objective: None,
                funnel_stage: None,
                impact: "alto".to_string(),
                evidence: Vec::new(),
            }],
            analysis_metadata: AnalysisMetadata {
                timestamp: Utc::now(),
                model: None,
                input_length: None,
                token_usage: None,
                transcript_hash: None,
                confidence: 0.9,
            },
            frameworks_detected: None,
            emotional_journey: None,
            language_analysis: None,
        });
        e
    }

    #[test]
    fn messages_are_system_history_then_question() {
        let history = vec![
            ChatMessage::user("¿Qué técnicas usa?"),
            ChatMessage::assistant("Usa escasez."),
        ];
        let corpus = [analyzed("Webinar")];
        let messages = build_grounded_messages(&corpus, &history, "  ¿Y la autoridad? ", 10_000);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages[3].content, "¿Y la autoridad?");
    }

    #[test]
    fn context_includes_overview_and_techniques() {
        let messages = build_grounded_messages(&[analyzed("Webinar")], &[], "q", 10_000);
        let system = &messages[0].content;
        assert!(system.contains("### Webinar"));
        assert!(system.contains("Lanzamiento con urgencia."));
        assert!(system.contains("Escasez (conversion)"));
        assert!(system.contains("Solo quedan diez plazas."));
    }

    #[test]
    fn budget_stops_adding_entries() {
        let corpus = vec![
            entry("Primero", &"a".repeat(100)),
            entry("Segundo", &"b".repeat(100)),
        ];
        let messages = build_grounded_messages(&corpus, &[], "q", 150);
        let system = &messages[0].content;
        assert!(system.contains("Primero"));
        assert!(!system.contains("Segundo"));
    }

    #[test]
    fn oversized_first_entry_is_cut_to_budget() {
        let corpus = vec![entry("Largo", &"x".repeat(1_000))];
        let messages = build_grounded_messages(&corpus, &[], "q", 50);
        assert!(messages[0].content.contains("### Largo"));
        assert!(!messages[0].content.contains(&"x".repeat(100)));
    }

    #[test]
    fn empty_corpus_says_so() {
        let messages = build_grounded_messages(&[], &[], "q", 1_000);
        assert!(messages[0].content.contains("No hay transcripciones"));
    }

    #[test]
    fn corpus_entry_reads_without_analysis() {
        let entry: CorpusEntry =
            serde_json::from_str(r#"{"title": "T", "transcript": "hola"}"#).unwrap();
        assert_eq!(entry.analysis, None);
    }
}
