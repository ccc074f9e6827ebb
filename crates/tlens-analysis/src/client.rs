//! HTTP client for OpenAI-compatible chat-completion APIs.
//!
//! Wraps `reqwest` with bearer authentication, a normalized base URL, and
//! typed errors: non-2xx responses surface as [`AnalysisError::Status`] so the
//! retry controller can classify them.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tlens_core::TokenUsage;

use crate::error::AnalysisError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl ResponseFormat {
    #[must_use]
    pub fn json_object() -> Self {
        Self {
            kind: "json_object",
        }
    }
}

/// The assistant message of a completion plus provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<UsageBody>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Client for a chat-completion endpoint.
///
/// Use [`ChatClient::new`] for the configured API or
/// [`ChatClient::with_base_url`] to point at a mock server in tests.
pub struct ChatClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl ChatClient {
    /// Creates a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`AnalysisError::Config`] if `base_url`
    /// is not a valid URL or the key is blank.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, AnalysisError> {
        if api_key.trim().is_empty() {
            return Err(AnalysisError::Config("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("tlens/0.1 (transcript-analysis)")
            .build()?;

        // Exactly one trailing slash so `join` appends instead of replacing
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| AnalysisError::Config(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
        })
    }

    /// Creates a client pointed at the public `OpenAI` API.
    ///
    /// # Errors
    ///
    /// See [`ChatClient::with_base_url`].
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self, AnalysisError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    fn completions_url(&self) -> Result<Url, AnalysisError> {
        self.base_url
            .join("chat/completions")
            .map_err(|e| AnalysisError::Config(format!("cannot build completions URL: {e}")))
    }

    /// Sends one completion request. Makes exactly one HTTP call; wrap it in
    /// [`crate::retry::retry_with_backoff`] for transient-failure handling.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::Http`] on network failure.
    /// - [`AnalysisError::Status`] on a non-2xx response.
    /// - [`AnalysisError::Deserialize`] if the body is not a completion envelope.
    /// - [`AnalysisError::EmptyCompletion`] if the first choice has no content.
    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion, AnalysisError> {
        let url = self.completions_url()?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|e| AnalysisError::Deserialize {
                context: "chat completion response".to_string(),
                source: e,
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AnalysisError::EmptyCompletion)?;

        Ok(Completion {
            content,
            model: parsed.model,
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

/// Pulls `error.message` out of an error envelope, falling back to a prefix of
/// the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_appends_to_base_path() {
        let client = ChatClient::with_base_url("k", 30, "https://api.openai.com/v1").unwrap();
        assert_eq!(
            client.completions_url().unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn new_targets_public_api() {
        let client = ChatClient::new("k", 30).unwrap();
        assert_eq!(
            client.completions_url().unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn completions_url_tolerates_trailing_slash() {
        let client = ChatClient::with_base_url("k", 30, "http://localhost:8080/v1/").unwrap();
        assert_eq!(
            client.completions_url().unwrap().as_str(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn blank_api_key_is_rejected() {
        assert!(matches!(
            ChatClient::with_base_url("  ", 30, "http://localhost"),
            Err(AnalysisError::Config(_))
        ));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            ChatClient::with_base_url("k", 30, "not a url"),
            Err(AnalysisError::Config(_))
        ));
    }

    #[test]
    fn error_message_prefers_envelope_message() {
        assert_eq!(
            error_message(r#"{"error": {"message": "Incorrect API key", "type": "auth"}}"#),
            "Incorrect API key"
        );
        assert_eq!(error_message(r#"{"error": "overloaded"}"#), "overloaded");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn request_serializes_response_format() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.2,
            max_tokens: 10,
            response_format: Some(ResponseFormat::json_object()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
