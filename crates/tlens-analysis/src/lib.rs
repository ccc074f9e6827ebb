//! Reliability layer around LLM transcript analysis: retry with back-off,
//! structural validation, and sanitization/repair of model output.

pub mod assistant;
pub mod client;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod repair;
pub mod retry;
pub mod sanitize;
pub mod validate;

pub use assistant::{build_grounded_messages, CorpusEntry, TranscriptAssistant};
pub use client::{ChatClient, ChatMessage, ChatRequest, Completion, Role};
pub use error::{AnalysisError, ResponseError};
pub use pipeline::{
    fallback_result, process_completion, transcript_hash, AnalysisOutcome, TranscriptAnalyzer,
};
pub use repair::{parse_model_output, repair_json};
pub use retry::{is_fatal, is_retryable, retry_with_backoff, Cancelled, RetryPolicy, RetrySignal};
pub use sanitize::{clean_text, sanitize_response};
pub use validate::{validate_response, validate_technique};
