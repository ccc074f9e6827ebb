use thiserror::Error;

use crate::retry::{Cancelled, RetrySignal};

/// Errors raised while turning model output into an [`tlens_core::AnalysisResult`].
///
/// These are local, recoverable conditions: the pipeline catches them and
/// substitutes a fallback result instead of failing the user-facing call.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("empty response from model")]
    EmptyResponse,

    #[error("response is missing required fields: summary and techniques")]
    MissingFields { raw: serde_json::Value },

    #[error("summary is missing its overview")]
    MissingSummary,

    #[error("techniques must be an array")]
    InvalidTechniques { raw: serde_json::Value },

    #[error("response contains no techniques")]
    NoTechniques,

    /// `index` is 1-based.
    #[error("technique {index} is missing required field `{field}`")]
    InvalidTechnique { index: usize, field: &'static str },

    #[error("technique {index} has invalid confidence {value} (expected a number in [0, 1])")]
    InvalidConfidence { index: usize, value: String },

    #[error("technique {index} has invalid category {category:?}")]
    InvalidCategory { index: usize, category: String },

    #[error("malformed JSON in model response: {reason}")]
    MalformedJson { raw: String, reason: String },
}

impl ResponseError {
    /// Stable machine-readable code for logs and API consumers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ResponseError::EmptyResponse => "EMPTY_RESPONSE",
            ResponseError::MissingFields { .. } => "MISSING_FIELDS",
            ResponseError::MissingSummary => "MISSING_SUMMARY",
            ResponseError::InvalidTechniques { .. } => "INVALID_TECHNIQUES",
            ResponseError::NoTechniques => "NO_TECHNIQUES",
            ResponseError::InvalidTechnique { .. } => "INVALID_TECHNIQUE",
            ResponseError::InvalidConfidence { .. } => "INVALID_CONFIDENCE",
            ResponseError::InvalidCategory { .. } => "INVALID_CATEGORY",
            ResponseError::MalformedJson { .. } => "MALFORMED_JSON",
        }
    }
}

/// Errors surfaced by the chat-completion client, the analyzer, and the assistant.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The completion API answered with a non-2xx status.
    #[error("completion API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("completion API returned no message content")]
    EmptyCompletion,

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for AnalysisError {
    fn from(_: Cancelled) -> Self {
        AnalysisError::Cancelled
    }
}

impl RetrySignal for AnalysisError {
    fn status(&self) -> Option<u16> {
        match self {
            AnalysisError::Status { status, .. } => Some(*status),
            AnalysisError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn is_transport(&self) -> bool {
        match self {
            AnalysisError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl AnalysisError {
    /// Localized message suitable for showing to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::Status { status: 401 | 403, .. } => {
                "La clave de API no es válida o no tiene permisos para este modelo.".to_string()
            }
            AnalysisError::Status { status: 429, .. } => {
                "Se alcanzó el límite de solicitudes del servicio de IA. \
                 Inténtalo de nuevo en unos minutos."
                    .to_string()
            }
            AnalysisError::Status { status, .. } if *status >= 500 => format!(
                "El servicio de IA no está disponible en este momento (HTTP {status}). \
                 Inténtalo más tarde."
            ),
            AnalysisError::Status { status, message } => {
                format!("El servicio de IA rechazó la solicitud (HTTP {status}): {message}")
            }
            AnalysisError::Http(e) if e.is_timeout() => {
                "La solicitud al servicio de IA tardó demasiado. Inténtalo de nuevo.".to_string()
            }
            AnalysisError::Http(_) => {
                "No se pudo conectar con el servicio de IA. Revisa tu conexión a internet."
                    .to_string()
            }
            AnalysisError::EmptyCompletion | AnalysisError::Deserialize { .. } => {
                "El servicio de IA devolvió una respuesta vacía o inesperada.".to_string()
            }
            AnalysisError::InvalidInput(reason) => format!("Entrada no válida: {reason}"),
            AnalysisError::Config(reason) => format!("Configuración incompleta: {reason}"),
            AnalysisError::Cancelled => "El análisis fue cancelado.".to_string(),
        }
    }
}
