//! Shared configuration and domain model for transcript analysis.

pub mod analysis;
pub mod app_config;
pub mod config;

use thiserror::Error;

pub use analysis::{
    AnalysisMetadata, AnalysisResult, AnalysisSummary, DetectedFramework, EmotionalBeat, Evidence,
    LanguageAnalysis, Technique, TechniqueCategory, TokenUsage, UnknownCategory, mean_confidence,
};
pub use app_config::{AppConfig, Environment, ValidationMode};
pub use config::{load_app_config, load_app_config_from_env};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
