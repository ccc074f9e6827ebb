//! Command handlers. Each returns the process exit code; only unexpected
//! failures (I/O, configuration) propagate as `anyhow` errors.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use tlens_analysis::{
    process_completion, AnalysisError, CorpusEntry, TranscriptAnalyzer, TranscriptAssistant,
};
use tlens_core::{AppConfig, ValidationMode};
use tokio_util::sync::CancellationToken;

/// Analyze one transcript file and print (or write) the result JSON.
///
/// A degraded analysis still succeeds but is announced on stderr. Completion
/// API failures print the localized message and exit with status 1.
pub(crate) async fn run_analyze(
    config: &AppConfig,
    file: &Path,
    output: Option<&Path>,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    let transcript = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read transcript {}", file.display()))?;
    let analyzer = TranscriptAnalyzer::from_config(config)?;

    let outcome = match analyzer.analyze(&transcript, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => return Ok(report_failure(&err)),
    };

    if let Some(reason) = &outcome.degraded {
        eprintln!("aviso: análisis básico ({}): {reason}", reason.code());
    }

    let json = serde_json::to_string_pretty(&outcome.result)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "analysis written");
        }
        None => println!("{json}"),
    }
    Ok(ExitCode::SUCCESS)
}

/// Run the offline stages (parse/repair, validate, sanitize) over a saved
/// model response.
pub(crate) fn run_check(
    config: &AppConfig,
    file: &Path,
    lenient: bool,
) -> anyhow::Result<ExitCode> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let mode = if lenient {
        ValidationMode::Lenient
    } else {
        config.validation_mode
    };

    match process_completion(&raw, mode) {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}: {err}", err.code());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Answer `question` from the given corpus files.
pub(crate) async fn run_ask(
    config: &AppConfig,
    question: &str,
    corpus_files: &[PathBuf],
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    let corpus = corpus_files
        .iter()
        .map(PathBuf::as_path)
        .map(load_corpus_entry)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let assistant = TranscriptAssistant::from_config(config)?;

    match assistant.reply(&corpus, &[], question, cancel).await {
        Ok(answer) => {
            println!("{answer}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(report_failure(&err)),
    }
}

/// `.json` files hold a serialized [`CorpusEntry`]; anything else is a raw
/// transcript titled after its file stem.
pub(crate) fn load_corpus_entry(path: &Path) -> anyhow::Result<CorpusEntry> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        return serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a corpus entry", path.display()));
    }

    let title = path
        .file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
    Ok(CorpusEntry {
        title,
        transcript: contents,
        analysis: None,
    })
}

fn report_failure(err: &AnalysisError) -> ExitCode {
    tracing::error!(error = %err, "request failed");
    eprintln!("{}", err.user_message());
    ExitCode::FAILURE
}
