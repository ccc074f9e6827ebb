use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "tlens")]
#[command(about = "Analyze persuasion techniques in video transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Analyze a transcript file with the configured model
    Analyze {
        /// Plain-text transcript
        file: PathBuf,
        /// Write the result JSON here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Validate and sanitize a saved model response without calling the API
    Check {
        /// Raw model output (JSON, possibly fenced or malformed)
        file: PathBuf,
        /// Drop invalid techniques instead of rejecting the response
        #[arg(long)]
        lenient: bool,
    },
    /// Ask a question grounded in one or more transcripts
    Ask {
        question: String,
        /// `.json` corpus entries or plain-text transcripts
        #[arg(long = "corpus", required = true, num_args = 1..)]
        corpus: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = tlens_core::load_app_config_from_env()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; cancelling");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Commands::Analyze { file, output } => {
            commands::run_analyze(&config, &file, output.as_deref(), &cancel).await
        }
        Commands::Check { file, lenient } => commands::run_check(&config, &file, lenient),
        Commands::Ask { question, corpus } => {
            commands::run_ask(&config, &question, &corpus, &cancel).await
        }
    }
}
