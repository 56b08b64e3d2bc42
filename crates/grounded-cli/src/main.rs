//! # grounded CLI
//!
//! Answer questions over a pre-chunked document set, rejecting drafts the
//! evidence does not support.
//!
//! ## Usage
//!
//! ```bash
//! # Ask with a local Ollama model
//! grounded ask "What is the capital?" --chunks chunks.jsonl
//!
//! # Several questions at once, JSON output
//! grounded ask "Q1" "Q2" --chunks chunks.jsonl --json
//!
//! # Inspect the corpus and the effective configuration
//! grounded stats --chunks chunks.jsonl
//! grounded config --config grounded.yaml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod commands;

/// Evidence-grounded question answering
#[derive(Parser, Debug)]
#[command(name = "grounded", version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Completion backends compiled into this binary.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ProviderKind {
    /// Local models served by Ollama
    Ollama,
    /// Anthropic Messages API (needs ANTHROPIC_API_KEY)
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer one or more questions
    Ask {
        /// Questions to answer (run concurrently)
        #[arg(value_name = "QUESTION", required = true)]
        questions: Vec<String>,

        /// Chunks file, one JSON object per line: {"text", "source", "page"}
        #[arg(long, value_name = "FILE")]
        chunks: PathBuf,

        /// Completion backend
        #[arg(long, value_enum, default_value = "ollama")]
        provider: ProviderKind,

        /// Model name (overrides CHAT_MODEL and the config file)
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Chunks to retrieve per question
        #[arg(long, short = 'k', value_name = "COUNT")]
        k: Option<usize>,

        /// Maximum validation retries
        #[arg(long, value_name = "COUNT")]
        max_retries: Option<u32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show chunk and source counts for a chunks file
    Stats {
        /// Chunks file
        #[arg(long, value_name = "FILE")]
        chunks: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask {
            questions,
            chunks,
            provider,
            model,
            k,
            max_retries,
            json,
        } => {
            let args = commands::AskArgs {
                questions,
                chunks,
                provider,
                model,
                k,
                max_retries,
                json,
            };
            commands::ask(config, args).await
        }
        Commands::Stats { chunks, json } => commands::stats(&chunks, json),
        Commands::Config => commands::show_config(&config),
    }
}
