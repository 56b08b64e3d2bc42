//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use grounded_core::Status;
use grounded_runtime::providers::ProviderRegistry;
use grounded_runtime::{
    AnswerOptions, AnswerOrchestrator, AnswerReport, InMemoryEvidenceStore, RuntimeConfig,
    RuntimeError,
};

use crate::ProviderKind;

/// Exit code when any question ended Failed.
const EXIT_FAILED: u8 = 2;

/// Exit code after Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

pub struct AskArgs {
    pub questions: Vec<String>,
    pub chunks: PathBuf,
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub k: Option<usize>,
    pub max_retries: Option<u32>,
    pub json: bool,
}

pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let config = RuntimeConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Invalid configuration from environment".to_string(),
    })?;
    Ok(config)
}

fn load_store(chunks: &Path) -> Result<InMemoryEvidenceStore> {
    InMemoryEvidenceStore::from_jsonl_file(chunks)
        .with_context(|| format!("Failed to load chunks from {}", chunks.display()))
}

pub async fn ask(mut config: RuntimeConfig, args: AskArgs) -> Result<ExitCode> {
    if let Some(model) = args.model {
        config.generation.model = model;
    }
    if let Some(k) = args.k {
        config.retrieval.k = k;
    }
    if let Some(max_retries) = args.max_retries {
        config.control.max_retries = max_retries;
    }

    let store = load_store(&args.chunks)?;
    if store.is_empty() {
        tracing::warn!(file = %args.chunks.display(), "Chunks file is empty");
    }

    let provider = ProviderRegistry::with_defaults()
        .create(args.provider.as_str(), &serde_json::json!({}))
        .with_context(|| format!("Failed to create provider '{}'", args.provider.as_str()))?;
    if !provider.health_check().await {
        tracing::warn!(provider = provider.name(), "Provider health check failed");
    }

    let orchestrator = AnswerOrchestrator::builder()
        .store(Arc::new(store))
        .provider(provider)
        .config(config)
        .build()
        .context("Failed to build orchestrator")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let runs = args.questions.iter().map(|question| {
        orchestrator.answer_with_cancel(question.as_str(), AnswerOptions::default(), &cancel)
    });
    let outcomes = futures::future::join_all(runs).await;

    let mut reports = Vec::with_capacity(outcomes.len());
    for (question, outcome) in args.questions.iter().zip(outcomes) {
        match outcome {
            Ok(report) => reports.push((question.as_str(), report)),
            Err(RuntimeError::Cancelled) => {
                eprintln!("Cancelled.");
                return Ok(ExitCode::from(EXIT_CANCELLED));
            }
            Err(e) => return Err(e).with_context(|| format!("Could not answer '{}'", question)),
        }
    }

    if args.json {
        print_json(&reports)?;
    } else {
        print_text(&reports);
    }

    let any_failed = reports
        .iter()
        .any(|(_, report)| report.result.status == Status::Failed);
    Ok(if any_failed {
        ExitCode::from(EXIT_FAILED)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_json(reports: &[(&str, AnswerReport)]) -> Result<()> {
    let entries: Vec<serde_json::Value> = reports
        .iter()
        .map(|(question, report)| {
            serde_json::json!({
                "question": question,
                "result": report.result,
                "sources": report.result.sources(),
                "llm_usage": report.llm_usage,
            })
        })
        .collect();

    let output = if entries.len() == 1 {
        serde_json::to_string_pretty(&entries[0])?
    } else {
        serde_json::to_string_pretty(&entries)?
    };
    println!("{}", output);
    Ok(())
}

fn print_text(reports: &[(&str, AnswerReport)]) {
    for (index, (question, report)) in reports.iter().enumerate() {
        if index > 0 {
            println!("\n---\n");
        }
        if reports.len() > 1 {
            println!("Q: {}\n", question);
        }
        println!("{}", report.result.render());

        let result = &report.result;
        let mut footer = format!("[{}, {} retries", result.status, result.retries);
        if report.llm_usage.llm_calls > 0 {
            footer.push_str(&format!(
                ", {} LLM calls, {} tokens",
                report.llm_usage.llm_calls, report.llm_usage.total_tokens
            ));
        }
        footer.push(']');
        println!("\n{}", footer);
    }
}

pub fn stats(chunks: &Path, json: bool) -> Result<ExitCode> {
    let stats = load_store(chunks)?.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Chunks:  {}", stats.chunks);
        println!("Sources: {}", stats.sources);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn show_config(config: &RuntimeConfig) -> Result<ExitCode> {
    print!("{}", config.to_yaml()?);
    Ok(ExitCode::SUCCESS)
}
