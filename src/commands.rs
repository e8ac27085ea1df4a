//! Implementations of the `pdfrag` subcommands.
//!
//! Results go to stdout; progress and diagnostics go through `tracing` to
//! stderr.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::availability::{EnsureOutcome, ModelManager};
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::engine::{Answer, QueryEngine};
use crate::models::DocumentInfo;
use crate::ollama::OllamaClient;
use crate::server::SOURCE_PREVIEW_CHARS;
use crate::session::SessionHandle;

/// Construct the configured embedding provider on the blocking pool.
pub async fn build_embedder(cfg: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = cfg.embedding.clone();
    let default_url = cfg.ollama.url.clone();
    let provider = tokio::task::spawn_blocking(move || create_provider(&embedding, &default_url))
        .await
        .context("embedding provider initialisation panicked")??;
    Ok(provider)
}

fn client(cfg: &Config) -> Result<OllamaClient> {
    Ok(OllamaClient::new(&cfg.ollama)?)
}

pub async fn run_health(cfg: &Config) -> Result<()> {
    let client = client(cfg)?;
    match client.probe().await {
        Ok(()) => println!("Ollama: connected ({})", client.base_url()),
        Err(e) => {
            println!("Ollama: disconnected ({})", client.base_url());
            return Err(e.into());
        }
    }
    Ok(())
}

pub async fn run_models(cfg: &Config) -> Result<()> {
    let manager = ModelManager::new(client(cfg)?, &cfg.availability);
    let models = manager.available_models().await?;
    if models.is_empty() {
        println!("No models installed. Try: pdfrag pull {}", cfg.ollama.model);
    }
    for name in models {
        println!("{}", name);
    }
    Ok(())
}

pub async fn run_pull(cfg: &Config, model: &str) -> Result<()> {
    let manager = ModelManager::new(client(cfg)?, &cfg.availability);
    match manager
        .ensure_model(model, cfg.availability.wait_timeout())
        .await?
    {
        EnsureOutcome::AlreadyPresent => println!("Model '{}' is already installed.", model),
        EnsureOutcome::Pulled => println!("Model '{}' pulled.", model),
    }
    Ok(())
}

pub async fn run_chat(cfg: &Config, model: Option<String>, question: &str) -> Result<()> {
    let model = model.unwrap_or_else(|| cfg.ollama.model.clone());
    let client = client(cfg)?;
    ModelManager::new(client.clone(), &cfg.availability)
        .ensure_model(&model, cfg.availability.wait_timeout())
        .await?;

    let engine = QueryEngine::new(
        Arc::new(client),
        Arc::new(crate::embedding::DisabledProvider),
        cfg.retrieval.max_context_tokens,
    );
    println!("{}", engine.chat(question, &model).await?);
    Ok(())
}

/// Wait for the model, then load `pdf` into a fresh session.
async fn open_session(
    cfg: &Config,
    pdf: &Path,
    model: &str,
) -> Result<(SessionHandle, DocumentInfo)> {
    let client = client(cfg)?;
    ModelManager::new(client.clone(), &cfg.availability)
        .ensure_model(model, cfg.availability.wait_timeout())
        .await?;

    let embedder = build_embedder(cfg).await?;
    let engine = Arc::new(QueryEngine::new(
        Arc::new(client),
        embedder,
        cfg.retrieval.max_context_tokens,
    ));
    let session = SessionHandle::new(
        engine,
        cfg.chunking.chunk_size,
        cfg.chunking.overlap,
        cfg.embedding.batch_size,
        cfg.session.history_limit,
    );

    let bytes = tokio::fs::read(pdf)
        .await
        .with_context(|| format!("Failed to read {}", pdf.display()))?;
    let name = pdf
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    let info = session.load(&name, bytes).await?;
    Ok((session, info))
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text.trim());
    if answer.sources.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (i, source) in answer.sources.iter().enumerate() {
        println!(
            "  [{}] page {} (score {:.3})",
            i + 1,
            source.chunk.source_page + 1,
            source.score
        );
        println!("      {}", source.preview(SOURCE_PREVIEW_CHARS));
    }
    if answer.truncated {
        println!("(context truncated to fit the model's budget)");
    }
}

pub async fn run_ask(
    cfg: &Config,
    pdf: &Path,
    model: Option<String>,
    k: Option<usize>,
    question: &str,
) -> Result<()> {
    let model = model.unwrap_or_else(|| cfg.ollama.model.clone());
    let k = k.unwrap_or(cfg.retrieval.top_k);
    let (session, _info) = open_session(cfg, pdf, &model).await?;
    let answer = session.ask(question, &model, k).await?;
    print_answer(&answer);
    Ok(())
}

/// Interactive question loop over one document.
///
/// `/history` lists recent questions, `/quit` (or end of input) exits.
pub async fn run_repl(cfg: &Config, pdf: &Path, model: Option<String>) -> Result<()> {
    let model = model.unwrap_or_else(|| cfg.ollama.model.clone());
    let (session, info) = open_session(cfg, pdf, &model).await?;
    println!(
        "Loaded {} ({} pages, {} chunks). Model: {}",
        info.name, info.pages, info.chunks, model
    );
    println!("Type a question, /history, or /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for entry in session.history(cfg.session.history_limit).await {
                    println!("  {}  {}", entry.asked_at.format("%H:%M"), entry.question);
                }
            }
            question => match session.ask(question, &model, cfg.retrieval.top_k).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => eprintln!("Error: {}", e.user_message()),
            },
        }
    }

    Ok(())
}
