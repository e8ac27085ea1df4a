//! # pdf-rag CLI (`pdfrag`)
//!
//! Ask questions about a PDF with a local Ollama model, or serve the same
//! pipeline over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! pdfrag [--config ./pdfrag.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfrag health` | Check that Ollama is reachable |
//! | `pdfrag models` | List installed models |
//! | `pdfrag pull <model>` | Download a model if it is missing |
//! | `pdfrag ask --pdf <file> "<question>"` | Answer one question from a PDF |
//! | `pdfrag chat "<question>"` | Ask the model directly, no document |
//! | `pdfrag repl --pdf <file>` | Interactive questions over one PDF |
//! | `pdfrag serve` | Start the HTTP API |
//!
//! Logs go to stderr (`RUST_LOG`, default `pdf_rag=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use pdf_rag::{commands, config, server};

/// Question answering over PDF documents with a local model server.
#[derive(Parser)]
#[command(
    name = "pdfrag",
    about = "Retrieval-augmented question answering over PDF documents with Ollama",
    version
)]
struct Cli {
    /// Path to a configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check connectivity to the Ollama server.
    Health,

    /// List models installed on the Ollama server.
    Models,

    /// Download a model unless it is already installed.
    Pull {
        /// Model name, e.g. `llama2` or `mistral:7b`.
        model: String,
    },

    /// Answer a single question from a PDF document.
    Ask {
        /// PDF file to load.
        #[arg(long)]
        pdf: PathBuf,

        /// Model to answer with. Defaults to `[ollama].model`.
        #[arg(long)]
        model: Option<String>,

        /// Number of chunks to retrieve. Defaults to `[retrieval].top_k`.
        #[arg(
            short,
            long,
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        k: Option<usize>,

        question: String,
    },

    /// Send a question straight to the model, without a document.
    Chat {
        #[arg(long)]
        model: Option<String>,

        question: String,
    },

    /// Load a PDF and answer questions read from stdin.
    Repl {
        #[arg(long)]
        pdf: PathBuf,

        #[arg(long)]
        model: Option<String>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf_rag=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Health => commands::run_health(&cfg).await?,
        Commands::Models => commands::run_models(&cfg).await?,
        Commands::Pull { model } => commands::run_pull(&cfg, &model).await?,
        Commands::Ask {
            pdf,
            model,
            k,
            question,
        } => commands::run_ask(&cfg, &pdf, model, k, &question).await?,
        Commands::Chat { model, question } => {
            commands::run_chat(&cfg, model, &question).await?
        }
        Commands::Repl { pdf, model } => commands::run_repl(&cfg, &pdf, model).await?,
        Commands::Serve => {
            let embedder = commands::build_embedder(&cfg).await?;
            server::run_server(&cfg, embedder).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<pdf_rag::error::Error>() {
                Some(e) => eprintln!("Error: {}", e.user_message()),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
