//! # pdf-rag
//!
//! Ask questions about a PDF document using a locally hosted model server
//! (Ollama).
//!
//! A document is extracted page by page, normalized, cut into overlapping
//! chunks and embedded once into an in-memory vector index. Each question
//! retrieves the most similar chunks, fits them into the model's context
//! budget and asks the model to answer from that context only.
//!
//! ## Architecture
//!
//! ```text
//!  PDF ─▶ extract ─▶ normalize ─▶ chunk ─▶ embedding ─▶ VectorIndex
//!                                                          │
//!  question ─▶ QueryEngine ─▶ search ─▶ prompt ─▶ Generator (Ollama)
//!                                                          │
//!                 ModelManager: wait for backend, pull model on demand
//!
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │ (pdfrag) │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdfrag health                              # is Ollama reachable?
//! pdfrag ask --pdf report.pdf "What are the main conclusions?"
//! pdfrag repl --pdf report.pdf               # interactive questions
//! pdfrag serve                               # HTTP API on 0.0.0.0:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`normalize`] | Extracted-text cleanup |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`ollama`] | Ollama HTTP client |
//! | [`availability`] | Backend readiness and model provisioning |
//! | [`prompt`] | Prompt templates and token budgeting |
//! | [`engine`] | Retrieval-augmented query engine |
//! | [`extract`] | PDF text extraction |
//! | [`session`] | Document session and question history |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |

pub mod availability;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod models;
pub mod normalize;
pub mod ollama;
pub mod prompt;
pub mod server;
pub mod session;
