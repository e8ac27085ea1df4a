//! Retrieval-augmented query engine.
//!
//! ```text
//! question ─► VectorIndex::search (top-k) ─► join + truncate_to_budget
//!          ─► build_rag_prompt ─► Generator::generate ─► Answer { text, sources }
//! ```
//!
//! The engine never retries: backend and generation failures are returned
//! to the caller unchanged.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::models::ScoredChunk;
use crate::prompt::{build_rag_prompt, estimate_tokens, truncate_to_budget};

/// Prompt → completion capability.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Model output, verbatim.
    pub text: String,
    pub sources: Vec<ScoredChunk>,
    /// Whether the context was cut to fit the token budget.
    pub truncated: bool,
}

pub struct QueryEngine {
    generator: Arc<dyn Generator>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_context_tokens: usize,
}

impl QueryEngine {
    pub fn new(
        generator: Arc<dyn Generator>,
        embedder: Arc<dyn EmbeddingProvider>,
        max_context_tokens: usize,
    ) -> Self {
        Self {
            generator,
            embedder,
            max_context_tokens,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Top-`k` chunks for `question`. `k` must be at least 1.
    pub async fn retrieve(
        &self,
        question: &str,
        index: &VectorIndex,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let question = validate_question(question)?;
        if k == 0 {
            return Err(Error::InvalidInput("k must be at least 1".to_string()));
        }
        index.search(question, k, self.embedder.as_ref()).await
    }

    /// Prompt the model with already-retrieved `sources`.
    ///
    /// An empty `sources` list is [`Error::EmptyIndex`]; the model is never
    /// asked without context.
    pub async fn generate_answer(
        &self,
        question: &str,
        sources: Vec<ScoredChunk>,
        model: &str,
    ) -> Result<Answer> {
        let question = validate_question(question)?;
        if sources.is_empty() {
            return Err(Error::EmptyIndex);
        }
        let joined = sources
            .iter()
            .map(|s| s.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let (context, truncated) = truncate_to_budget(&joined, self.max_context_tokens);
        if truncated {
            tracing::debug!(
                budget = self.max_context_tokens,
                kept = estimate_tokens(&context),
                "context truncated"
            );
        }

        let prompt = build_rag_prompt(question, &context);
        let text = self.generator.generate(model, &prompt).await?;

        Ok(Answer {
            text,
            sources,
            truncated,
        })
    }

    /// Retrieve, then generate.
    pub async fn answer(
        &self,
        question: &str,
        index: &VectorIndex,
        model: &str,
        k: usize,
    ) -> Result<Answer> {
        let sources = self.retrieve(question, index, k).await?;
        self.generate_answer(question, sources, model).await
    }

    /// Context-free mode: the question goes to the model as-is.
    pub async fn chat(&self, question: &str, model: &str) -> Result<String> {
        let question = validate_question(question)?;
        self.generator.generate(model, question).await
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("question must not be empty".to_string()));
    }
    Ok(trimmed)
}
