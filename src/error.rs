//! Error taxonomy for the retrieval pipeline.
//!
//! Every fallible operation of the pipeline returns [`Result`] so callers
//! can tell "not yet available" (retry later) apart from "permanently
//! failed". Connection failures while polling the backend for readiness are
//! the one place where errors are absorbed; see
//! [`ModelManager::wait_for_backend`](crate::availability::ModelManager::wait_for_backend).

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid chunking, retrieval or provider parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding provider failed or returned malformed vectors.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// `search` was called before `build` or after `reset`.
    #[error("no document is indexed; load a document first")]
    EmptyIndex,

    /// The model server could not be reached, or did not come up in time.
    #[error("model backend unavailable at {url}: {reason}")]
    BackendUnavailable { url: String, reason: String },

    /// The model server answered with a non-success status.
    #[error("generation with model '{model}' failed (HTTP {status}): {body}")]
    Generation {
        model: String,
        status: u16,
        body: String,
    },

    /// Pulling a model did not complete successfully.
    #[error("provisioning model '{model}' failed: {reason}")]
    ProvisionFailed { model: String, reason: String },

    /// The document could not be turned into text.
    #[error("text extraction failed: {0}")]
    Extract(String),

    /// Caller input rejected before any work was done.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub(crate) fn unavailable(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::BackendUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn provision(model: impl Into<String>, reason: impl ToString) -> Self {
        Error::ProvisionFailed {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    /// Machine-readable code used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) | Error::InvalidInput(_) | Error::Extract(_) => "bad_request",
            Error::Embedding(_) => "embedding_failed",
            Error::EmptyIndex => "empty_index",
            Error::BackendUnavailable { .. } => "backend_unavailable",
            Error::Generation { .. } => "generation_failed",
            Error::ProvisionFailed { .. } => "provision_failed",
        }
    }

    /// True when retrying later may succeed without any change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendUnavailable { .. })
    }

    /// Short human-readable message for the CLI.
    pub fn user_message(&self) -> String {
        match self {
            Error::EmptyIndex => "No document loaded. Analyse a PDF first.".to_string(),
            Error::BackendUnavailable { url, .. } => format!(
                "Ollama is not reachable at {}. Check that it is running, then retry.",
                url
            ),
            Error::Generation { model, status, .. } => {
                format!("Model '{}' failed to answer (HTTP {}).", model, status)
            }
            Error::ProvisionFailed { model, reason } => {
                format!("Could not download model '{}': {}", model, reason)
            }
            other => other.to_string(),
        }
    }
}
