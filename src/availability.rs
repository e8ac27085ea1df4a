//! Model availability: readiness polling, presence check, pull-on-demand.
//!
//! The model server often starts after this process and may not have the
//! requested model installed. [`ModelManager::ensure_model`] drives one
//! model through the following states:
//!
//! ```text
//! Unknown ─► Checking ─┬─► Available                        (already installed)
//!                      ├─► Missing ─► Provisioning ─┬─► Available
//!                      │                            └─► ProvisionFailed
//!                      └─► Unreachable              (backend never came up)
//! ```
//!
//! State is kept in memory per model for status reporting only.
//!
//! Concurrent `ensure_model` calls for one model are single-flight: the
//! first caller checks and pulls, later callers wait for it and reuse its
//! result when it left the model available.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::AvailabilityConfig;
use crate::error::{Error, Result};
use crate::ollama::{OllamaClient, PullProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unknown,
    Checking,
    Available,
    Missing,
    Provisioning,
    ProvisionFailed,
    Unreachable,
}

/// How [`ModelManager::ensure_model`] satisfied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyPresent,
    Pulled,
}

/// Strip the implicit `:latest` tag.
fn base_name(name: &str) -> &str {
    name.strip_suffix(":latest").unwrap_or(name)
}

/// Whether a listed model name satisfies the requested one.
///
/// Strict by default: names are equal once the default `:latest` tag is
/// removed from both, so `llama2` matches `llama2:latest` but not
/// `llama2-uncensored:latest`. With `legacy_substring` the listed name only
/// has to contain the requested one.
pub fn model_matches(requested: &str, listed: &str, legacy_substring: bool) -> bool {
    if legacy_substring {
        return listed.contains(requested);
    }
    base_name(requested) == base_name(listed)
}

pub struct ModelManager {
    client: OllamaClient,
    poll_interval: Duration,
    pull_timeout: Duration,
    legacy_substring: bool,
    states: Mutex<HashMap<String, ModelState>>,
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ModelManager {
    pub fn new(client: OllamaClient, config: &AvailabilityConfig) -> Self {
        Self {
            client,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            pull_timeout: Duration::from_secs(config.pull_timeout_secs),
            legacy_substring: config.legacy_substring_match,
            states: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Last known state of `model`; [`ModelState::Unknown`] if never checked.
    pub fn state(&self, model: &str) -> ModelState {
        self.states
            .lock()
            .map(|states| states.get(model).copied().unwrap_or(ModelState::Unknown))
            .unwrap_or(ModelState::Unknown)
    }

    fn set_state(&self, model: &str, state: ModelState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(model.to_string(), state);
        }
    }

    /// Per-model lock held while a model is checked and provisioned.
    fn gate(&self, model: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.gates.lock() {
            Ok(mut gates) => gates.entry(model.to_string()).or_default().clone(),
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Poll the backend until it answers or `timeout` elapses.
    ///
    /// Connection failures and error statuses are retried, never returned.
    pub async fn wait_for_backend(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.client.probe().await {
                Ok(()) => {
                    tracing::info!(url = self.client.base_url(), attempts, "model backend is up");
                    return true;
                }
                Err(e) => {
                    tracing::debug!(attempts, error = %e, "backend probe failed");
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::warn!(
                    url = self.client.base_url(),
                    ?timeout,
                    "model backend did not become ready"
                );
                return false;
            }
            if attempts == 1 {
                tracing::info!(url = self.client.base_url(), "waiting for model backend");
            }
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Whether `model` is installed on the backend.
    pub async fn is_model_present(&self, model: &str) -> Result<bool> {
        let models = self.client.list_models().await?;
        Ok(models
            .iter()
            .any(|m| model_matches(model, &m.name, self.legacy_substring)))
    }

    /// Installed model names with the `:latest` tag stripped.
    pub async fn available_models(&self) -> Result<Vec<String>> {
        let models = self.client.list_models().await?;
        Ok(models
            .iter()
            .map(|m| base_name(&m.name).to_string())
            .collect())
    }

    /// Download `model`, bounded by the pull timeout.
    pub async fn pull_model(&self, model: &str) -> Result<()> {
        tracing::info!(model, "pulling model");
        let mut last_status = String::new();
        let log_progress = |p: &PullProgress| {
            if p.status != last_status {
                tracing::info!(model, status = %p.status, "pull progress");
                last_status = p.status.clone();
            }
            if let (Some(total), Some(completed)) = (p.total, p.completed) {
                tracing::debug!(model, completed, total, "pull bytes");
            }
        };

        match tokio::time::timeout(self.pull_timeout, self.client.pull(model, log_progress)).await
        {
            Ok(Ok(())) => {
                tracing::info!(model, "model pulled");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::provision(
                model,
                format!("pull timed out after {}s", self.pull_timeout.as_secs()),
            )),
        }
    }

    /// Make sure `model` can serve requests, pulling it if needed.
    ///
    /// Waits up to `timeout` for the backend first. Calling this for a model
    /// that is already installed performs no pull. A caller that arrives
    /// while another is provisioning the same model waits for it instead of
    /// starting a second pull.
    pub async fn ensure_model(&self, model: &str, timeout: Duration) -> Result<EnsureOutcome> {
        let gate = self.gate(model);
        let _guard = match gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(model, "waiting for in-flight provisioning");
                let guard = gate.lock().await;
                if self.state(model) == ModelState::Available {
                    return Ok(EnsureOutcome::AlreadyPresent);
                }
                guard
            }
        };

        self.set_state(model, ModelState::Checking);

        if !self.wait_for_backend(timeout).await {
            self.set_state(model, ModelState::Unreachable);
            return Err(Error::unavailable(
                self.client.base_url(),
                format!("not ready after {}s", timeout.as_secs()),
            ));
        }

        match self.is_model_present(model).await {
            Ok(true) => {
                tracing::info!(model, "model available");
                self.set_state(model, ModelState::Available);
                return Ok(EnsureOutcome::AlreadyPresent);
            }
            Ok(false) => {
                tracing::warn!(model, "model not installed");
                self.set_state(model, ModelState::Missing);
            }
            Err(e) => {
                self.set_state(model, ModelState::Unreachable);
                return Err(e);
            }
        }

        self.set_state(model, ModelState::Provisioning);
        match self.pull_model(model).await {
            Ok(()) => {
                self.set_state(model, ModelState::Available);
                Ok(EnsureOutcome::Pulled)
            }
            Err(e) => {
                tracing::warn!(model, error = %e, "model pull failed");
                self.set_state(model, ModelState::ProvisionFailed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_stripped_match() {
        assert!(model_matches("llama2", "llama2:latest", false));
        assert!(model_matches("llama2:latest", "llama2", false));
        assert!(model_matches("mistral:7b", "mistral:7b", false));
    }

    #[test]
    fn test_strict_match_rejects_prefix_models() {
        assert!(!model_matches("llama2", "llama2-uncensored:latest", false));
        assert!(!model_matches("llama2", "llama2:13b", false));
        assert!(!model_matches("mistral", "llama2:latest", false));
    }

    #[test]
    fn test_legacy_substring_match() {
        assert!(model_matches("llama2", "llama2-uncensored:latest", true));
        assert!(model_matches("llama2", "llama2:latest", true));
        assert!(!model_matches("mistral", "llama2:latest", true));
    }

    #[test]
    fn test_unknown_state_before_check() {
        let client = OllamaClient::new(&crate::config::OllamaConfig::default()).unwrap();
        let manager = ModelManager::new(client, &AvailabilityConfig::default());
        assert_eq!(manager.state("llama2"), ModelState::Unknown);
    }
}
