//! HTTP client for the Ollama model server.
//!
//! Covers the endpoints the pipeline uses for generation and provisioning:
//!
//! | Endpoint | Method | Used by |
//! |----------|--------|---------|
//! | `/api/tags` | `GET` | [`OllamaClient::probe`], [`OllamaClient::list_models`] |
//! | `/api/generate` | `POST` | [`OllamaClient::generate`] (the [`Generator`] impl) |
//! | `/api/pull` | `POST` | [`OllamaClient::pull`] (streamed NDJSON progress) |
//!
//! Embeddings go through [`crate::embedding::OllamaProvider`] instead.
//!
//! Every request carries its own timeout. Connection failures and timeouts
//! map to [`Error::BackendUnavailable`]; a non-success status from
//! `/api/generate` maps to [`Error::Generation`] with the response body.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::OllamaConfig;
use crate::engine::Generator;
use crate::error::{Error, Result};

/// One entry of the `/api/tags` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

/// One line of the `/api/pull` progress stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    pub digest: Option<String>,
    pub total: Option<u64>,
    pub completed: Option<u64>,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    temperature: Option<f64>,
    generate_timeout: Duration,
    list_timeout: Duration,
    probe_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Configuration(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            generate_timeout: Duration::from_secs(config.generate_timeout_secs),
            list_timeout: Duration::from_secs(config.list_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn unavailable(&self, err: impl ToString) -> Error {
        Error::unavailable(&self.base_url, err)
    }

    /// Single readiness probe: `GET /api/tags` must answer 200 within the
    /// probe timeout.
    pub async fn probe(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.unavailable(format!("probe returned HTTP {}", response.status())))
        }
    }

    /// Raw `models` array from `/api/tags`, objects passed through untouched.
    pub async fn list_models_raw(&self) -> Result<Vec<serde_json::Value>> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.list_timeout)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("model listing returned HTTP {}", status)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid model listing: {}", e)))?;

        Ok(json
            .get("models")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let raw = self.list_models_raw().await?;
        Ok(raw
            .into_iter()
            .filter_map(|v| serde_json::from_value::<ModelInfo>(v).ok())
            .collect())
    }

    /// Non-streaming completion via `/api/generate`.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: self
                .temperature
                .map(|temperature| GenerateOptions { temperature }),
        };

        tracing::debug!(model, prompt_chars = prompt.chars().count(), "generate request");

        let response = self
            .client
            .post(self.url("/api/generate"))
            .timeout(self.generate_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation {
                model: model.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| Error::Generation {
            model: model.to_string(),
            status: status.as_u16(),
            body: format!("unreadable response: {}", e),
        })?;

        parsed.response.ok_or_else(|| Error::Generation {
            model: model.to_string(),
            status: status.as_u16(),
            body: "response field missing".to_string(),
        })
    }

    /// Pull `model`, feeding each progress line to `on_progress`.
    ///
    /// Succeeds only once a line with status `"success"` arrives. An `error`
    /// line, a non-success status or a stream that ends early fail with
    /// [`Error::ProvisionFailed`]. No timeout is applied here; callers bound
    /// the whole pull.
    pub async fn pull<F>(&self, model: &str, mut on_progress: F) -> Result<()>
    where
        F: FnMut(&PullProgress) + Send,
    {
        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&PullRequest {
                name: model,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| Error::provision(model, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provision(
                model,
                format!("HTTP {}: {}", status, body.trim()),
            ));
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| Error::provision(model, e))?;
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if handle_pull_line(model, &line, &mut on_progress)? {
                    return Ok(());
                }
            }
        }

        // Final line without a trailing newline.
        if handle_pull_line(model, &buffer, &mut on_progress)? {
            return Ok(());
        }

        Err(Error::provision(model, "pull stream ended without success"))
    }
}

/// Returns `Ok(true)` on the success line.
fn handle_pull_line<F>(model: &str, line: &[u8], on_progress: &mut F) -> Result<bool>
where
    F: FnMut(&PullProgress),
{
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }

    let progress: PullProgress = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(line = %text, error = %e, "skipping unparseable pull line");
            return Ok(false);
        }
    };

    if let Some(error) = &progress.error {
        return Err(Error::provision(model, error));
    }

    on_progress(&progress);
    Ok(progress.status == "success")
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        OllamaClient::generate(self, model, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OllamaClient {
        let config = OllamaConfig {
            url: server.uri(),
            ..OllamaConfig::default()
        };
        OllamaClient::new(&config).unwrap()
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = OllamaConfig {
            url: "http://localhost:11434/".to_string(),
            ..OllamaConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_generate_sends_options_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama2",
                "stream": false,
                "options": { "temperature": 0.1 }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "response": "Paris.", "done": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let answer = client_for(&server)
            .generate("llama2", "Capital of France?")
            .await
            .unwrap();
        assert_eq!(answer, "Paris.");
    }

    #[tokio::test]
    async fn test_generate_error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"model 'x' not found"}"#),
            )
            .mount(&server)
            .await;

        match client_for(&server).generate("x", "hi").await {
            Err(Error::Generation { status, body, .. }) => {
                assert_eq!(status, 404);
                assert!(body.contains("not found"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let config = OllamaConfig {
            url: "http://127.0.0.1:1".to_string(),
            ..OllamaConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert!(matches!(
            client.generate("llama2", "hi").await,
            Err(Error::BackendUnavailable { .. })
        ));
        assert!(client.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    { "name": "llama2:latest", "size": 3826793677u64 },
                    { "name": "mistral:7b" }
                ]
            })))
            .mount(&server)
            .await;

        let models = client_for(&server).list_models().await.unwrap();
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["llama2:latest", "mistral:7b"]);
        assert_eq!(models[0].size, Some(3826793677));
    }

    #[tokio::test]
    async fn test_pull_reads_progress_until_success() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"status\":\"pulling manifest\"}\n",
            "{\"status\":\"downloading\",\"digest\":\"sha256:abc\",\"total\":100,\"completed\":50}\n",
            "{\"status\":\"verifying sha256 digest\"}\n",
            "{\"status\":\"success\"}\n"
        );
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .and(body_partial_json(serde_json::json!({ "name": "llama2", "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let mut seen = Vec::new();
        client_for(&server)
            .pull("llama2", |p| seen.push(p.status.clone()))
            .await
            .unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[1], "downloading");
    }

    #[tokio::test]
    async fn test_pull_error_line_fails() {
        let server = MockServer::start().await;
        let body = "{\"status\":\"pulling manifest\"}\n{\"error\":\"pull model manifest: file does not exist\"}\n";
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let err = client_for(&server).pull("nope", |_| {}).await.unwrap_err();
        match err {
            Error::ProvisionFailed { model, reason } => {
                assert_eq!(model, "nope");
                assert!(reason.contains("does not exist"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pull_without_success_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":\"pulling manifest\"}"))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).pull("llama2", |_| {}).await,
            Err(Error::ProvisionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_pull_success_without_trailing_newline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":\"success\"}"))
            .mount(&server)
            .await;

        assert!(client_for(&server).pull("llama2", |_| {}).await.is_ok());
    }
}
