//! HTTP client for the embedding microservice.
//!
//! The service exposes `GET /health`, `GET /info`, and `POST /embed`
//! (`{inputs: [..]}` → `{embeddings: [[..]]}`). Errors are classified for
//! the caller: transient (timeout, connection, 5xx) errors are retryable;
//! fatal ones (bad request, inconsistent dimensions) are not.

use serde::{Deserialize, Serialize};

use lode_core::config::EmbeddingConfig;

/// Provider failure, classified for retry decisions.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

/// Model metadata reported by `GET /info`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderInfo {
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub max_input_length: Option<usize>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client adapter for the embedding provider. With embeddings disabled it
/// degrades to a no-op that reports success with no vectors, so the
/// indexing pipeline runs unchanged.
#[derive(Clone)]
pub struct EmbeddingProvider {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl EmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();

        Self { client, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Probe `GET /health`. False on any failure.
    pub async fn healthy(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/health", self.config.service_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Fetch model metadata from `GET /info`, if the provider is up.
    pub async fn info(&self) -> Option<ProviderInfo> {
        if !self.config.enabled {
            return None;
        }
        let url = format!("{}/info", self.config.service_url.trim_end_matches('/'));
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<ProviderInfo>().await.ok()
    }

    /// Embed a batch of inputs. Disabled embeddings return success with an
    /// empty vector set. All returned vectors must share one length;
    /// anything else is fatal (`dims_mismatch`).
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if !self.config.enabled || inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embed", self.config.service_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&EmbedRequest { inputs })
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(EmbedError::Transient(format!("provider returned {status}")));
        }
        if !status.is_success() {
            return Err(EmbedError::Fatal(format!("provider returned {status}")));
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::Fatal(format!("malformed embed response: {e}")))?;

        if body.embeddings.len() != inputs.len() {
            return Err(EmbedError::Fatal(format!(
                "provider returned {} vectors for {} inputs",
                body.embeddings.len(),
                inputs.len()
            )));
        }
        if let Some(first) = body.embeddings.first() {
            let dims = first.len();
            if dims == 0 || body.embeddings.iter().any(|v| v.len() != dims) {
                return Err(EmbedError::Fatal("dims_mismatch".to_string()));
            }
        }

        Ok(body.embeddings)
    }

    /// Embed a single query string. `None` when embeddings are disabled.
    pub async fn embed_one(&self, input: &str) -> Result<Option<Vec<f32>>, EmbedError> {
        if !self.config.enabled {
            return Ok(None);
        }
        let vectors = self.embed(std::slice::from_ref(&input.to_string())).await?;
        Ok(vectors.into_iter().next())
    }
}

fn classify_reqwest(e: reqwest::Error) -> EmbedError {
    if e.is_timeout() || e.is_connect() {
        EmbedError::Transient(e.to_string())
    } else {
        EmbedError::Fatal(e.to_string())
    }
}

impl EmbedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbedError::Transient(_))
    }
}
