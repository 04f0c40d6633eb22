//! Embedding provider abstraction and implementations.
//!
//! Defines the [`TokenEmbedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]** — returns [`PipelineError::ProviderUnavailable`]
//!   from every call; used when embeddings are not configured. Capability
//!   resolution is lazy: construction always succeeds and the error surfaces
//!   at first use, so the rest of the pipeline stays testable with fakes.
//! - **[`HttpEmbedder`]** — calls a token-embedding HTTP service with retry
//!   and backoff.
//!
//! # Retry Strategy
//!
//! The HTTP provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;

/// Token-level embedding capability consumed by the late-chunking embedder
/// and the retriever.
///
/// A provider declares its model identity, vector dimensionality, and the
/// maximum number of tokens a single call may encode; the windowing logic
/// in the late-chunking embedder is driven by `max_input_tokens`.
#[async_trait]
pub trait TokenEmbedder: Send + Sync {
    /// Model identifier recorded on every embedding produced.
    fn model_id(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Maximum tokens a single `embed_tokens` call may encode.
    fn max_input_tokens(&self) -> usize;

    /// Encode a contiguous token span, returning one vector per token in
    /// input order. The matrix length must equal `tokens.len()`.
    async fn embed_tokens(&self, tokens: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Embed a short text (a query) into a single pooled vector.
    async fn embed_pooled(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

/// Instantiate the embedder named by the configuration.
///
/// `"disabled"` resolves to [`DisabledEmbedder`] rather than an error:
/// the missing capability is reported at call time, per the lazy-resolution
/// contract.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn TokenEmbedder>, PipelineError> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "http" => Ok(Box::new(HttpEmbedder::new(config)?)),
        other => Err(PipelineError::ProviderTransient {
            capability: "embedding",
            attempts: 0,
            message: format!("unknown embedding provider: {}", other),
        }),
    }
}

// ============ Disabled Provider ============

/// A no-op embedder that reports the missing capability on every call.
pub struct DisabledEmbedder;

#[async_trait]
impl TokenEmbedder for DisabledEmbedder {
    fn model_id(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn max_input_tokens(&self) -> usize {
        0
    }

    async fn embed_tokens(&self, _tokens: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Err(PipelineError::ProviderUnavailable {
            capability: "embedding",
        })
    }

    async fn embed_pooled(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
        Err(PipelineError::ProviderUnavailable {
            capability: "embedding",
        })
    }
}

// ============ HTTP Provider ============

/// Embedding provider backed by a token-embedding HTTP service.
///
/// `POST {url}/embed_tokens` with `{"model", "tokens": [...]}` returns
/// `{"embeddings": [[...], ...]}`, one vector per input token;
/// `POST {url}/embed` with `{"model", "input"}` returns a single pooled
/// `{"embedding": [...]}` for query text.
#[derive(Debug)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_input_tokens: usize,
    max_retries: u32,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, PipelineError> {
        let model = config
            .model
            .clone()
            .ok_or(PipelineError::ProviderUnavailable {
                capability: "embedding",
            })?;
        let dims = config.dims.ok_or(PipelineError::ProviderUnavailable {
            capability: "embedding",
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:8080".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::ProviderTransient {
                capability: "embedding",
                attempts: 0,
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url,
            model,
            dims,
            max_input_tokens: config.max_input_tokens,
            max_retries: config.max_retries,
        })
    }

    async fn post_with_retry(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PipelineError> {
        let mut last_err = String::new();
        let mut attempts = 0u32;

        for attempt in 0..=self.max_retries {
            attempts = attempt + 1;
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}{}", self.url, path))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            PipelineError::ProviderTransient {
                                capability: "embedding",
                                attempts,
                                message: format!("invalid response body: {}", e),
                            }
                        });
                    }

                    // Rate limited or server error: retry.
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = format!("HTTP {}: {}", status, body_text);
                        continue;
                    }

                    // Other client errors don't improve with retries.
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::ProviderTransient {
                        capability: "embedding",
                        attempts,
                        message: format!("HTTP {}: {}", status, body_text),
                    });
                }
                Err(e) => {
                    last_err = e.to_string();
                    continue;
                }
            }
        }

        Err(PipelineError::ProviderTransient {
            capability: "embedding",
            attempts,
            message: last_err,
        })
    }
}

#[async_trait]
impl TokenEmbedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    async fn embed_tokens(&self, tokens: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "tokens": tokens,
        });
        let json = self.post_with_retry("/embed_tokens", body).await?;

        let matrix = parse_matrix(&json, "embeddings")?;
        if matrix.len() != tokens.len() {
            return Err(PipelineError::ProviderTransient {
                capability: "embedding",
                attempts: 1,
                message: format!(
                    "provider returned {} vectors for {} tokens",
                    matrix.len(),
                    tokens.len()
                ),
            });
        }
        Ok(matrix)
    }

    async fn embed_pooled(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let json = self.post_with_retry("/embed", body).await?;

        let vector = json
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| PipelineError::ProviderTransient {
                capability: "embedding",
                attempts: 1,
                message: "response missing 'embedding' array".to_string(),
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        Ok(vector)
    }
}

fn parse_matrix(json: &serde_json::Value, field: &str) -> Result<Vec<Vec<f32>>, PipelineError> {
    let rows = json
        .get(field)
        .and_then(|e| e.as_array())
        .ok_or_else(|| PipelineError::ProviderTransient {
            capability: "embedding",
            attempts: 1,
            message: format!("response missing '{}' array", field),
        })?;

    let mut matrix = Vec::with_capacity(rows.len());
    for row in rows {
        let vec: Vec<f32> = row
            .as_array()
            .ok_or_else(|| PipelineError::ProviderTransient {
                capability: "embedding",
                attempts: 1,
                message: format!("'{}' row is not an array", field),
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        matrix.push(vec);
    }
    Ok(matrix)
}
