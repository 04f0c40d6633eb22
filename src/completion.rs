//! Completion provider client.
//!
//! Out of the pipeline core proper, but specified at its interface: the
//! LLM relevance scorer in the reranker consumes it, and the surrounding
//! application hands the final [`crate::models::ContextSet`] to it. Same
//! lazy resolution and retry discipline as the embedding client.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::PipelineError;

/// Text-completion capability: prompt in, generated text out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_id(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// Instantiate the completion client named by the configuration.
/// `"disabled"` resolves to a client that fails at call time.
pub fn create_completion(
    config: &CompletionConfig,
) -> Result<Box<dyn CompletionClient>, PipelineError> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledCompletion)),
        "http" => Ok(Box::new(HttpCompletion::new(config)?)),
        other => Err(PipelineError::ProviderTransient {
            capability: "completion",
            attempts: 0,
            message: format!("unknown completion provider: {}", other),
        }),
    }
}

/// A no-op client that reports the missing capability on every call.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionClient for DisabledCompletion {
    fn model_id(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, PipelineError> {
        Err(PipelineError::ProviderUnavailable {
            capability: "completion",
        })
    }
}

/// Completion client for an Ollama-style generate endpoint.
///
/// `POST {url}/api/generate` with `{"model", "prompt", "stream": false}`
/// returns `{"response": "..."}`.
pub struct HttpCompletion {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl HttpCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self, PipelineError> {
        let model = config
            .model
            .clone()
            .ok_or(PipelineError::ProviderUnavailable {
                capability: "completion",
            })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::ProviderTransient {
                capability: "completion",
                attempts: 0,
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url,
            model,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletion {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let mut last_err = String::new();
        let mut attempts = 0u32;

        for attempt in 0..=self.max_retries {
            attempts = attempt + 1;
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/generate", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            PipelineError::ProviderTransient {
                                capability: "completion",
                                attempts,
                                message: format!("invalid response body: {}", e),
                            }
                        })?;
                        return json
                            .get("response")
                            .and_then(|r| r.as_str())
                            .map(|s| s.to_string())
                            .ok_or_else(|| PipelineError::ProviderTransient {
                                capability: "completion",
                                attempts,
                                message: "response missing 'response' field".to_string(),
                            });
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = format!("HTTP {}: {}", status, body_text);
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::ProviderTransient {
                        capability: "completion",
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
            capability: "completion",
            attempts,
            message: last_err,
        })
    }
}
