//! HTTP adapter for the external generation service
//!
//! Input is an assembled prompt plus the attempt's [`ParameterSet`]; output
//! is raw text with token usage. Failures are classified at the status-code
//! boundary: auth and malformed-request errors are fatal, rate limits and
//! server errors are retryable transport faults with their own bounded
//! retry budget, separate from the quality-attempt budget.

use crate::config::GenerationServiceConfig;
use crate::error::{CalliopeError, Result};
use crate::types::{GeneratedText, ParameterSet, Usage};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff base duration in milliseconds
const BACKOFF_BASE_MS: u64 = 1000;

/// Token budget granted per requested word
const TOKENS_PER_WORD: f64 = 2.0;

/// Floor for the token budget on very short targets
const MIN_TOKEN_BUDGET: usize = 256;

/// Adapter over the external generative text service
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate text for an assembled prompt under the given parameters
    async fn generate(&self, prompt: &str, params: &ParameterSet) -> Result<GeneratedText>;
}

/// Production generation client
pub struct HttpGenerationClient {
    client: Client,
    config: GenerationServiceConfig,
}

/// Generation service request format
#[derive(Debug, Serialize)]
struct GenerationRequest {
    model: String,
    max_tokens: usize,
    temperature: f64,
    repetition_penalty: f64,
    presence_penalty: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    style: BTreeMap<String, f64>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Generation service response format
#[derive(Debug, Deserialize)]
struct GenerationResponse {
    content: Vec<Content>,
    usage: UsagePayload,
}

#[derive(Debug, Deserialize)]
struct Content {
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    input_tokens: u32,
    output_tokens: u32,
}

/// API error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpGenerationClient {
    /// Create a new generation client
    pub fn new(config: GenerationServiceConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(CalliopeError::Config(config::ConfigError::Message(
                "CALLIOPE_API_KEY not set".to_string(),
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CalliopeError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Call the generation service with transport-level retry
    async fn call_with_retry(
        &self,
        prompt: &str,
        params: &ParameterSet,
    ) -> Result<GeneratedText> {
        let mut retries = 0;

        loop {
            match self.call_once(prompt, params).await {
                Ok(generated) => return Ok(generated),
                Err(e) => {
                    if retries >= self.config.transport_max_retries || !e.is_retryable() {
                        return Err(e);
                    }

                    // Exponential backoff
                    let backoff_ms = BACKOFF_BASE_MS * 2_u64.pow(retries);
                    warn!(
                        "Generation call failed, retrying after {}ms (attempt {}/{}): {}",
                        backoff_ms,
                        retries + 1,
                        self.config.transport_max_retries,
                        e
                    );

                    sleep(Duration::from_millis(backoff_ms)).await;
                    retries += 1;
                }
            }
        }
    }

    /// Call the generation service once (no retry)
    async fn call_once(&self, prompt: &str, params: &ParameterSet) -> Result<GeneratedText> {
        debug!(
            model = %self.config.model,
            temperature = params.temperature,
            target_words = params.target_words,
            "Calling generation service"
        );

        let request = GenerationRequest {
            model: self.config.model.clone(),
            max_tokens: token_budget(params.target_words),
            temperature: params.temperature,
            repetition_penalty: params.repetition_penalty,
            presence_penalty: params.novelty,
            style: params.voice.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| CalliopeError::Transport(e.to_string()))?;

        let status = response.status();

        match status {
            StatusCode::OK => {
                let payload: GenerationResponse = response.json().await.map_err(|e| {
                    CalliopeError::Generation(format!("Failed to parse response: {}", e))
                })?;

                let text = payload
                    .content
                    .first()
                    .map(|c| c.text.clone())
                    .ok_or_else(|| {
                        CalliopeError::Generation(
                            "Empty response from generation service".to_string(),
                        )
                    })?;

                debug!(
                    input_tokens = payload.usage.input_tokens,
                    output_tokens = payload.usage.output_tokens,
                    "Generation succeeded"
                );

                Ok(GeneratedText {
                    text,
                    usage: Usage {
                        input_tokens: payload.usage.input_tokens,
                        output_tokens: payload.usage.output_tokens,
                    },
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CalliopeError::Generation(
                "Invalid or missing API key".to_string(),
            )),
            StatusCode::TOO_MANY_REQUESTS => Err(CalliopeError::Transport(
                "Generation service rate limit exceeded".to_string(),
            )),
            StatusCode::BAD_REQUEST => {
                let message = if let Ok(body) = response.json::<ErrorResponse>().await {
                    body.error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "Bad request".to_string())
                } else {
                    "Bad request".to_string()
                };

                Err(CalliopeError::Generation(message))
            }
            s if s.is_server_error() => Err(CalliopeError::Transport(format!(
                "Generation service error (status {})",
                s
            ))),
            _ => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());

                Err(CalliopeError::Generation(format!(
                    "Unexpected status {}: {}",
                    status, error_text
                )))
            }
        }
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, prompt: &str, params: &ParameterSet) -> Result<GeneratedText> {
        self.call_with_retry(prompt, params).await
    }
}

/// Token budget for a word target, with headroom so the completion
/// validator sees natural endings rather than hard cutoffs
fn token_budget(target_words: u32) -> usize {
    ((f64::from(target_words) * TOKENS_PER_WORD) as usize).max(MIN_TOKEN_BUDGET)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GenerationServiceConfig {
        GenerationServiceConfig {
            api_key: "test-key".to_string(),
            ..GenerationServiceConfig::default()
        }
    }

    #[test]
    fn test_client_creation() {
        assert!(HttpGenerationClient::new(test_config()).is_ok());
    }

    #[test]
    fn test_empty_api_key_error() {
        let config = GenerationServiceConfig {
            api_key: String::new(),
            ..GenerationServiceConfig::default()
        };

        assert!(HttpGenerationClient::new(config).is_err());
    }

    #[test]
    fn test_token_budget() {
        assert_eq!(token_budget(300), 600);
        // Short targets keep a working floor
        assert_eq!(token_budget(20), MIN_TOKEN_BUDGET);
    }

    // Integration test (requires API key)
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_generate_live() {
        let api_key = std::env::var("CALLIOPE_API_KEY").expect("CALLIOPE_API_KEY not set");
        let config = GenerationServiceConfig {
            api_key,
            ..GenerationServiceConfig::default()
        };
        let client = HttpGenerationClient::new(config).unwrap();

        let params = ParameterSet {
            temperature: 0.7,
            repetition_penalty: 1.1,
            novelty: 0.2,
            target_words: 60,
            voice: BTreeMap::new(),
        };

        let generated = client
            .generate("Write two sentences about steel alloys.", &params)
            .await
            .unwrap();
        assert!(!generated.text.is_empty());
    }
}
