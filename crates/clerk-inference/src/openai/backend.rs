//! OpenAI-compatible extraction backend implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use clerk_core::{defaults, Error, ExtractionBackend, Result};

use super::error::{to_clerk_error, OpenAIErrorCode};
use super::types::*;

/// Default timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = defaults::GEN_TIMEOUT_SECS;

/// Configuration for an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Provider label recorded in audit records ("openai", "qianwen", ...).
    pub provider: String,
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model to use for generation.
    pub model: String,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Skip TLS verification (for self-signed certs in local environments).
    pub skip_tls_verify: bool,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: defaults::OPENAI_URL.to_string(),
            api_key: None,
            model: defaults::OPENAI_MODEL.to_string(),
            temperature: Some(defaults::CHAT_TEMPERATURE),
            top_p: Some(defaults::CHAT_TOP_P),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            skip_tls_verify: false,
        }
    }
}

impl OpenAIConfig {
    /// Qianwen through DashScope's OpenAI-compatible mode.
    pub fn qianwen(api_key: impl Into<String>) -> Self {
        Self {
            provider: "qianwen".to_string(),
            base_url: defaults::QIANWEN_URL.to_string(),
            api_key: Some(api_key.into()),
            model: defaults::QIANWEN_MODEL.to_string(),
            ..Self::default()
        }
    }
}

fn timeout_from_env() -> u64 {
    std::env::var("CLERK_GEN_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// OpenAI-compatible extraction backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_seconds));

        if config.skip_tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Initializing {} backend: url={}, model={}",
            config.provider, config.base_url, config.model
        );

        Ok(Self { client, config })
    }

    /// Create an OpenAI backend from environment variables.
    pub fn from_env() -> Result<Self> {
        let config = OpenAIConfig {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| defaults::OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: std::env::var("OPENAI_GEN_MODEL")
                .unwrap_or_else(|_| defaults::OPENAI_MODEL.to_string()),
            timeout_seconds: timeout_from_env(),
            skip_tls_verify: std::env::var("OPENAI_SKIP_TLS_VERIFY")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
            ..OpenAIConfig::default()
        };

        Self::new(config)
    }

    /// Create a Qianwen backend from environment variables.
    ///
    /// Requires `QIANWEN_API_KEY`.
    pub fn qianwen_from_env() -> Result<Self> {
        let api_key = std::env::var("QIANWEN_API_KEY")
            .map_err(|_| Error::Config("QIANWEN_API_KEY is not set".to_string()))?;

        let config = OpenAIConfig {
            base_url: std::env::var("QIANWEN_BASE_URL")
                .unwrap_or_else(|_| defaults::QIANWEN_URL.to_string()),
            model: std::env::var("QIANWEN_MODEL")
                .unwrap_or_else(|_| defaults::QIANWEN_MODEL.to_string()),
            timeout_seconds: timeout_from_env(),
            ..OpenAIConfig::qianwen(api_key)
        };

        Self::new(config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// Build a POST request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(self.url(endpoint));

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Build a GET request with authentication.
    fn build_get_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(self.url(endpoint));

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req
    }
}

#[async_trait]
impl ExtractionBackend for OpenAIBackend {
    #[instrument(skip(self, prompt), fields(subsystem = "inference", component = %self.config.provider, op = "extract", model = %self.config.model, prompt_len = prompt.len()))]
    async fn extract(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            stream: false,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: OpenAIErrorResponse = response.json().await.unwrap_or(OpenAIErrorResponse {
                error: OpenAIError {
                    message: "Unknown error".to_string(),
                    error_type: "unknown".to_string(),
                    code: None,
                },
            });
            let code = OpenAIErrorCode::from_response(status.as_u16(), &body.error.error_type);
            warn!(
                status = status.as_u16(),
                code = code.as_str(),
                "Chat completion request rejected"
            );
            return Err(to_clerk_error(
                &self.config.provider,
                code,
                &format!("{} returned {}", status, body.error.message),
            ));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                Error::BackendUnavailable(format!(
                    "{} returned no choices",
                    self.config.provider
                ))
            })?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        Ok(content)
    }

    fn provider(&self) -> &str {
        &self.config.provider
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> Result<bool> {
        // A minimal models list request
        let response = self
            .build_get_request("/models")
            .timeout(Duration::from_secs(defaults::HEALTH_TIMEOUT_SECS))
            .send()
            .await;

        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    info!("{} health check passed", self.config.provider);
                    Ok(true)
                } else {
                    warn!("{} health check failed: {}", self.config.provider, resp.status());
                    Ok(false)
                }
            }
            Err(e) => {
                warn!("{} health check error: {}", self.config.provider, e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAIConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.top_p, Some(0.8));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_qianwen_config() {
        let config = OpenAIConfig::qianwen("sk-test");
        assert_eq!(config.provider, "qianwen");
        assert_eq!(config.model, "qwen-max");
        assert!(config.base_url.contains("dashscope"));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_identifier_uses_provider_label() {
        let backend = OpenAIBackend::new(OpenAIConfig::qianwen("sk-test")).unwrap();
        assert_eq!(backend.identifier(), "qianwen:qwen-max");
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let backend = OpenAIBackend::new(OpenAIConfig {
            base_url: "http://localhost:8000/v1/".to_string(),
            ..OpenAIConfig::default()
        })
        .unwrap();
        assert_eq!(
            backend.url("/chat/completions"),
            "http://localhost:8000/v1/chat/completions"
        );
    }
}
