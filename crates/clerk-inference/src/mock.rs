//! Scripted extraction backend for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clerk_inference::mock::MockExtractionBackend;
//!
//! let backend = MockExtractionBackend::new()
//!     .with_fixed_response(r#"[{"title": "Call Bob"}]"#);
//! let raw = backend.extract("prompt").await.unwrap();
//! assert_eq!(backend.call_count(), 1);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use clerk_core::{Error, ExtractionBackend, Result};

/// What the mock does when `extract` is called.
#[derive(Debug, Clone)]
enum MockBehavior {
    Respond(String),
    Fail(String),
    /// Never answers; for exercising caller-side timeouts.
    Hang,
}

#[derive(Debug, Clone)]
struct MockConfig {
    provider: String,
    model: String,
    behavior: MockBehavior,
    latency: Duration,
    healthy: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "mock-model".to_string(),
            behavior: MockBehavior::Respond("[]".to_string()),
            latency: Duration::ZERO,
            healthy: true,
        }
    }
}

/// Mock extraction backend. Clones share the prompt log.
#[derive(Clone)]
pub struct MockExtractionBackend {
    config: Arc<MockConfig>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockExtractionBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every prompt with `response`.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).behavior = MockBehavior::Respond(response.into());
        self
    }

    /// Fail every call with `BackendUnavailable(reason)`.
    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).behavior = MockBehavior::Fail(reason.into());
        self
    }

    /// Never return from `extract`.
    pub fn hanging(mut self) -> Self {
        Arc::make_mut(&mut self.config).behavior = MockBehavior::Hang;
        self
    }

    /// Delay every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    pub fn with_identity(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.provider = provider.into();
        config.model = model.into();
        self
    }

    pub fn unhealthy(mut self) -> Self {
        Arc::make_mut(&mut self.config).healthy = false;
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.log().clone()
    }

    pub fn call_count(&self) -> usize {
        self.log().len()
    }

    fn log(&self) -> MutexGuard<'_, Vec<String>> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockExtractionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionBackend for MockExtractionBackend {
    async fn extract(&self, prompt: &str) -> Result<String> {
        self.log().push(prompt.to_string());

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        match &self.config.behavior {
            MockBehavior::Respond(response) => Ok(response.clone()),
            MockBehavior::Fail(reason) => Err(Error::BackendUnavailable(reason.clone())),
            MockBehavior::Hang => std::future::pending().await,
        }
    }

    fn provider(&self) -> &str {
        &self.config.provider
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.config.healthy)
    }
}
