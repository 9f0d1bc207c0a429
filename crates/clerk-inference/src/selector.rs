//! Per-owner backend selection.
//!
//! Owners store a free-form AI model preference ("ollama", "qwen", ...).
//! The selector maps it to a registered backend, falling back to the
//! configured default kind when the preference is unknown or unavailable.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clerk_core::{defaults, Error, ExtractionBackend, Result};

/// Backend variants the selector knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    Qianwen,
    OpenAi,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Ollama, BackendKind::Qianwen, BackendKind::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::Qianwen => "qianwen",
            BackendKind::OpenAi => "openai",
        }
    }

    /// Map a stored preference to a kind. Case-insensitive; `None` if unknown.
    pub fn from_preference(preference: &str) -> Option<Self> {
        match preference.trim().to_ascii_lowercase().as_str() {
            "ollama" | "llama" | "llama2" | "local" => Some(BackendKind::Ollama),
            "qianwen" | "qwen" | "qwen-max" | "tongyi" | "dashscope" => Some(BackendKind::Qianwen),
            "openai" | "gpt" | "chatgpt" => Some(BackendKind::OpenAi),
            _ => None,
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_preference(s)
            .ok_or_else(|| Error::Config(format!("unknown backend kind: {}", s)))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry of configured backends keyed by kind.
#[derive(Clone)]
pub struct BackendSelector {
    backends: HashMap<BackendKind, Arc<dyn ExtractionBackend>>,
    default_kind: BackendKind,
}

impl BackendSelector {
    pub fn new(default_kind: BackendKind) -> Self {
        Self {
            backends: HashMap::new(),
            default_kind,
        }
    }

    /// Register (or replace) the backend for `kind`.
    pub fn register(&mut self, kind: BackendKind, backend: Arc<dyn ExtractionBackend>) -> &mut Self {
        self.backends.insert(kind, backend);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_backend(mut self, kind: BackendKind, backend: Arc<dyn ExtractionBackend>) -> Self {
        self.register(kind, backend);
        self
    }

    pub fn default_kind(&self) -> BackendKind {
        self.default_kind
    }

    /// Registered backends in stable kind order.
    pub fn registered(&self) -> Vec<(BackendKind, Arc<dyn ExtractionBackend>)> {
        BackendKind::ALL
            .iter()
            .filter_map(|kind| self.backends.get(kind).map(|b| (*kind, Arc::clone(b))))
            .collect()
    }

    /// Resolve the backend for an owner's stored preference.
    ///
    /// Order: preferred kind, default kind, then any registered backend.
    /// Fails with [`Error::Config`] only when nothing is registered.
    pub fn select(&self, preference: Option<&str>) -> Result<Arc<dyn ExtractionBackend>> {
        let preferred = match preference.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => {
                let kind = BackendKind::from_preference(p);
                if kind.is_none() {
                    warn!(preference = p, default = %self.default_kind, "Unknown AI model preference, using default backend");
                }
                kind
            }
            None => None,
        };

        if let Some(kind) = preferred {
            if let Some(backend) = self.backends.get(&kind) {
                debug!(backend = %kind, "Selected preferred backend");
                return Ok(Arc::clone(backend));
            }
            warn!(preferred = %kind, default = %self.default_kind, "Preferred backend not configured, using default");
        }

        if let Some(backend) = self.backends.get(&self.default_kind) {
            debug!(backend = %self.default_kind, "Selected default backend");
            return Ok(Arc::clone(backend));
        }

        self.registered()
            .into_iter()
            .next()
            .map(|(kind, backend)| {
                warn!(backend = %kind, default = %self.default_kind, "Default backend not configured, using first registered");
                backend
            })
            .ok_or_else(|| Error::Config("no extraction backend is configured".to_string()))
    }

    /// Build from environment variables.
    ///
    /// Ollama is always registered; Qianwen and OpenAI only when their API
    /// keys are set. `CLERK_DEFAULT_BACKEND` picks the default kind.
    pub fn from_env() -> Result<Self> {
        let default_name = std::env::var("CLERK_DEFAULT_BACKEND")
            .unwrap_or_else(|_| defaults::DEFAULT_BACKEND.to_string());
        let default_kind = BackendKind::from_preference(&default_name).unwrap_or_else(|| {
            warn!(value = %default_name, "Unknown CLERK_DEFAULT_BACKEND, using ollama");
            BackendKind::Ollama
        });

        let mut selector = Self::new(default_kind);

        #[cfg(feature = "ollama")]
        selector.register(
            BackendKind::Ollama,
            Arc::new(crate::ollama::OllamaBackend::from_env()),
        );

        #[cfg(feature = "openai")]
        {
            if std::env::var("QIANWEN_API_KEY").is_ok() {
                selector.register(
                    BackendKind::Qianwen,
                    Arc::new(crate::openai::OpenAIBackend::qianwen_from_env()?),
                );
            }
            if std::env::var("OPENAI_API_KEY").is_ok() {
                selector.register(
                    BackendKind::OpenAi,
                    Arc::new(crate::openai::OpenAIBackend::from_env()?),
                );
            }
        }

        Ok(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExtractionBackend;

    fn mock(provider: &str) -> Arc<dyn ExtractionBackend> {
        Arc::new(MockExtractionBackend::new().with_identity(provider, "m"))
    }

    fn full_selector() -> BackendSelector {
        BackendSelector::new(BackendKind::Ollama)
            .with_backend(BackendKind::Ollama, mock("ollama"))
            .with_backend(BackendKind::Qianwen, mock("qianwen"))
    }

    #[test]
    fn test_from_preference_aliases() {
        assert_eq!(BackendKind::from_preference("Ollama"), Some(BackendKind::Ollama));
        assert_eq!(BackendKind::from_preference("qwen"), Some(BackendKind::Qianwen));
        assert_eq!(BackendKind::from_preference(" DashScope "), Some(BackendKind::Qianwen));
        assert_eq!(BackendKind::from_preference("gpt"), Some(BackendKind::OpenAi));
        assert_eq!(BackendKind::from_preference("claude"), None);
    }

    #[test]
    fn test_from_str_unknown_is_config_error() {
        assert!(matches!("nope".parse::<BackendKind>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_select_honors_preference() {
        let backend = full_selector().select(Some("qianwen")).unwrap();
        assert_eq!(backend.provider(), "qianwen");
    }

    #[test]
    fn test_select_without_preference_uses_default() {
        let backend = full_selector().select(None).unwrap();
        assert_eq!(backend.provider(), "ollama");
    }

    #[test]
    fn test_select_unknown_preference_uses_default() {
        let backend = full_selector().select(Some("mystery-model")).unwrap();
        assert_eq!(backend.provider(), "ollama");
    }

    #[test]
    fn test_select_unregistered_preference_uses_default() {
        let backend = full_selector().select(Some("openai")).unwrap();
        assert_eq!(backend.provider(), "ollama");
    }

    #[test]
    fn test_select_default_missing_uses_first_registered() {
        let selector = BackendSelector::new(BackendKind::OpenAi)
            .with_backend(BackendKind::Qianwen, mock("qianwen"));
        assert_eq!(selector.select(None).unwrap().provider(), "qianwen");
    }

    #[test]
    fn test_select_with_nothing_registered_fails() {
        let selector = BackendSelector::new(BackendKind::Ollama);
        assert!(matches!(selector.select(None), Err(Error::Config(_))));
    }

    #[test]
    fn test_registered_is_ordered() {
        let selector = BackendSelector::new(BackendKind::Ollama)
            .with_backend(BackendKind::OpenAi, mock("openai"))
            .with_backend(BackendKind::Ollama, mock("ollama"));
        let kinds: Vec<BackendKind> = selector.registered().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![BackendKind::Ollama, BackendKind::OpenAi]);
    }
}
