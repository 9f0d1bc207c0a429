//! # clerk-inference
//!
//! AI extraction for the clerk ingestion pipeline.
//!
//! This crate provides:
//! - Extraction prompt construction with localized instructions
//! - Ollama backend (default)
//! - OpenAI-compatible chat backend, used for OpenAI and Qianwen (DashScope)
//! - Per-owner backend selection
//! - Response parsing tolerant of fences, prose and partial arrays
//! - The fallback candidate used when extraction fails
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable Ollama backend
//! - `openai` (default): Enable OpenAI-compatible backend
//! - `mock`: Expose the scripted mock backend to downstream tests

pub mod fallback;
pub mod parser;
pub mod prompt;
pub mod selector;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use clerk_core::*;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};

pub use fallback::FallbackGenerator;
pub use parser::{parse_response, ResponseParser};
pub use prompt::{PromptBuilder, PromptLocale, SCHEMA_CONTRACT};
pub use selector::{BackendKind, BackendSelector};
