//! OpenAI-compatible chat-completion extraction backend.
//!
//! Works with any endpoint that speaks the `/chat/completions` protocol,
//! including:
//!
//! - OpenAI cloud API
//! - Qianwen (Alibaba DashScope compatible mode)
//! - vLLM / LM Studio / Ollama in OpenAI mode
//!
//! # Example
//!
//! ```rust,no_run
//! use clerk_inference::openai::OpenAIBackend;
//! use clerk_core::ExtractionBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::qianwen_from_env().unwrap();
//!     let raw = backend.extract("Extract tasks from: call Bob").await.unwrap();
//!     println!("{}", raw);
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig, DEFAULT_TIMEOUT_SECS};
pub use error::{to_clerk_error, OpenAIErrorCode};
pub use types::*;
