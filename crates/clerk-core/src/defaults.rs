//! Centralized default constants for the clerk system.
//!
//! All crates reference these constants instead of defining their own
//! magic numbers. Organized by domain area.

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Default Ollama endpoint (locally hosted model).
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default Ollama generation model.
pub const OLLAMA_MODEL: &str = "llama2";

/// Default Qianwen endpoint (DashScope OpenAI-compatible mode).
pub const QIANWEN_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default Qianwen model.
pub const QIANWEN_MODEL: &str = "qwen-max";

/// Default OpenAI endpoint.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default OpenAI model.
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Sampling temperature sent to chat-completion backends.
pub const CHAT_TEMPERATURE: f32 = 0.2;

/// Nucleus sampling parameter sent to chat-completion backends.
pub const CHAT_TOP_P: f32 = 0.8;

/// HTTP client timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 60;

/// Caller-side bound on a single extraction attempt (seconds).
pub const EXTRACTION_TIMEOUT_SECS: u64 = 45;

/// Timeout for backend health probes (seconds).
pub const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Backend used when an owner has no (or an unknown) preference.
pub const DEFAULT_BACKEND: &str = "ollama";

// =============================================================================
// EXTRACTION AUDIT
// =============================================================================

/// Confidence recorded for a successful extraction.
///
/// Placeholder: backends do not report a score, so this carries no signal.
pub const EXTRACTION_CONFIDENCE: f64 = 0.85;

/// Confidence recorded when the fallback candidate was used.
pub const DEGRADED_CONFIDENCE: f64 = 0.0;

/// Maximum characters kept in `AIProcessingResult.processed_content`.
pub const PROCESSED_CONTENT_MAX_CHARS: usize = 5000;

// =============================================================================
// CATEGORIES
// =============================================================================

/// Category assigned when a candidate names none.
pub const DEFAULT_CATEGORY_NAME: &str = "General";

/// Color of the default category.
pub const DEFAULT_CATEGORY_COLOR: &str = "#808080";

/// Icon for categories created by ingestion.
pub const DEFAULT_CATEGORY_ICON: &str = "folder";

// =============================================================================
// FALLBACK
// =============================================================================

/// Maximum fallback title length in characters, ellipsis included.
pub const FALLBACK_TITLE_MAX_CHARS: usize = 100;

/// Marker appended to a truncated fallback title.
pub const FALLBACK_ELLIPSIS: &str = "...";

/// Fallback due date offset from now (hours).
pub const FALLBACK_DUE_HOURS: i64 = 24;

/// Fallback reminder lead before the due date (minutes).
pub const FALLBACK_REMINDER_LEAD_MINUTES: i64 = 15;

/// Maximum number of heuristic tags on a fallback task.
pub const FALLBACK_MAX_TAGS: usize = 3;

/// Heuristic tags must be strictly longer than this many characters.
pub const FALLBACK_TAG_MIN_EXCLUSIVE_LEN: usize = 4;

/// Title used when nothing printable survives fallback sanitizing.
pub const FALLBACK_EMPTY_TITLE: &str = "Untitled task";
