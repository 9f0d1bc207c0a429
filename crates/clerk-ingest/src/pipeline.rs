//! Ingestion orchestration.
//!
//! ```text
//! RECEIVED -> EXTRACTING -> EXTRACTED -> MATERIALIZED
//!                        \-> DEGRADED --/
//! ```
//!
//! Extraction runs before any write, so no database transaction is held
//! open across the network call. Raw input, audit record and tasks are then
//! written in a single transaction. Backend and parse failures never reach
//! the caller: they demote the run to DEGRADED and the fallback candidate is
//! materialized instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use clerk_core::{
    defaults, AiProcessingResult, Error, ExtractionBackend, IngestionStore, InputType,
    NewProcessingResult, NewRawInput, Owner, RawInput, Result, Task, TaskCandidate,
};
use clerk_inference::{
    BackendSelector, FallbackGenerator, PromptBuilder, PromptLocale, ResponseParser,
};

use crate::materializer::EntityMaterializer;

/// Identifier recorded when no backend could be selected.
const NO_BACKEND: &str = "none";

/// Lifecycle of one ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestionState {
    Received,
    Extracting,
    Extracted,
    Degraded,
    Materialized,
}

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on a single `extract` call.
    pub extraction_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction_timeout: Duration::from_secs(defaults::EXTRACTION_TIMEOUT_SECS),
        }
    }
}

impl PipelineConfig {
    /// Read `CLERK_EXTRACTION_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let secs = std::env::var("CLERK_EXTRACTION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::EXTRACTION_TIMEOUT_SECS);
        Self {
            extraction_timeout: Duration::from_secs(secs),
        }
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }
}

/// Everything one ingestion produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub raw_input: RawInput,
    pub processing_result: AiProcessingResult,
    pub tasks: Vec<Task>,
    /// States visited, in order. Always ends in `Materialized`.
    pub transitions: Vec<IngestionState>,
}

impl IngestionReport {
    pub fn is_degraded(&self) -> bool {
        self.transitions.contains(&IngestionState::Degraded)
    }
}

/// Outcome of the extraction phase.
struct Extraction {
    candidates: Vec<TaskCandidate>,
    model_used: String,
    elapsed_ms: i64,
    failure: Option<Error>,
}

/// Natural-language ingestion entry point.
pub struct IngestionPipeline {
    store: Arc<dyn IngestionStore>,
    selector: BackendSelector,
    parser: ResponseParser,
    fallback: FallbackGenerator,
    materializer: EntityMaterializer,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn IngestionStore>, selector: BackendSelector) -> Self {
        Self {
            store,
            selector,
            parser: ResponseParser::new(),
            fallback: FallbackGenerator::new(),
            materializer: EntityMaterializer::new(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    /// Ingest text for an owner and return the persisted tasks.
    ///
    /// Returns at least one task for any non-blank input and existing owner.
    pub async fn ingest(&self, owner_id: Uuid, text: &str) -> Result<Vec<Task>> {
        self.ingest_with_type(owner_id, text, InputType::Text).await
    }

    /// Like [`ingest`](Self::ingest), recording how the input arrived.
    pub async fn ingest_with_type(
        &self,
        owner_id: Uuid,
        text: &str,
        input_type: InputType,
    ) -> Result<Vec<Task>> {
        Ok(self.ingest_detailed(owner_id, text, input_type).await?.tasks)
    }

    /// Ingest using the backend selected from the owner's preference.
    #[instrument(skip(self, text), fields(subsystem = "ingest", component = "pipeline", op = "ingest", owner_id = %owner_id, input_len = text.len()))]
    pub async fn ingest_detailed(
        &self,
        owner_id: Uuid,
        text: &str,
        input_type: InputType,
    ) -> Result<IngestionReport> {
        let owner = self.load_owner(owner_id, text).await?;

        let backend = match self.selector.select(owner.settings.ai_model.as_deref()) {
            Ok(backend) => Some(backend),
            Err(e) => {
                warn!(error = %e, "No extraction backend available, ingestion will degrade");
                None
            }
        };

        self.run(&owner, text, input_type, backend).await
    }

    /// Ingest using an explicitly supplied backend.
    #[instrument(skip(self, text, backend), fields(subsystem = "ingest", component = "pipeline", op = "ingest", owner_id = %owner_id, input_len = text.len(), backend = %backend.identifier()))]
    pub async fn ingest_with_backend(
        &self,
        owner_id: Uuid,
        text: &str,
        input_type: InputType,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Result<IngestionReport> {
        let owner = self.load_owner(owner_id, text).await?;
        self.run(&owner, text, input_type, Some(backend)).await
    }

    /// Validate input and resolve the owner. Nothing is written before this.
    async fn load_owner(&self, owner_id: Uuid, text: &str) -> Result<Owner> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("input text is empty".to_string()));
        }
        self.store
            .find_owner(owner_id)
            .await?
            .ok_or(Error::OwnerNotFound(owner_id))
    }

    async fn run(
        &self,
        owner: &Owner,
        text: &str,
        input_type: InputType,
        backend: Option<Arc<dyn ExtractionBackend>>,
    ) -> Result<IngestionReport> {
        let received_at = Utc::now();
        let mut transitions = vec![IngestionState::Received];

        let locale = PromptLocale::from_language_tag(owner.settings.preferred_language.as_deref());
        let prompt = PromptBuilder::new(locale).build(text);

        transitions.push(IngestionState::Extracting);
        let backend_id = backend
            .as_ref()
            .map(|b| b.identifier())
            .unwrap_or_else(|| NO_BACKEND.to_string());
        debug!(?locale, backend = %backend_id, "RECEIVED -> EXTRACTING");

        let extraction = self.extract(backend.as_deref(), &prompt).await;
        let degraded = extraction.failure.is_some();
        let candidates = if degraded {
            transitions.push(IngestionState::Degraded);
            vec![self.fallback.generate_at(text, received_at)]
        } else {
            transitions.push(IngestionState::Extracted);
            extraction.candidates
        };

        let processing = NewProcessingResult {
            raw_input_id: Uuid::nil(),
            processed_content: processed_content(&candidates)?,
            extracted_entities: Some(extracted_entities(&candidates)?),
            ai_model_used: extraction.model_used,
            processing_time_ms: extraction.elapsed_ms,
            confidence_score: if degraded {
                defaults::DEGRADED_CONFIDENCE
            } else {
                defaults::EXTRACTION_CONFIDENCE
            },
            degraded,
            failure_reason: extraction.failure.as_ref().map(|e| e.to_string()),
        };

        let mut tx = self.store.begin().await?;
        let mut raw_input = tx
            .insert_raw_input(NewRawInput {
                owner_id: owner.id,
                content: text.to_string(),
                input_type,
                received_at,
            })
            .await?;
        let processing_result = tx
            .insert_processing_result(NewProcessingResult {
                raw_input_id: raw_input.id,
                ..processing
            })
            .await?;
        let tasks = self
            .materializer
            .materialize(&mut *tx, owner.id, &mut raw_input, &candidates)
            .await?;
        tx.commit().await?;

        transitions.push(IngestionState::Materialized);
        info!(
            raw_input_id = %raw_input.id,
            task_count = tasks.len(),
            degraded,
            model = %processing_result.ai_model_used,
            duration_ms = processing_result.processing_time_ms,
            "Ingestion complete"
        );

        Ok(IngestionReport {
            raw_input,
            processing_result,
            tasks,
            transitions,
        })
    }

    /// Single bounded extraction attempt. Never retries.
    async fn extract(&self, backend: Option<&dyn ExtractionBackend>, prompt: &str) -> Extraction {
        let Some(backend) = backend else {
            return Extraction {
                candidates: Vec::new(),
                model_used: NO_BACKEND.to_string(),
                elapsed_ms: 0,
                failure: Some(Error::BackendUnavailable(
                    "no extraction backend is configured".to_string(),
                )),
            };
        };

        let start = Instant::now();
        let timeout = self.config.extraction_timeout;

        let outcome = match tokio::time::timeout(timeout, backend.extract(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(Error::BackendUnavailable(format!(
                "extraction timed out after {}ms",
                timeout.as_millis()
            ))),
        }
        .and_then(|raw| self.parser.parse(&raw));

        let elapsed_ms = start.elapsed().as_millis() as i64;
        let model_used = backend.identifier();

        match outcome {
            Ok(candidates) => {
                debug!(candidate_count = candidates.len(), duration_ms = elapsed_ms, "Extraction succeeded");
                Extraction {
                    candidates,
                    model_used,
                    elapsed_ms,
                    failure: None,
                }
            }
            Err(e) => {
                if e.is_recoverable_extraction() {
                    warn!(error = %e, model = %model_used, duration_ms = elapsed_ms, "Extraction failed, using fallback");
                } else {
                    error!(error = %e, model = %model_used, "Unexpected extraction error, using fallback");
                }
                Extraction {
                    candidates: Vec::new(),
                    model_used,
                    elapsed_ms,
                    failure: Some(e),
                }
            }
        }
    }
}

/// JSON of the candidates, bounded in length.
fn processed_content(candidates: &[TaskCandidate]) -> Result<String> {
    let json = serde_json::to_string(candidates)?;
    Ok(truncate_chars(json, defaults::PROCESSED_CONTENT_MAX_CHARS))
}

/// Categories and tags referenced by the candidates, first occurrence wins.
fn extracted_entities(candidates: &[TaskCandidate]) -> Result<String> {
    let mut categories: Vec<&str> = Vec::new();
    let mut tags: Vec<&str> = Vec::new();
    for candidate in candidates {
        if !categories.contains(&candidate.category.as_str()) {
            categories.push(&candidate.category);
        }
        for tag in &candidate.tags {
            if !tags.contains(&tag.as_str()) {
                tags.push(tag);
            }
        }
    }
    Ok(serde_json::to_string(&serde_json::json!({
        "categories": categories,
        "tags": tags,
    }))?)
}

fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef".to_string(), 3), "abc");
        assert_eq!(truncate_chars("ab".to_string(), 3), "ab");
        assert_eq!(truncate_chars("任务清单".to_string(), 2), "任务");
    }

    #[test]
    fn test_extracted_entities_dedupes() {
        let mut a = TaskCandidate::new("a");
        a.category = "Meeting".to_string();
        a.tags = vec!["aws".to_string(), "cloud".to_string()];
        let mut b = TaskCandidate::new("b");
        b.category = "Meeting".to_string();
        b.tags = vec!["aws".to_string()];

        let json: serde_json::Value =
            serde_json::from_str(&extracted_entities(&[a, b]).unwrap()).unwrap();
        assert_eq!(json["categories"], serde_json::json!(["Meeting"]));
        assert_eq!(json["tags"], serde_json::json!(["aws", "cloud"]));
    }

    #[test]
    fn test_state_serializes_screaming_case() {
        assert_eq!(
            serde_json::to_string(&IngestionState::Materialized).unwrap(),
            "\"MATERIALIZED\""
        );
    }

    #[test]
    fn test_default_config() {
        assert_eq!(
            PipelineConfig::default().extraction_timeout,
            Duration::from_secs(45)
        );
    }
}
