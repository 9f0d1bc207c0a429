//! Core traits for clerk abstractions.
//!
//! These traits define the seams between the pipeline and its collaborators:
//! AI extraction backends and the transactional persistence layer.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// EXTRACTION BACKEND
// =============================================================================

/// A text-in/text-out AI service used to extract tasks.
///
/// Implementations perform exactly one remote call per `extract` and never
/// retry; every transport, status or payload failure is reported as
/// [`Error::BackendUnavailable`](crate::Error::BackendUnavailable).
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Send the prompt and return the model's raw text answer.
    async fn extract(&self, prompt: &str) -> Result<String>;

    /// Provider name ("ollama", "qianwen", "openai", ...).
    fn provider(&self) -> &str;

    /// Model the backend talks to.
    fn model_name(&self) -> &str;

    /// Identifier recorded as `ai_model_used`, e.g. `ollama:llama2`.
    fn identifier(&self) -> String {
        format!("{}:{}", self.provider(), self.model_name())
    }

    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Owner lookup.
#[async_trait]
pub trait OwnerRepository: Send + Sync {
    /// Fetch the owner with their settings, if they exist.
    async fn find_owner(&self, id: Uuid) -> Result<Option<Owner>>;
}

/// Store that can open an ingestion unit of work.
#[async_trait]
pub trait IngestionStore: OwnerRepository {
    /// Begin a transaction. Nothing is visible to other readers until commit.
    async fn begin(&self) -> Result<Box<dyn IngestionTx>>;
}

/// One ingestion's unit of work.
///
/// Dropping the transaction without calling [`IngestionTx::commit`] rolls
/// everything back.
#[async_trait]
pub trait IngestionTx: Send {
    async fn insert_raw_input(&mut self, req: NewRawInput) -> Result<RawInput>;

    async fn insert_processing_result(
        &mut self,
        req: NewProcessingResult,
    ) -> Result<AiProcessingResult>;

    async fn find_category(&mut self, owner_id: Uuid, name: &str) -> Result<Option<Category>>;

    /// The owner's category flagged `is_default`, if any.
    async fn find_default_category(&mut self, owner_id: Uuid) -> Result<Option<Category>>;

    /// Create a category. Returns [`Error::ConflictOnCreate`](crate::Error::ConflictOnCreate)
    /// when another writer already holds `(owner, name)` or the owner's default slot.
    async fn create_category(&mut self, req: NewCategory) -> Result<Category>;

    async fn find_tag(&mut self, owner_id: Uuid, name: &str) -> Result<Option<Tag>>;

    /// Create a tag. Returns [`Error::ConflictOnCreate`](crate::Error::ConflictOnCreate)
    /// when another writer already holds `(owner, name)`.
    async fn create_tag(&mut self, owner_id: Uuid, name: &str) -> Result<Tag>;

    async fn insert_task(&mut self, req: NewTask) -> Result<Task>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
