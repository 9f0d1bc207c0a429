//! In-memory ingestion store.
//!
//! Raw inputs, processing results and tasks are staged per transaction and
//! only become visible on commit. Categories and tags are claimed in the
//! shared namespace as soon as they are created, mirroring a unique index:
//! a second writer for the same `(owner, name)` gets `ConflictOnCreate`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use clerk_core::{
    AiProcessingResult, Category, Error, IngestionStore, IngestionTx, NewCategory,
    NewProcessingResult, NewRawInput, NewTask, Owner, OwnerRepository, RawInput, Result, Tag, Task,
    UserSettings,
};

#[derive(Default)]
struct MemoryState {
    owners: HashMap<Uuid, Owner>,
    raw_inputs: Vec<RawInput>,
    processing_results: Vec<AiProcessingResult>,
    tasks: Vec<Task>,
    categories: Vec<Category>,
    tags: Vec<Tag>,
    /// Number of upcoming creates that lose to a simulated concurrent writer.
    pending_races: usize,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an owner.
    pub fn add_owner(&self, username: &str, settings: UserSettings) -> Owner {
        let owner = Owner {
            id: Uuid::now_v7(),
            username: username.to_string(),
            settings,
        };
        self.lock().owners.insert(owner.id, owner.clone());
        owner
    }

    /// Make the next `count` category/tag creates behave as if another
    /// writer inserted the same key first: the row is stored, and the
    /// caller receives `ConflictOnCreate`.
    pub fn simulate_create_races(&self, count: usize) {
        self.lock().pending_races = count;
    }

    pub fn raw_inputs(&self) -> Vec<RawInput> {
        self.lock().raw_inputs.clone()
    }

    pub fn processing_results(&self) -> Vec<AiProcessingResult> {
        self.lock().processing_results.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub fn categories(&self, owner_id: Uuid) -> Vec<Category> {
        self.lock()
            .categories
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect()
    }

    pub fn tags(&self, owner_id: Uuid) -> Vec<Tag> {
        self.lock()
            .tags
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OwnerRepository for MemoryStore {
    async fn find_owner(&self, id: Uuid) -> Result<Option<Owner>> {
        Ok(self.lock().owners.get(&id).cloned())
    }
}

#[async_trait]
impl IngestionStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn IngestionTx>> {
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            raw_inputs: Vec::new(),
            processing_results: Vec::new(),
            tasks: Vec::new(),
        }))
    }
}

/// Staged writes of one ingestion.
pub struct MemoryTx {
    store: MemoryStore,
    raw_inputs: Vec<RawInput>,
    processing_results: Vec<AiProcessingResult>,
    tasks: Vec<Task>,
}

impl MemoryTx {
    fn ensure_owner(&self, owner_id: Uuid) -> Result<()> {
        if self.store.lock().owners.contains_key(&owner_id) {
            Ok(())
        } else {
            Err(Error::OwnerNotFound(owner_id))
        }
    }
}

#[async_trait]
impl IngestionTx for MemoryTx {
    async fn insert_raw_input(&mut self, req: NewRawInput) -> Result<RawInput> {
        self.ensure_owner(req.owner_id)?;
        let raw = RawInput {
            id: Uuid::now_v7(),
            owner_id: req.owner_id,
            content: req.content,
            input_type: req.input_type,
            created_at_utc: req.received_at,
            generated_task_ids: Vec::new(),
        };
        self.raw_inputs.push(raw.clone());
        Ok(raw)
    }

    async fn insert_processing_result(
        &mut self,
        req: NewProcessingResult,
    ) -> Result<AiProcessingResult> {
        let duplicate = self
            .processing_results
            .iter()
            .any(|r| r.raw_input_id == req.raw_input_id)
            || self
                .store
                .lock()
                .processing_results
                .iter()
                .any(|r| r.raw_input_id == req.raw_input_id);
        if duplicate {
            return Err(Error::InvalidInput(format!(
                "raw input {} already has a processing result",
                req.raw_input_id
            )));
        }

        let result = AiProcessingResult {
            id: Uuid::now_v7(),
            raw_input_id: req.raw_input_id,
            processed_content: req.processed_content,
            extracted_entities: req.extracted_entities,
            ai_model_used: req.ai_model_used,
            processing_time_ms: req.processing_time_ms,
            confidence_score: req.confidence_score,
            degraded: req.degraded,
            failure_reason: req.failure_reason,
            created_at_utc: Utc::now(),
        };
        self.processing_results.push(result.clone());
        Ok(result)
    }

    async fn find_category(&mut self, owner_id: Uuid, name: &str) -> Result<Option<Category>> {
        Ok(self
            .store
            .lock()
            .categories
            .iter()
            .find(|c| c.owner_id == owner_id && c.name == name)
            .cloned())
    }

    async fn find_default_category(&mut self, owner_id: Uuid) -> Result<Option<Category>> {
        Ok(self
            .store
            .lock()
            .categories
            .iter()
            .find(|c| c.owner_id == owner_id && c.is_default)
            .cloned())
    }

    async fn create_category(&mut self, req: NewCategory) -> Result<Category> {
        let mut state = self.store.lock();

        let taken = state.categories.iter().any(|c| {
            c.owner_id == req.owner_id && (c.name == req.name || (req.is_default && c.is_default))
        });
        let conflict = Error::ConflictOnCreate {
            entity: "category",
            name: req.name.clone(),
        };
        if taken {
            return Err(conflict);
        }

        let category = Category {
            id: Uuid::now_v7(),
            owner_id: req.owner_id,
            name: req.name,
            color: req.color,
            icon: req.icon,
            is_default: req.is_default,
            created_at_utc: Utc::now(),
        };

        if state.pending_races > 0 {
            state.pending_races -= 1;
            state.categories.push(category);
            return Err(conflict);
        }

        state.categories.push(category.clone());
        Ok(category)
    }

    async fn find_tag(&mut self, owner_id: Uuid, name: &str) -> Result<Option<Tag>> {
        Ok(self
            .store
            .lock()
            .tags
            .iter()
            .find(|t| t.owner_id == owner_id && t.name == name)
            .cloned())
    }

    async fn create_tag(&mut self, owner_id: Uuid, name: &str) -> Result<Tag> {
        let mut state = self.store.lock();

        let taken = state
            .tags
            .iter()
            .any(|t| t.owner_id == owner_id && t.name == name);
        let conflict = Error::ConflictOnCreate {
            entity: "tag",
            name: name.to_string(),
        };
        if taken {
            return Err(conflict);
        }

        let tag = Tag {
            id: Uuid::now_v7(),
            owner_id,
            name: name.to_string(),
            created_at_utc: Utc::now(),
        };

        if state.pending_races > 0 {
            state.pending_races -= 1;
            state.tags.push(tag);
            return Err(conflict);
        }

        state.tags.push(tag.clone());
        Ok(tag)
    }

    async fn insert_task(&mut self, req: NewTask) -> Result<Task> {
        let task = Task {
            id: Uuid::now_v7(),
            owner_id: req.owner_id,
            title: req.title,
            description: req.description,
            due_date: req.due_date,
            reminder_time: req.reminder_time,
            priority: req.priority,
            category: req.category,
            tags: req.tags,
            raw_input_id: req.raw_input_id,
            original_input_text: req.original_input_text,
            created_at_utc: Utc::now(),
            completed: false,
            completed_at: None,
        };
        self.tasks.push(task.clone());
        Ok(task)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx {
            store,
            mut raw_inputs,
            processing_results,
            tasks,
        } = *self;

        for raw in &mut raw_inputs {
            raw.generated_task_ids = tasks
                .iter()
                .filter(|t| t.raw_input_id == Some(raw.id))
                .map(|t| t.id)
                .collect();
        }

        let mut state = store.lock();
        state.raw_inputs.extend(raw_inputs);
        state.processing_results.extend(processing_results);
        state.tasks.extend(tasks);
        Ok(())
    }
}
