//! Turns task candidates into persisted, linked entities.
//!
//! Categories and tags are resolved with get-or-create against the owner's
//! namespace. A create that loses a race to a concurrent ingestion reports
//! `ConflictOnCreate`; the materializer then re-reads and links the winner's
//! row, so two ingestions inventing the same category end up sharing it.
//!
//! Every name a call needs is resolved before the first task is written:
//! all categories, then all tags, each in sorted order. A pending create
//! holds its unique key until the transaction ends, so a fixed acquisition
//! order keeps concurrent ingestions from waiting on each other in a cycle.

use std::collections::{BTreeSet, HashMap};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use clerk_core::{
    defaults, Category, Error, IngestionTx, NewCategory, NewTask, RawInput, Result, Tag, Task,
    TaskCandidate,
};

/// Deterministic `#rrggbb` color for a category name.
pub fn category_color(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    format!("#{}", hex::encode(&digest[..3]))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EntityMaterializer;

impl EntityMaterializer {
    pub fn new() -> Self {
        Self
    }

    /// Persist one task per candidate, in order, inside `tx`.
    ///
    /// On success `raw_input.generated_task_ids` lists the new task ids.
    pub async fn materialize(
        &self,
        tx: &mut dyn IngestionTx,
        owner_id: Uuid,
        raw_input: &mut RawInput,
        candidates: &[TaskCandidate],
    ) -> Result<Vec<Task>> {
        if raw_input.owner_id != owner_id {
            return Err(Error::InvalidInput(format!(
                "raw input {} does not belong to owner {}",
                raw_input.id, owner_id
            )));
        }

        let mut categories: HashMap<&str, Category> = HashMap::new();
        for name in category_names(candidates) {
            let category = resolve_category(tx, owner_id, name).await?;
            categories.insert(name, category);
        }

        let mut tags: HashMap<&str, Tag> = HashMap::new();
        for name in tag_names(candidates) {
            let tag = resolve_tag(tx, owner_id, name).await?;
            tags.insert(name, tag);
        }

        let mut tasks = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let category = categories
                .get(candidate.category.as_str())
                .cloned()
                .ok_or_else(|| unresolved("category", &candidate.category))?;

            let task_tags = normalized_tag_names(&candidate.tags)
                .into_iter()
                .map(|name| {
                    tags.get(name)
                        .cloned()
                        .ok_or_else(|| unresolved("tag", name))
                })
                .collect::<Result<Vec<Tag>>>()?;

            let task = tx
                .insert_task(NewTask {
                    owner_id,
                    title: candidate.title.clone(),
                    description: candidate.description.clone(),
                    due_date: candidate.due_date,
                    reminder_time: candidate.reminder_time,
                    priority: candidate.priority,
                    category,
                    tags: task_tags,
                    raw_input_id: Some(raw_input.id),
                    original_input_text: Some(raw_input.content.clone()),
                })
                .await?;

            debug!(task_id = %task.id, category = %task.category.name, tag_count = task.tags.len(), "Task materialized");
            tasks.push(task);
        }

        raw_input
            .generated_task_ids
            .extend(tasks.iter().map(|t| t.id));
        Ok(tasks)
    }
}

/// Distinct category names of the batch, sorted.
fn category_names(candidates: &[TaskCandidate]) -> BTreeSet<&str> {
    candidates.iter().map(|c| c.category.as_str()).collect()
}

/// Distinct normalized tag names of the batch, sorted.
fn tag_names(candidates: &[TaskCandidate]) -> BTreeSet<&str> {
    candidates
        .iter()
        .flat_map(|c| normalized_tag_names(&c.tags))
        .collect()
}

/// Trimmed, non-empty, first-occurrence-wins tag names.
fn normalized_tag_names(raw: &[String]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::with_capacity(raw.len());
    for name in raw.iter().map(|n| n.trim()) {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

async fn resolve_category(tx: &mut dyn IngestionTx, owner_id: Uuid, name: &str) -> Result<Category> {
    if name == defaults::DEFAULT_CATEGORY_NAME {
        return resolve_default_category(tx, owner_id).await;
    }

    if let Some(existing) = tx.find_category(owner_id, name).await? {
        return Ok(existing);
    }

    let created = tx
        .create_category(NewCategory {
            owner_id,
            name: name.to_string(),
            color: category_color(name),
            icon: defaults::DEFAULT_CATEGORY_ICON.to_string(),
            is_default: false,
        })
        .await;

    match created {
        Ok(category) => {
            debug!(category = %category.name, color = %category.color, "Created category");
            Ok(category)
        }
        Err(e) if e.is_conflict() => {
            warn!(owner_id = %owner_id, category = name, "Category created concurrently, using existing row");
            tx.find_category(owner_id, name)
                .await?
                .ok_or_else(|| lost_winner("category", name))
        }
        Err(e) => Err(e),
    }
}

/// The owner's default category, creating "General" as default if needed.
async fn resolve_default_category(tx: &mut dyn IngestionTx, owner_id: Uuid) -> Result<Category> {
    let name = defaults::DEFAULT_CATEGORY_NAME;

    if let Some(default) = tx.find_default_category(owner_id).await? {
        return Ok(default);
    }
    if let Some(existing) = tx.find_category(owner_id, name).await? {
        return Ok(existing);
    }

    let created = tx
        .create_category(NewCategory {
            owner_id,
            name: name.to_string(),
            color: defaults::DEFAULT_CATEGORY_COLOR.to_string(),
            icon: defaults::DEFAULT_CATEGORY_ICON.to_string(),
            is_default: true,
        })
        .await;

    match created {
        Ok(category) => {
            debug!(owner_id = %owner_id, "Created default category");
            Ok(category)
        }
        Err(e) if e.is_conflict() => {
            warn!(owner_id = %owner_id, "Default category created concurrently, using existing row");
            match tx.find_default_category(owner_id).await? {
                Some(default) => Ok(default),
                None => tx
                    .find_category(owner_id, name)
                    .await?
                    .ok_or_else(|| lost_winner("category", name)),
            }
        }
        Err(e) => Err(e),
    }
}

async fn resolve_tag(tx: &mut dyn IngestionTx, owner_id: Uuid, name: &str) -> Result<Tag> {
    if let Some(existing) = tx.find_tag(owner_id, name).await? {
        return Ok(existing);
    }

    match tx.create_tag(owner_id, name).await {
        Ok(tag) => Ok(tag),
        Err(e) if e.is_conflict() => {
            warn!(owner_id = %owner_id, tag = name, "Tag created concurrently, using existing row");
            tx.find_tag(owner_id, name)
                .await?
                .ok_or_else(|| lost_winner("tag", name))
        }
        Err(e) => Err(e),
    }
}

fn unresolved(entity: &str, name: &str) -> Error {
    Error::Internal(format!("{} '{}' was not resolved before task insert", entity, name))
}

fn lost_winner(entity: &str, name: &str) -> Error {
    Error::Internal(format!(
        "{} '{}' conflicted on create but no existing row is visible",
        entity, name
    ))
}
