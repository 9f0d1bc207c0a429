//! Transactional persistence for one ingestion.
//!
//! Category and tag creation uses `INSERT ... ON CONFLICT DO NOTHING
//! RETURNING`. When a concurrent transaction already holds the key the
//! insert returns no row and the call reports `ConflictOnCreate`; the caller
//! re-reads, and under READ COMMITTED the winner's row is visible once its
//! transaction commits.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use clerk_core::{
    AiProcessingResult, Category, Error, IngestionStore, IngestionTx, NewCategory,
    NewProcessingResult, NewRawInput, NewTask, Owner, OwnerRepository, RawInput, Result, Tag, Task,
};

use crate::users::PgUserRepository;

const CATEGORY_COLUMNS: &str = "id, owner_id, name, color, icon, is_default, created_at_utc";
const TAG_COLUMNS: &str = "id, owner_id, name, created_at_utc";

fn category_from_row(r: &PgRow) -> Category {
    Category {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        name: r.get("name"),
        color: r.get("color"),
        icon: r.get("icon"),
        is_default: r.get("is_default"),
        created_at_utc: r.get("created_at_utc"),
    }
}

fn tag_from_row(r: &PgRow) -> Tag {
    Tag {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        name: r.get("name"),
        created_at_utc: r.get("created_at_utc"),
    }
}

/// PostgreSQL ingestion store.
#[derive(Clone)]
pub struct PgIngestionStore {
    pool: PgPool,
    users: PgUserRepository,
}

impl PgIngestionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl OwnerRepository for PgIngestionStore {
    async fn find_owner(&self, id: Uuid) -> Result<Option<Owner>> {
        self.users.find_owner(id).await
    }
}

#[async_trait]
impl IngestionStore for PgIngestionStore {
    async fn begin(&self) -> Result<Box<dyn IngestionTx>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PgIngestionTx { tx }))
    }
}

/// An open ingestion transaction. Rolled back on drop unless committed.
pub struct PgIngestionTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IngestionTx for PgIngestionTx {
    async fn insert_raw_input(&mut self, req: NewRawInput) -> Result<RawInput> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO raw_input (id, owner_id, content, input_type, created_at_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(req.owner_id)
        .bind(&req.content)
        .bind(req.input_type.as_str())
        .bind(req.received_at)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(RawInput {
            id,
            owner_id: req.owner_id,
            content: req.content,
            input_type: req.input_type,
            created_at_utc: req.received_at,
            generated_task_ids: Vec::new(),
        })
    }

    async fn insert_processing_result(
        &mut self,
        req: NewProcessingResult,
    ) -> Result<AiProcessingResult> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO ai_processing_result (
                id, raw_input_id, processed_content, extracted_entities, ai_model_used,
                processing_time_ms, confidence_score, degraded, failure_reason, created_at_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(req.raw_input_id)
        .bind(&req.processed_content)
        .bind(&req.extracted_entities)
        .bind(&req.ai_model_used)
        .bind(req.processing_time_ms)
        .bind(req.confidence_score)
        .bind(req.degraded)
        .bind(&req.failure_reason)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(AiProcessingResult {
            id,
            raw_input_id: req.raw_input_id,
            processed_content: req.processed_content,
            extracted_entities: req.extracted_entities,
            ai_model_used: req.ai_model_used,
            processing_time_ms: req.processing_time_ms,
            confidence_score: req.confidence_score,
            degraded: req.degraded,
            failure_reason: req.failure_reason,
            created_at_utc: now,
        })
    }

    async fn find_category(&mut self, owner_id: Uuid, name: &str) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM category WHERE owner_id = $1 AND name = $2",
            CATEGORY_COLUMNS
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(category_from_row))
    }

    async fn find_default_category(&mut self, owner_id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM category WHERE owner_id = $1 AND is_default",
            CATEGORY_COLUMNS
        ))
        .bind(owner_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(category_from_row))
    }

    async fn create_category(&mut self, req: NewCategory) -> Result<Category> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO category (id, owner_id, name, color, icon, is_default, created_at_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(req.owner_id)
        .bind(&req.name)
        .bind(&req.color)
        .bind(&req.icon)
        .bind(req.is_default)
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(r) => Ok(category_from_row(&r)),
            None => {
                debug!(owner_id = %req.owner_id, name = %req.name, "Category insert conflicted");
                Err(Error::ConflictOnCreate {
                    entity: "category",
                    name: req.name,
                })
            }
        }
    }

    async fn find_tag(&mut self, owner_id: Uuid, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tag WHERE owner_id = $1 AND name = $2",
            TAG_COLUMNS
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(tag_from_row))
    }

    async fn create_tag(&mut self, owner_id: Uuid, name: &str) -> Result<Tag> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tag (id, owner_id, name, created_at_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            TAG_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(owner_id)
        .bind(name)
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(r) => Ok(tag_from_row(&r)),
            None => {
                debug!(owner_id = %owner_id, name, "Tag insert conflicted");
                Err(Error::ConflictOnCreate {
                    entity: "tag",
                    name: name.to_string(),
                })
            }
        }
    }

    async fn insert_task(&mut self, req: NewTask) -> Result<Task> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO task (
                id, owner_id, title, description, due_date, reminder_time, priority,
                category_id, raw_input_id, original_input_text, created_at_utc, completed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE)
            "#,
        )
        .bind(id)
        .bind(req.owner_id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.due_date)
        .bind(req.reminder_time)
        .bind(req.priority.as_str())
        .bind(req.category.id)
        .bind(req.raw_input_id)
        .bind(&req.original_input_text)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        for tag in &req.tags {
            sqlx::query(
                "INSERT INTO task_tag (task_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(tag.id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        }

        Ok(Task {
            id,
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
            created_at_utc: now,
            completed: false,
            completed_at: None,
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(Error::Database)
    }
}
