//! Owner lookup and registration.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use clerk_core::{Error, Owner, OwnerRepository, Result, UserSettings};

/// PostgreSQL owner repository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register an owner together with their settings row.
    pub async fn create_owner(&self, username: &str, settings: UserSettings) -> Result<Owner> {
        let id = Uuid::now_v7();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("INSERT INTO app_user (id, username, created_at_utc) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(username)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO user_settings (user_id, ai_model, preferred_language) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(&settings.ai_model)
        .bind(&settings.preferred_language)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        Ok(Owner {
            id,
            username: username.to_string(),
            settings,
        })
    }
}

#[async_trait]
impl OwnerRepository for PgUserRepository {
    async fn find_owner(&self, id: Uuid) -> Result<Option<Owner>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.username, s.ai_model, s.preferred_language
            FROM app_user u
            LEFT JOIN user_settings s ON s.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| Owner {
            id: r.get("id"),
            username: r.get("username"),
            settings: UserSettings {
                ai_model: r.get("ai_model"),
                preferred_language: r.get("preferred_language"),
            },
        }))
    }
}
