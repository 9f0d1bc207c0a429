//! # clerk-db
//!
//! PostgreSQL persistence for the clerk ingestion pipeline.
//!
//! Provides the connection pool, owner lookup, and the transactional
//! [`IngestionStore`](clerk_core::IngestionStore) used by the pipeline.

pub mod ingestion;
pub mod pool;
pub mod test_fixtures;
pub mod users;

pub use clerk_core::*;

pub use ingestion::{PgIngestionStore, PgIngestionTx};
pub use pool::{create_pool, create_pool_with_config, log_pool_health, PoolConfig, PoolStats};
pub use users::PgUserRepository;

/// Database handle bundling the pool and repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Owner lookup and registration.
    pub users: PgUserRepository,
    /// Transactional store used by the ingestion pipeline.
    pub ingestion: PgIngestionStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            ingestion: PgIngestionStore::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
