//! Connection pool setup for ingestion workloads.
//!
//! Each ingestion holds one connection for the length of its write
//! transaction, so `max_connections` bounds how many ingestions can persist
//! at the same time; the rest queue for up to `acquire_timeout`.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use clerk_core::{Error, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// Pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Upper bound on concurrently persisting ingestions.
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long an ingestion waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections until they fail or go idle.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Defaults overridden by `CLERK_DB_MAX_CONNECTIONS`,
    /// `CLERK_DB_MIN_CONNECTIONS`, `CLERK_DB_ACQUIRE_TIMEOUT_SECS`,
    /// `CLERK_DB_IDLE_TIMEOUT_SECS` and `CLERK_DB_MAX_LIFETIME_SECS`
    /// (`0` disables the lifetime cap).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse_u32 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u32>().ok());
        let parse_secs = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let defaults = Self::default();
        let max_connections = parse_u32("CLERK_DB_MAX_CONNECTIONS")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_connections);
        let min_connections = parse_u32("CLERK_DB_MIN_CONNECTIONS")
            .unwrap_or(defaults.min_connections)
            .min(max_connections);

        Self {
            max_connections,
            min_connections,
            acquire_timeout: parse_secs("CLERK_DB_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            idle_timeout: parse_secs("CLERK_DB_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            max_lifetime: match parse_secs("CLERK_DB_MAX_LIFETIME_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.max_lifetime,
            },
        }
    }
}

/// Create a pool with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = "database",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Creating database connection pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);

    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(max_lifetime);
    }

    let pool = options
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub max_connections: u32,
}

impl PoolStats {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle() as u32,
            max_connections: pool.options().get_max_connections(),
        }
    }

    pub fn in_use(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }

    /// Every allowed connection is checked out; new ingestions will queue.
    pub fn is_saturated(&self) -> bool {
        self.max_connections > 0 && self.in_use() >= self.max_connections
    }
}

/// Log pool occupancy, warning when ingestions would queue.
pub fn log_pool_health(pool: &PgPool) -> PoolStats {
    let stats = PoolStats::of(pool);

    debug!(
        subsystem = "database",
        component = "pool",
        op = "health",
        pool_size = stats.size,
        pool_idle = stats.idle,
        in_use = stats.in_use(),
        "Pool health"
    );

    if stats.is_saturated() {
        warn!(
            subsystem = "database",
            component = "pool",
            max_connections = stats.max_connections,
            "All database connections in use, ingestions are queueing"
        );
    }
    stats
}
