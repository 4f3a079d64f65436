use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    ConnectOptions, PgPool,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{self, DatabaseConfig};

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Lazily created, cached connection pools keyed by database name
pub struct DatabaseManager {
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl DatabaseManager {
    fn instance() -> &'static DatabaseManager {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<DatabaseManager> = OnceLock::new();
        INSTANCE.get_or_init(DatabaseManager::new)
    }

    pub fn new() -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Pool for the database named in the configured URL
    pub async fn default_pool() -> Result<PgPool, DatabaseError> {
        let base = Self::base_url()?;
        let url = url::Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        let name = url.path().trim_start_matches('/').to_string();
        Self::instance().get_pool(&name, base).await
    }

    /// Pool for another database on the configured server
    pub async fn pool(database_name: &str) -> Result<PgPool, DatabaseError> {
        if !Self::is_valid_db_name(database_name) {
            return Err(DatabaseError::InvalidDatabaseName(database_name.to_string()));
        }
        let connection_string = Self::build_connection_string(&Self::base_url()?, database_name)?;
        Self::instance().get_pool(database_name, connection_string).await
    }

    fn base_url() -> Result<String, DatabaseError> {
        config::config()
            .database
            .url
            .clone()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(&self, database_name: &str, connection_string: String) -> Result<PgPool, DatabaseError> {
        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(database_name) {
                return Ok(pool.clone());
            }
        }

        let settings = &config::config().database;
        let options = Self::connect_options(&connection_string, settings)?;
        let pool = Self::pool_options(settings).connect_with(options).await?;

        {
            let mut pools = self.pools.write().await;
            pools.insert(database_name.to_string(), pool.clone());
        }

        info!("Created database pool for: {}", database_name);
        Ok(pool)
    }

    fn pool_options(settings: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connection_timeout))
    }

    /// Parsed connection settings; statements are only logged when query logging is on
    fn connect_options(
        connection_string: &str,
        settings: &DatabaseConfig,
    ) -> Result<PgConnectOptions, DatabaseError> {
        let options = PgConnectOptions::from_str(connection_string)
            .map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if settings.enable_query_logging {
            Ok(options)
        } else {
            Ok(options.disable_statement_logging())
        }
    }

    fn build_connection_string(base: &str, database_name: &str) -> Result<String, DatabaseError> {
        let mut url = url::Url::parse(base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        // Replace the path to the database name (ensure leading slash)
        url.set_path(&format!("/{}", database_name));
        Ok(url.into())
    }

    /// Pings a pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all() {
        let manager = Self::instance();
        let mut pools = manager.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!("Closed database pool: {}", name);
        }
    }

    /// Database names are restricted to [a-zA-Z0-9_]
    fn is_valid_db_name(name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl Default for DatabaseManager {
    fn default() -> Self {
        Self::new()
    }
}
