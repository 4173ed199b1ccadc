pub mod config;
pub mod migrate;
pub mod seed;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use crate::db::config::{DbConfig, DbConfigError};

#[derive(Clone)]
pub struct DatabaseProxy {
    config: DbConfig,
    pool: PgPool,
}

impl DatabaseProxy {
    pub async fn from_env() -> Result<Arc<Self>, DbInitError> {
        let config = DbConfig::from_env()?;
        Self::connect(config).await
    }

    pub async fn connect(config: DbConfig) -> Result<Arc<Self>, DbInitError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(DbInitError::Sqlx)?;

        Ok(Arc::new(Self { config, pool }))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }
}

/// Serialization failures and deadlocks are worth a bounded retry before
/// surfacing a conflict to the caller.
pub fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error(transparent)]
    Config(#[from] DbConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] migrate::MigrationError),
}
