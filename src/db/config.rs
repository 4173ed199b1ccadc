use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| DbConfigError::Missing {
            key: "DATABASE_URL",
        })?;

        let redis_url = std::env::var("REDIS_URL").ok();
        let max_connections = env_u32("DB_MAX_CONNECTIONS", 10);
        let acquire_timeout = Duration::from_millis(env_u64("DB_ACQUIRE_TIMEOUT_MS", 5000));

        Ok(Self {
            database_url,
            redis_url,
            max_connections,
            acquire_timeout,
        })
    }
}

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("Missing required env var: {key}")]
    Missing { key: &'static str },
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}
