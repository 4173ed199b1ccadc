pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod services;
pub mod workers;

use std::sync::Arc;

use crate::cache::RedisCache;
use crate::clock::SystemClock;
use crate::db::DatabaseProxy;
use crate::engine::{EngagementEngine, EngineConfig};

pub use crate::engine::{EngineError, EngineEvent, EngineResult};

/// Builds a fully wired engine from the environment: database pool,
/// migrations, catalog seeds and the optional Redis store.
pub async fn create_engine() -> Result<Arc<EngagementEngine>, db::DbInitError> {
    let proxy = DatabaseProxy::from_env().await?;

    db::migrate::run_migrations(proxy.pool()).await?;
    db::seed::seed_catalogs(proxy.pool()).await?;

    let cache = match proxy.config().redis_url.clone() {
        Some(url) => match RedisCache::connect(&url).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(err) => {
                tracing::warn!(error = %err, "redis unavailable, running without cache");
                None
            }
        },
        None => None,
    };

    Ok(Arc::new(EngagementEngine::new(
        EngineConfig::from_env(),
        proxy,
        cache,
        Arc::new(SystemClock),
    )))
}
