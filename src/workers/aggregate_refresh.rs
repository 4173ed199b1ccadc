use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::engine::EngagementEngine;

/// Hourly re-fold of the in-flight days' aggregates from the raw event
/// log. Idempotent: the result depends only on the log contents.
pub async fn run(engine: Arc<EngagementEngine>) -> Result<(), super::WorkerError> {
    let start = Instant::now();
    debug!("Starting aggregate refresh cycle");

    let refreshed = engine.refresh_daily_aggregates().await?;

    info!(
        refreshed,
        duration_ms = start.elapsed().as_millis() as u64,
        "Aggregate refresh completed"
    );

    Ok(())
}
