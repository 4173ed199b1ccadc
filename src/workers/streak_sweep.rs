use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::engine::EngagementEngine;

/// Nightly sweep zeroing streak counters for users who missed a day. The
/// engine resets lazily on the next qualifying event anyway, so the sweep
/// only tidies up readers that would otherwise see a stale counter.
pub async fn run(engine: Arc<EngagementEngine>) -> Result<(), super::WorkerError> {
    let start = Instant::now();
    debug!("Starting streak expiry sweep");

    let expired = engine.sweep_expired_streaks().await?;

    info!(
        expired,
        duration_ms = start.elapsed().as_millis() as u64,
        "Streak expiry sweep completed"
    );

    Ok(())
}
